//! This library is responsible for loading grading configuration and
//! resolving configured suites to runnable implementations.
pub mod builtin;
mod catalog;
mod config;
mod registry;
mod suite;

pub use catalog::Catalog;
pub use config::{ConfigError, GraderConfig};
pub use registry::{Rejection, SuiteRegistry};
pub use suite::{BuildSuite, Suite, SuiteContext};
