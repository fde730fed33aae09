//! Types shared by all grader components: suite configuration, suite results,
//! the final report and the protocol spoken with suite processes.
pub mod report;
pub mod result;
pub mod suite;
pub mod wire;

pub use report::GradingReport;
pub use result::SuiteResult;
pub use suite::{Implementation, SuiteConfig};
