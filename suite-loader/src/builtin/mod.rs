//! Suites compiled into the grader.
mod command;
mod required_files;
mod stub;

pub use command::CommandSuite;
pub use required_files::RequiredFilesSuite;
pub use stub::{DelaySuite, StubSuite};
