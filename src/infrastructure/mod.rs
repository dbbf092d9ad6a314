//! Infrastructure: concrete implementations of the domain ports, plus
//! configuration loading and logging setup.

pub mod config;
pub mod logging;
pub mod mock;
pub mod persistence;
pub mod process;

pub use config::SwarmConfig;
pub use logging::init_logging;
pub use mock::{FailingBackend, MockTaskRunner, ScriptedProcessRunner};
pub use persistence::{FsBackend, InMemoryBackend};
pub use process::TokioProcessRunner;
