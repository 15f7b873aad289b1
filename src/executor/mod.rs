pub mod run;

pub use run::{ExecutionResult, ProcessExecutor};
