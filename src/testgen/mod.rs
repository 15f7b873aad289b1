pub mod file;
pub mod merge;
pub mod orchestrator;
pub mod patterns;
pub mod resolve;

pub use merge::{CodeMerger, MergeError};
pub use orchestrator::{Orchestrator, OrchestratorConfig, Outcome, SynthesisError, SynthesisReport};
pub use resolve::TestCorrespondenceResolver;
