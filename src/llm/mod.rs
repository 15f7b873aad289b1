pub mod backend;
pub mod client;
pub mod extract;
pub mod prompt;

pub use backend::{build_service, CompletionError, CompletionService};
pub use client::{ProviderConfig, ProviderKind};
pub use prompt::LlmPrompt;
