use crate::llm::client::{AnthropicClient, ChatCompletionsClient, ProviderConfig, ProviderKind};
use crate::llm::prompt::LlmPrompt;

#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    #[error("no API key for {0}: set it in the config or via {env}", env = .0.api_key_env().unwrap_or("-"))]
    MissingApiKey(ProviderKind),

    #[error("http: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} error {status}: {body}")]
    Api {
        provider: ProviderKind,
        status: u16,
        body: String,
    },

    #[error("{0} response parse failure")]
    Malformed(ProviderKind),

    #[error("{0}")]
    Other(String),
}

/// A text completion capability. Every vendor sits behind this.
///
/// Calls block until the provider answers; there is no retry here.
pub trait CompletionService: Send + Sync {
    fn complete(&self, prompt: &LlmPrompt, max_tokens: u32) -> Result<String, CompletionError>;
}

impl<T: CompletionService + ?Sized> CompletionService for Box<T> {
    fn complete(&self, prompt: &LlmPrompt, max_tokens: u32) -> Result<String, CompletionError> {
        (**self).complete(prompt, max_tokens)
    }
}

impl<T: CompletionService + ?Sized> CompletionService for &T {
    fn complete(&self, prompt: &LlmPrompt, max_tokens: u32) -> Result<String, CompletionError> {
        (**self).complete(prompt, max_tokens)
    }
}

/// Builds the adapter for `cfg.kind`. Callers only ever see the trait.
pub fn build_service(cfg: &ProviderConfig) -> Result<Box<dyn CompletionService>, CompletionError> {
    match cfg.kind {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicClient::new(cfg)?)),
        ProviderKind::OpenAI
        | ProviderKind::Mistral
        | ProviderKind::DeepSeek
        | ProviderKind::Ollama => Ok(Box::new(ChatCompletionsClient::new(cfg)?)),
    }
}
