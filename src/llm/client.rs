// src/llm/client.rs

use std::fmt;
use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tracing::{debug, info};

use crate::llm::backend::{CompletionError, CompletionService};
use crate::llm::prompt::LlmPrompt;

const PROMPT_ABI_VERSION: &str = "v1-testsmith";
const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    OpenAI,
    Anthropic,
    Mistral,
    DeepSeek,
    Ollama,
}

impl ProviderKind {
    pub fn parse(name: &str) -> Option<ProviderKind> {
        match name.to_ascii_lowercase().as_str() {
            "openai" => Some(ProviderKind::OpenAI),
            "anthropic" => Some(ProviderKind::Anthropic),
            "mistral" => Some(ProviderKind::Mistral),
            "deepseek" => Some(ProviderKind::DeepSeek),
            "ollama" => Some(ProviderKind::Ollama),
            _ => None,
        }
    }

    /// `None` for providers that run without a key.
    pub fn api_key_env(self) -> Option<&'static str> {
        match self {
            ProviderKind::OpenAI => Some("OPENAI_API_KEY"),
            ProviderKind::Anthropic => Some("ANTHROPIC_API_KEY"),
            ProviderKind::Mistral => Some("MISTRAL_API_KEY"),
            ProviderKind::DeepSeek => Some("DEEPSEEK_API_KEY"),
            ProviderKind::Ollama => None,
        }
    }

    fn default_base_url(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "https://api.openai.com/v1",
            ProviderKind::Anthropic => "https://api.anthropic.com/v1",
            ProviderKind::Mistral => "https://api.mistral.ai/v1",
            ProviderKind::DeepSeek => "https://api.deepseek.com/v1",
            ProviderKind::Ollama => "http://localhost:11434/v1",
        }
    }

    fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAI => "gpt-4o",
            ProviderKind::Anthropic => "claude-3-5-sonnet-latest",
            ProviderKind::Mistral => "codestral-latest",
            ProviderKind::DeepSeek => "deepseek-chat",
            ProviderKind::Ollama => "codellama",
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ProviderKind::OpenAI => "openai",
            ProviderKind::Anthropic => "anthropic",
            ProviderKind::Mistral => "mistral",
            ProviderKind::DeepSeek => "deepseek",
            ProviderKind::Ollama => "ollama",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub model: Option<String>,
    /// Falls back to the provider's conventional environment variable.
    pub api_key: Option<String>,
    pub base_url: Option<String>,
    /// Absent means requests may block indefinitely.
    pub timeout_secs: Option<u64>,
}

/// Connection details resolved once at construction.
#[derive(Clone)]
struct Endpoint {
    kind: ProviderKind,
    model: String,
    api_key: String,
    base_url: String,
    http: Client,
}

impl Endpoint {
    fn resolve(cfg: &ProviderConfig) -> Result<Self, CompletionError> {
        let api_key = cfg
            .api_key
            .clone()
            .filter(|k| !k.trim().is_empty())
            .or_else(|| {
                cfg.kind
                    .api_key_env()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|k| !k.trim().is_empty())
            });

        let api_key = match (api_key, cfg.kind.api_key_env()) {
            (Some(k), _) => k,
            (None, None) => String::new(),
            (None, Some(_)) => return Err(CompletionError::MissingApiKey(cfg.kind)),
        };

        let http = Client::builder()
            .timeout(cfg.timeout_secs.map(Duration::from_secs))
            .build()?;

        Ok(Self {
            kind: cfg.kind,
            model: cfg
                .model
                .clone()
                .unwrap_or_else(|| cfg.kind.default_model().to_string()),
            api_key,
            base_url: cfg
                .base_url
                .clone()
                .unwrap_or_else(|| cfg.kind.default_base_url().to_string())
                .trim_end_matches('/')
                .to_string(),
            http,
        })
    }

    fn post(&self, url: &str, headers: &[(&str, String)], body: &Value) -> Result<Value, CompletionError> {
        let mut req = self.http.post(url).json(body);
        for (k, v) in headers {
            req = req.header(*k, v);
        }

        let resp = req.send()?;
        let status = resp.status();
        let text = resp.text()?;

        if !status.is_success() {
            return Err(CompletionError::Api {
                provider: self.kind,
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|_| CompletionError::Malformed(self.kind))
    }
}

/* ============================================================
   OpenAI-compatible chat completions
   (OpenAI, Mistral, DeepSeek, Ollama)
   ============================================================ */

pub struct ChatCompletionsClient {
    endpoint: Endpoint,
}

impl ChatCompletionsClient {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            endpoint: Endpoint::resolve(cfg)?,
        })
    }
}

impl CompletionService for ChatCompletionsClient {
    fn complete(&self, prompt: &LlmPrompt, max_tokens: u32) -> Result<String, CompletionError> {
        let ep = &self.endpoint;
        let url = format!("{}/chat/completions", ep.base_url);

        let mut body = json!({
            "model": ep.model,
            "messages": [
                { "role": "system", "content": prompt.system },
                { "role": "user", "content": prompt.user }
            ]
        });
        // OpenAI renamed the limit; the compatible servers kept the old name.
        let limit_key = match ep.kind {
            ProviderKind::OpenAI => "max_completion_tokens",
            _ => "max_tokens",
        };
        body[limit_key] = max_tokens.into();

        let mut headers = Vec::new();
        if !ep.api_key.is_empty() {
            headers.push(("Authorization", format!("Bearer {}", ep.api_key)));
        }

        log_request(ep, prompt);
        let json = ep.post(&url, &headers, &body)?;

        json.pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or(CompletionError::Malformed(ep.kind))
    }
}

/* ============================================================
   Anthropic messages
   ============================================================ */

pub struct AnthropicClient {
    endpoint: Endpoint,
}

impl AnthropicClient {
    pub fn new(cfg: &ProviderConfig) -> Result<Self, CompletionError> {
        Ok(Self {
            endpoint: Endpoint::resolve(cfg)?,
        })
    }
}

impl CompletionService for AnthropicClient {
    fn complete(&self, prompt: &LlmPrompt, max_tokens: u32) -> Result<String, CompletionError> {
        let ep = &self.endpoint;
        let url = format!("{}/messages", ep.base_url);

        let body = json!({
            "model": ep.model,
            "max_tokens": max_tokens,
            "system": prompt.system,
            "messages": [
                { "role": "user", "content": prompt.user }
            ]
        });

        let headers = vec![
            ("x-api-key", ep.api_key.clone()),
            ("anthropic-version", ANTHROPIC_VERSION.to_string()),
        ];

        log_request(ep, prompt);
        let json = ep.post(&url, &headers, &body)?;

        extract_anthropic_text(&json).ok_or(CompletionError::Malformed(ep.kind))
    }
}

/// Concatenates every text block of the first message.
fn extract_anthropic_text(v: &Value) -> Option<String> {
    let blocks = v.get("content")?.as_array()?;
    let text: String = blocks
        .iter()
        .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
        .filter_map(|b| b.get("text").and_then(Value::as_str))
        .collect();

    if text.is_empty() {
        None
    } else {
        Some(text)
    }
}

/* ============================================================
   Helpers
   ============================================================ */

fn log_request(ep: &Endpoint, prompt: &LlmPrompt) {
    info!(provider = %ep.kind, model = %ep.model, "requesting completion");
    debug!(prompt_hash = %hash_prompt(prompt), "prompt identity");
}

pub fn hash_prompt(prompt: &LlmPrompt) -> String {
    let mut h = Sha256::new();
    h.update(PROMPT_ABI_VERSION.as_bytes());
    h.update(prompt.system.as_bytes());
    h.update(prompt.user.as_bytes());
    hex::encode(h.finalize())
}
