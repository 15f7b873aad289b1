//! Failure triage: is the test wrong, the source wrong, or the environment?

use std::sync::OnceLock;

use regex::Regex;
use tracing::{debug, info};

use crate::llm::backend::{CompletionError, CompletionService};
use crate::llm::prompt::build_classification_prompt;
use crate::state::Verdict;

/// What a runner prints when it only knows the process failed.
pub const GENERIC_FAILURE_SIGNATURE: &str = "exit status 1";

pub const DEFAULT_CLASSIFY_TOKENS: u32 = 1024;

#[derive(Debug, thiserror::Error)]
pub enum ClassifyError {
    #[error("completion failed: {0}")]
    Completion(#[from] CompletionError),

    #[error("no verdict tag in classification response: {response}")]
    UnrecognizedVerdict { response: String },
}

pub struct FailureClassifier<'a> {
    completion: &'a dyn CompletionService,
    max_tokens: u32,
}

impl<'a> FailureClassifier<'a> {
    pub fn new(completion: &'a dyn CompletionService) -> Self {
        Self {
            completion,
            max_tokens: DEFAULT_CLASSIFY_TOKENS,
        }
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn classify(
        &self,
        source_code: &str,
        test_code: &str,
        error: &str,
    ) -> Result<(Verdict, String), ClassifyError> {
        // Exit status alone can't separate runner failure from infra failure.
        if error == GENERIC_FAILURE_SIGNATURE {
            debug!("generic failure signature, skipping completion");
            return Ok((Verdict::TestDefect, error.to_string()));
        }

        let prompt = build_classification_prompt(source_code, test_code, error);
        let response = self.completion.complete(&prompt, self.max_tokens)?;

        let (verdict, explanation) = parse_response(&response)?;
        info!(verdict = verdict.tag(), "failure classified");
        Ok((verdict, explanation))
    }
}

/* ============================================================
   Response parsing
   ============================================================ */

fn explanation_res() -> &'static [Regex; 2] {
    static RES: OnceLock<[Regex; 2]> = OnceLock::new();
    RES.get_or_init(|| {
        [
            Regex::new(r"(?s)<explanation>(.*?)</explanation>").expect("valid pattern"),
            Regex::new(r"(?s)<error_explanation>(.*?)</error_explanation>").expect("valid pattern"),
        ]
    })
}

fn slash_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:^|[^<\w])/(test|bug|settings)\b").expect("valid pattern"))
}

fn bracket_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\[(test|bug|settings)\]").expect("valid pattern"))
}

fn paren_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\((test|bug|settings)\)").expect("valid pattern"))
}

/// Tag lookup order: trailing `/tag`, then `[tag]`, then `(tag)` per line.
pub fn parse_response(response: &str) -> Result<(Verdict, String), ClassifyError> {
    let explanation = explanation_res()
        .iter()
        .find_map(|re| re.captures(response))
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .unwrap_or_default();

    let tag = slash_re()
        .captures_iter(response)
        .last()
        .and_then(|c| c.get(1))
        .or_else(|| bracket_re().captures(response).and_then(|c| c.get(1)))
        .map(|m| m.as_str())
        .or_else(|| {
            response
                .lines()
                .find_map(|line| paren_re().captures(line).and_then(|c| c.get(1)))
                .map(|m| m.as_str())
        });

    match tag.and_then(Verdict::from_tag) {
        Some(v) => Ok((v, explanation)),
        None => Err(ClassifyError::UnrecognizedVerdict {
            response: response.to_string(),
        }),
    }
}
