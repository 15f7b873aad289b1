#![allow(dead_code)]

use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use testsmith::llm::{CompletionError, CompletionService, LlmPrompt};

/// Replies from a queue, then repeats `fallback` forever.
pub struct Scripted {
    replies: Mutex<VecDeque<Result<String, String>>>,
    fallback: String,
    calls: AtomicUsize,
    prompts: Mutex<Vec<LlmPrompt>>,
}

impl Scripted {
    pub fn always(reply: &str) -> Self {
        Self::new(&[], reply)
    }

    pub fn new(replies: &[&str], fallback: &str) -> Self {
        Self {
            replies: Mutex::new(replies.iter().map(|r| Ok(r.to_string())).collect()),
            fallback: fallback.to_string(),
            calls: AtomicUsize::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn failing(message: &str) -> Self {
        let s = Self::always("");
        s.replies.lock().unwrap().push_back(Err(message.to_string()));
        s
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn prompts(&self) -> Vec<LlmPrompt> {
        self.prompts.lock().unwrap().clone()
    }
}

impl CompletionService for Scripted {
    fn complete(&self, prompt: &LlmPrompt, _max_tokens: u32) -> Result<String, CompletionError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.prompts.lock().unwrap().push(prompt.clone());

        match self.replies.lock().unwrap().pop_front() {
            Some(Ok(r)) => Ok(r),
            Some(Err(e)) => Err(CompletionError::Other(e)),
            None => Ok(self.fallback.clone()),
        }
    }
}

pub fn test_block(code: &str) -> String {
    format!("Here you go.\n<test>\n[test]\n{code}\n</test>\n")
}

pub fn touch(root: &Path, rel: &str, content: &str) -> PathBuf {
    let p = root.join(rel);
    fs::create_dir_all(p.parent().unwrap()).unwrap();
    fs::write(&p, content).unwrap();
    p
}
