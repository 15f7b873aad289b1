//! Generate → merge → run → repair loop for one source file.
//!
//! Phases: Init → SetupRun → Resolve → BaselineRun → {Done | GenerateLoop}
//! → {Done | GaveUp}. Setup and baseline infrastructure failures abort at
//! once; failing generated tests only feed the next attempt.

use std::io;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::executor::{ExecutionResult, ProcessExecutor};
use crate::llm::backend::{CompletionError, CompletionService};
use crate::llm::extract::extract;
use crate::llm::prompt::build_generation_prompt;
use crate::state::{Attempt, Phase, SourceFile, TestFile, Verdict};
use crate::testgen::file::write_test;
use crate::testgen::merge::{CodeMerger, MergeError};
use crate::testgen::resolve::TestCorrespondenceResolver;
use crate::triage::FailureClassifier;

pub const DEFAULT_MAX_ATTEMPTS: usize = 4;
pub const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Baseline exit codes meaning "the runner worked": pass, failures, nothing
/// collected.
pub const BASELINE_RUNNABLE_CODES: [i32; 3] = [0, 1, 5];

#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    pub max_attempts: usize,
    pub max_tokens: u32,
    pub run_setup: bool,
    pub setup_commands: Vec<String>,
    pub test_commands: Vec<String>,
    pub classify_on_give_up: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_tokens: DEFAULT_MAX_TOKENS,
            run_setup: true,
            setup_commands: Vec::new(),
            test_commands: Vec::new(),
            classify_on_give_up: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// The existing test file already passed; nothing was generated.
    BaselinePassed,
    Passed { attempt: usize },
}

#[derive(Debug, Clone)]
pub struct SynthesisReport {
    pub test_path: PathBuf,
    pub outcome: Outcome,
    pub attempts: Vec<Attempt>,
}

#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("setup commands failed (exit code {})", .result.exit_code)]
    Setup { result: ExecutionResult },

    #[error("existing test {} could not run (exit code {})", .test_path.display(), .result.exit_code)]
    BaselineInfra {
        test_path: PathBuf,
        result: ExecutionResult,
    },

    #[error(
        "no passing test for {} after {} attempts{}",
        .test_path.display(),
        .attempts.len(),
        .verdict.as_ref().map(|(v, _)| format!(" (verdict: {v})")).unwrap_or_default()
    )]
    Exhausted {
        test_path: PathBuf,
        attempts: Vec<Attempt>,
        last: ExecutionResult,
        verdict: Option<(Verdict, String)>,
    },

    #[error("attempt {attempt}: generated code could not be merged into the test file")]
    MergeFailed {
        attempt: usize,
        last: Option<ExecutionResult>,
    },

    #[error("attempt {attempt}: completion contained no test block")]
    NoTestContent {
        attempt: usize,
        last: Option<ExecutionResult>,
    },

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Merge(#[from] MergeError),

    #[error(transparent)]
    Io(#[from] io::Error),
}

impl SynthesisError {
    /// Output of the last process that ran before the failure, if any.
    pub fn last_result(&self) -> Option<&ExecutionResult> {
        match self {
            SynthesisError::Setup { result } | SynthesisError::BaselineInfra { result, .. } => Some(result),
            SynthesisError::Exhausted { last, .. } => Some(last),
            SynthesisError::MergeFailed { last, .. } | SynthesisError::NoTestContent { last, .. } => last.as_ref(),
            _ => None,
        }
    }

    /// Setup or baseline failures: the project itself cannot run tests.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, SynthesisError::Setup { .. } | SynthesisError::BaselineInfra { .. })
    }
}

pub struct Orchestrator<'a> {
    completion: &'a dyn CompletionService,
    resolver: &'a TestCorrespondenceResolver,
    executor: &'a ProcessExecutor,
    merger: &'a CodeMerger,
    config: &'a OrchestratorConfig,
    phase: Phase,
}

impl<'a> Orchestrator<'a> {
    pub fn new(
        completion: &'a dyn CompletionService,
        resolver: &'a TestCorrespondenceResolver,
        executor: &'a ProcessExecutor,
        merger: &'a CodeMerger,
        config: &'a OrchestratorConfig,
    ) -> Self {
        Self {
            completion,
            resolver,
            executor,
            merger,
            config,
            phase: Phase::Init,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn run(&mut self, source: &Path) -> Result<SynthesisReport, SynthesisError> {
        let result = self.drive(source);
        if result.is_err() && self.phase != Phase::GaveUp {
            warn!(phase = %self.phase, source = %source.display(), "synthesis aborted");
        }
        result
    }

    fn drive(&mut self, source: &Path) -> Result<SynthesisReport, SynthesisError> {
        /* ---------- setup ---------- */
        if self.config.run_setup && !self.config.setup_commands.is_empty() {
            self.enter(Phase::SetupRun);
            let result = self.executor.run_setup(&self.config.setup_commands)?;
            if !result.success() {
                return Err(SynthesisError::Setup { result });
            }
        }

        /* ---------- resolve ---------- */
        self.enter(Phase::Resolve);
        let source = SourceFile::read(&self.resolver.absolute(source))?;
        let existing = self.resolver.find_test(&source.path);
        let pre_existed = existing.is_some();
        let test = match existing {
            Some(t) => t,
            None => self.resolver.create_test(&source.path)?,
        };
        info!(source = %source.path.display(), test = %test.path.display(), pre_existed, "test file resolved");

        /* ---------- baseline ---------- */
        if pre_existed {
            self.enter(Phase::BaselineRun);
            let result = self.run_tests(&source, &test)?;

            if result.success() {
                self.enter(Phase::Done);
                return Ok(SynthesisReport {
                    test_path: test.path,
                    outcome: Outcome::BaselinePassed,
                    attempts: Vec::new(),
                });
            }
            if !BASELINE_RUNNABLE_CODES.contains(&result.exit_code) {
                return Err(SynthesisError::BaselineInfra {
                    test_path: test.path,
                    result,
                });
            }
        }

        /* ---------- generate loop ---------- */
        self.enter(Phase::GenerateLoop);
        let mut feedback = String::new();
        let mut attempts: Vec<Attempt> = Vec::new();

        for index in 1..=self.config.max_attempts.max(1) {
            let attempt = self.attempt(index, &source, &test, &feedback, &attempts)?;
            let passed = attempt.passed();

            info!(attempt = index, exit_code = attempt.execution.exit_code, passed, "attempt finished");

            if !passed {
                feedback.push_str(&attempt.execution.console());
                if !feedback.ends_with('\n') {
                    feedback.push('\n');
                }
            }
            attempts.push(attempt);

            if passed {
                self.enter(Phase::Done);
                return Ok(SynthesisReport {
                    test_path: test.path,
                    outcome: Outcome::Passed { attempt: index },
                    attempts,
                });
            }
        }

        /* ---------- give up ---------- */
        self.enter(Phase::GaveUp);
        let last = attempts
            .last()
            .map(|a| a.execution.clone())
            .unwrap_or_default();
        let verdict = if self.config.classify_on_give_up {
            self.classify(&source, &test, &last)
        } else {
            None
        };

        Err(SynthesisError::Exhausted {
            test_path: test.path,
            attempts,
            last,
            verdict,
        })
    }

    fn attempt(
        &self,
        index: usize,
        source: &SourceFile,
        test: &TestFile,
        feedback: &str,
        previous: &[Attempt],
    ) -> Result<Attempt, SynthesisError> {
        let last = || previous.last().map(|a| a.execution.clone());

        let current = test.read()?;
        let prompt = build_generation_prompt(source, test, &current, feedback);
        let raw = self.completion.complete(&prompt, self.config.max_tokens)?;

        let generated = extract(&raw);
        if generated.is_empty() {
            return Err(SynthesisError::NoTestContent { attempt: index, last: last() });
        }

        let merged = self
            .merger
            .merge(&test.path, &generated, Some(&current))?
            .ok_or_else(|| SynthesisError::MergeFailed { attempt: index, last: last() })?;

        write_test(&test.path, &merged)?;
        let execution = self.run_tests(source, test)?;

        Ok(Attempt {
            index,
            generated_code: generated,
            merged_code: merged,
            execution,
        })
    }

    fn run_tests(&self, source: &SourceFile, test: &TestFile) -> io::Result<ExecutionResult> {
        self.executor
            .run_test(&self.config.test_commands, &source.path, &test.path)
    }

    fn classify(&self, source: &SourceFile, test: &TestFile, last: &ExecutionResult) -> Option<(Verdict, String)> {
        let test_code = test.read().unwrap_or_default();
        let classifier = FailureClassifier::new(self.completion);

        match classifier.classify(&source.contents, &test_code, &last.console()) {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(error = %e, "could not classify final failure");
                None
            }
        }
    }

    fn enter(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "phase");
        self.phase = phase;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infra_errors_are_flagged() {
        let setup = SynthesisError::Setup {
            result: ExecutionResult { exit_code: 2, stdout: String::new(), stderr: "boom".into() },
        };
        assert!(setup.is_infrastructure());
        assert_eq!(setup.last_result().unwrap().stderr, "boom");

        let merge = SynthesisError::MergeFailed { attempt: 1, last: None };
        assert!(!merge.is_infrastructure());
        assert!(merge.last_result().is_none());
    }

    #[test]
    fn exhausted_message_names_the_verdict() {
        let err = SynthesisError::Exhausted {
            test_path: PathBuf::from("tests/test_x.py"),
            attempts: Vec::new(),
            last: ExecutionResult::default(),
            verdict: Some((Verdict::SourceDefect, "off by one".into())),
        };
        assert_eq!(
            err.to_string(),
            "no passing test for tests/test_x.py after 0 attempts (verdict: defect in the source under test)"
        );
    }
}
