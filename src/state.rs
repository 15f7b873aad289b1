use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};


use crate::detectors::language::Language;
use crate::executor::run::ExecutionResult;

/* ---------- lifecycle ---------- */

/// Orchestrator phases, in the order a run visits them.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    Init,
    SetupRun,
    Resolve,
    BaselineRun,
    GenerateLoop,
    Done,
    GaveUp,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Phase::Init => "init",
            Phase::SetupRun => "setup-run",
            Phase::Resolve => "resolve",
            Phase::BaselineRun => "baseline-run",
            Phase::GenerateLoop => "generate-loop",
            Phase::Done => "done",
            Phase::GaveUp => "gave-up",
        };
        f.write_str(s)
    }
}

/* ---------- files ---------- */

/// A source file as read from disk. The filesystem stays authoritative.
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub path: PathBuf,
    pub contents: String,
    pub language: Language,
}

impl SourceFile {
    pub fn read(path: &Path) -> io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            language: Language::from_path(path),
            contents,
        })
    }
}

/// A test file location. May not exist yet when first resolved.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestFile {
    pub path: PathBuf,
}

impl TestFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn exists(&self) -> bool {
        self.path.is_file()
    }

    /// Current on-disk content; a missing file reads as empty.
    pub fn read(&self) -> io::Result<String> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(String::new()),
            Err(e) => Err(e),
        }
    }

    pub fn language(&self) -> Language {
        Language::from_path(&self.path)
    }
}

/* ---------- attempts ---------- */

/// One pass of generate → merge → write → execute.
#[derive(Debug, Clone)]
pub struct Attempt {
    /// 1-based.
    pub index: usize,
    pub generated_code: String,
    pub merged_code: String,
    pub execution: ExecutionResult,
}

impl Attempt {
    pub fn passed(&self) -> bool {
        self.execution.success()
    }
}

/* ---------- triage ---------- */

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The generated test is wrong.
    TestDefect,
    /// The code under test is wrong.
    SourceDefect,
    /// Setup, dependencies or runner configuration.
    EnvironmentIssue,
}

impl Verdict {
    /// Tag vocabulary used in completion responses.
    pub fn from_tag(tag: &str) -> Option<Verdict> {
        match tag {
            "test" => Some(Verdict::TestDefect),
            "bug" => Some(Verdict::SourceDefect),
            "settings" => Some(Verdict::EnvironmentIssue),
            _ => None,
        }
    }

    pub fn tag(self) -> &'static str {
        match self {
            Verdict::TestDefect => "test",
            Verdict::SourceDefect => "bug",
            Verdict::EnvironmentIssue => "settings",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Verdict::TestDefect => "defect in the generated test",
            Verdict::SourceDefect => "defect in the source under test",
            Verdict::EnvironmentIssue => "environment or setup issue",
        };
        f.write_str(s)
    }
}
