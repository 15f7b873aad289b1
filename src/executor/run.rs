// Runs command pipelines and returns raw output + exit code.
// No parsing. Pass/fail interpretation belongs to the caller.

use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Instant;

use tracing::{debug, info};

/// Exported to every generation/repair run: path of the test file.
pub const TEST_FILE_VAR: &str = "TEST_FILE";
/// Exported to every generation/repair run: path of the source under test.
pub const SOURCE_FILE_VAR: &str = "FILE_TO_COVER";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecutionResult {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// stdout followed by stderr, as fed back into generation prompts.
    pub fn console(&self) -> String {
        let mut out = String::with_capacity(self.stdout.len() + self.stderr.len());
        out.push_str(&self.stdout);
        out.push_str(&self.stderr);
        out
    }
}

/// Executes `&&`-chained command pipelines through `sh -c`.
///
/// Commands run synchronously in `working_dir`; nothing here enforces a
/// timeout. Environment overrides are emitted as leading `export` steps so
/// user command templates can reference them as `$VAR`.
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    working_dir: PathBuf,
}

impl ProcessExecutor {
    pub fn new(working_dir: impl Into<PathBuf>) -> Self {
        Self {
            working_dir: working_dir.into(),
        }
    }

    pub fn working_dir(&self) -> &Path {
        &self.working_dir
    }

    pub fn run(&self, commands: &[String], env: &[(&str, &str)]) -> io::Result<ExecutionResult> {
        let pipeline = compose_pipeline(commands, env);
        info!(cwd = %self.working_dir.display(), "running: {}", pipeline);

        let started = Instant::now();
        let out = Command::new("sh")
            .arg("-c")
            .arg(&pipeline)
            .current_dir(&self.working_dir)
            .output()?;

        let result = ExecutionResult {
            exit_code: out.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
        };

        debug!(
            exit_code = result.exit_code,
            duration_ms = started.elapsed().as_millis() as u64,
            "pipeline finished"
        );
        Ok(result)
    }

    /// Project setup. Injects no variables.
    pub fn run_setup(&self, setup_commands: &[String]) -> io::Result<ExecutionResult> {
        self.run(setup_commands, &[])
    }

    /// Single-file test run with the test and source paths exported.
    pub fn run_test(
        &self,
        test_commands: &[String],
        source: &Path,
        test: &Path,
    ) -> io::Result<ExecutionResult> {
        let test = test.display().to_string();
        let source = source.display().to_string();
        self.run(
            test_commands,
            &[(TEST_FILE_VAR, test.as_str()), (SOURCE_FILE_VAR, source.as_str())],
        )
    }
}

/// `export K='v' && ... && cmd1 && cmd2`
pub fn compose_pipeline(commands: &[String], env: &[(&str, &str)]) -> String {
    env.iter()
        .map(|(k, v)| format!("export {}={}", k, shell_quote(v)))
        .chain(commands.iter().cloned())
        .collect::<Vec<_>>()
        .join(" && ")
}

fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}
