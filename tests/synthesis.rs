mod common;

use std::fs;
use std::path::Path;

use tempfile::TempDir;
use testsmith::executor::ProcessExecutor;
use testsmith::state::{Phase, Verdict};
use testsmith::testgen::{
    CodeMerger, Orchestrator, OrchestratorConfig, Outcome, SynthesisError, TestCorrespondenceResolver,
};

use common::{test_block, touch, Scripted};

const SOURCE: &str = "def add(a, b):\n    return a + b\n";

struct Project {
    dir: TempDir,
    resolver: TestCorrespondenceResolver,
    executor: ProcessExecutor,
    merger: CodeMerger,
}

impl Project {
    fn new() -> Self {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "calc.py", SOURCE);
        Self {
            resolver: TestCorrespondenceResolver::new(dir.path()),
            executor: ProcessExecutor::new(dir.path()),
            merger: CodeMerger::new(),
            dir,
        }
    }

    fn root(&self) -> &Path {
        self.dir.path()
    }

    fn test_path(&self) -> std::path::PathBuf {
        self.root().join("tests/test_calc.py")
    }
}

fn config(test_command: &str) -> OrchestratorConfig {
    OrchestratorConfig {
        run_setup: false,
        test_commands: vec![test_command.to_string()],
        classify_on_give_up: false,
        ..OrchestratorConfig::default()
    }
}

#[test]
fn always_failing_run_stops_after_four_attempts() {
    let p = Project::new();
    let svc = Scripted::always(&test_block("def test_add():\n    assert add(1, 1) == 3"));
    let cfg = config("echo failing-run && exit 1");

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    assert_eq!(orch.phase(), Phase::GaveUp);
    assert_eq!(svc.calls(), 4);
    match err {
        SynthesisError::Exhausted { attempts, last, verdict, test_path } => {
            assert_eq!(attempts.len(), 4);
            assert_eq!(last.exit_code, 1);
            assert!(verdict.is_none());
            assert_eq!(test_path, p.test_path());
            let on_disk = fs::read_to_string(&test_path).unwrap();
            assert_eq!(on_disk, attempts[3].merged_code);
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
}

#[test]
fn feedback_accumulates_failed_output() {
    let p = Project::new();
    let svc = Scripted::always(&test_block("def test_add():\n    assert False"));
    let cfg = OrchestratorConfig {
        max_attempts: 3,
        ..config("echo failing-run && exit 1")
    };

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let _ = orch.run(Path::new("calc.py"));

    let prompts = svc.prompts();
    assert_eq!(prompts.len(), 3);
    assert!(!prompts[0].user.contains("failing-run"));
    assert_eq!(prompts[1].user.matches("failing-run").count(), 1);
    assert_eq!(prompts[2].user.matches("failing-run").count(), 2);
}

#[test]
fn second_attempt_passes_and_keeps_earlier_tests() {
    let p = Project::new();
    let svc = Scripted::new(
        &[
            test_block("def test_first():\n    assert add(1, 1) == 2").as_str(),
            test_block("def test_second():\n    assert \"PASS\"").as_str(),
        ],
        "",
    );
    let cfg = config("grep -q PASS \"$TEST_FILE\"");

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("calc.py")).unwrap();

    assert_eq!(orch.phase(), Phase::Done);
    assert_eq!(report.outcome, Outcome::Passed { attempt: 2 });
    assert_eq!(report.attempts.len(), 2);
    assert!(!report.attempts[0].passed());
    assert_eq!(svc.calls(), 2);

    let on_disk = fs::read_to_string(p.test_path()).unwrap();
    assert!(on_disk.contains("def test_first"));
    assert!(on_disk.contains("def test_second"));
    assert_eq!(on_disk, report.attempts[1].merged_code);
}

#[test]
fn passing_baseline_skips_generation() {
    let p = Project::new();
    touch(p.root(), "tests/test_calc.py", "def test_ok():\n    pass\n");
    let svc = Scripted::always("unused");

    let cfg = config("true");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("calc.py")).unwrap();

    assert_eq!(report.outcome, Outcome::BaselinePassed);
    assert!(report.attempts.is_empty());
    assert_eq!(svc.calls(), 0);
}

#[test]
fn baseline_with_nothing_collected_enters_the_loop() {
    let p = Project::new();
    touch(p.root(), "tests/test_calc.py", "");
    let svc = Scripted::always(&test_block("def test_add():\n    assert \"PASS\""));

    let cfg = config("grep -q PASS \"$TEST_FILE\" || exit 5");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("calc.py")).unwrap();

    assert_eq!(report.outcome, Outcome::Passed { attempt: 1 });
    assert_eq!(svc.calls(), 1);
}

#[test]
fn baseline_with_failures_enters_the_loop() {
    let p = Project::new();
    touch(p.root(), "tests/test_calc.py", "def test_old():\n    assert add(1, 1) == 3\n");
    let svc = Scripted::always(&test_block("def test_add():\n    assert \"PASS\""));

    let cfg = config("grep -q PASS \"$TEST_FILE\" || exit 1");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("calc.py")).unwrap();

    assert_eq!(report.outcome, Outcome::Passed { attempt: 1 });
    assert_eq!(svc.calls(), 1);
    let on_disk = fs::read_to_string(p.test_path()).unwrap();
    assert!(on_disk.contains("def test_old"));
    assert!(on_disk.contains("def test_add"));
}

#[test]
fn underscored_source_runs_baseline_on_its_existing_test() {
    let p = Project::new();
    touch(p.root(), "_helpers.py", "def helper():\n    return 1\n");
    touch(p.root(), "tests/test_helpers.py", "def test_ok():\n    pass\n");
    let svc = Scripted::always("unused");

    let cfg = config("test \"${TEST_FILE##*/}\" = test_helpers.py");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("_helpers.py")).unwrap();

    assert_eq!(report.outcome, Outcome::BaselinePassed);
    assert_eq!(report.test_path, p.root().join("tests/test_helpers.py"));
    assert_eq!(svc.calls(), 0);
}

#[test]
fn baseline_that_cannot_run_is_infrastructure() {
    let p = Project::new();
    touch(p.root(), "tests/test_calc.py", "def test_ok():\n    pass\n");
    let svc = Scripted::always("unused");

    let cfg = config("definitely-not-a-test-runner-xyz");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    assert!(err.is_infrastructure());
    match err {
        SynthesisError::BaselineInfra { result, .. } => assert_eq!(result.exit_code, 127),
        other => panic!("expected baseline failure, got {other:?}"),
    }
    assert_eq!(svc.calls(), 0);
    assert_eq!(orch.phase(), Phase::BaselineRun);
}

#[test]
fn failing_setup_aborts_before_resolution() {
    let p = Project::new();
    let svc = Scripted::always("unused");
    let cfg = OrchestratorConfig {
        run_setup: true,
        setup_commands: vec!["echo broken >&2 && exit 7".into()],
        ..config("true")
    };

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    match err {
        SynthesisError::Setup { result } => {
            assert_eq!(result.exit_code, 7);
            assert_eq!(result.stderr, "broken\n");
        }
        other => panic!("expected setup failure, got {other:?}"),
    }
    assert!(!p.root().join("tests").exists());
}

#[test]
fn response_without_test_block_is_a_hard_error() {
    let p = Project::new();
    let svc = Scripted::always("I could not write tests for this file.");

    let cfg = config("true");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    assert!(matches!(err, SynthesisError::NoTestContent { attempt: 1, last: None }));
    assert_eq!(svc.calls(), 1);
}

#[test]
fn unmergeable_code_is_not_written() {
    let p = Project::new();
    let svc = Scripted::always(&test_block("def broken(:\n    pass"));

    let cfg = config("true");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    assert!(matches!(err, SynthesisError::MergeFailed { attempt: 1, .. }));
    assert_eq!(fs::read_to_string(p.test_path()).unwrap(), "");
}

#[test]
fn give_up_is_classified_when_enabled() {
    let p = Project::new();
    let svc = Scripted::new(
        &[
            test_block("def test_add():\n    assert add(2, 2) == 4").as_str(),
            "<explanation>add subtracts</explanation>\n/bug",
        ],
        "",
    );
    let cfg = OrchestratorConfig {
        max_attempts: 1,
        classify_on_give_up: true,
        ..config("echo 'assert 0 == 4' && exit 1")
    };

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    match err {
        SynthesisError::Exhausted { verdict, .. } => {
            assert_eq!(verdict, Some((Verdict::SourceDefect, "add subtracts".to_string())));
        }
        other => panic!("expected exhaustion, got {other:?}"),
    }
    assert_eq!(svc.calls(), 2);
}

#[test]
fn unclassifiable_give_up_still_reports_exhaustion() {
    let p = Project::new();
    let svc = Scripted::new(&[test_block("def test_x():\n    assert False").as_str()], "no idea");
    let cfg = OrchestratorConfig {
        max_attempts: 1,
        classify_on_give_up: true,
        ..config("echo nope && exit 1")
    };

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();
    assert!(matches!(err, SynthesisError::Exhausted { verdict: None, .. }));
}

#[test]
fn provider_errors_propagate_immediately() {
    let p = Project::new();
    let svc = Scripted::failing("provider down");

    let cfg = config("true");
    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let err = orch.run(Path::new("calc.py")).unwrap_err();

    assert!(matches!(err, SynthesisError::Completion(_)));
    assert!(err.to_string().contains("provider down"));
    assert_eq!(svc.calls(), 1);
}

#[test]
fn environment_names_test_and_source() {
    let p = Project::new();
    let svc = Scripted::always(&test_block("def test_env():\n    pass"));
    let cfg = config(
        "test -f \"$TEST_FILE\" && test \"${TEST_FILE##*/}\" = test_calc.py && test \"${FILE_TO_COVER##*/}\" = calc.py",
    );

    let mut orch = Orchestrator::new(&svc, &p.resolver, &p.executor, &p.merger, &cfg);
    let report = orch.run(Path::new("calc.py")).unwrap();
    assert_eq!(report.outcome, Outcome::Passed { attempt: 1 });
}
