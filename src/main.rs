use std::collections::HashMap;
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::process::ExitCode;
use std::thread;

use anyhow::{anyhow, bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use testsmith::config::Config;
use testsmith::executor::ProcessExecutor;
use testsmith::llm::prompt::truncate_tail;
use testsmith::llm::{build_service, CompletionService, ProviderKind};
use testsmith::logger;
use testsmith::testgen::{
    CodeMerger, Orchestrator, OrchestratorConfig, Outcome, SynthesisError, SynthesisReport,
    TestCorrespondenceResolver,
};
use testsmith::triage::FailureClassifier;

const EXIT_FAILURE: u8 = 1;
const EXIT_EXHAUSTED: u8 = 2;
const EXIT_INFRA: u8 = 3;

/// Console output shown for a failed file.
const REPORT_TAIL: usize = 2_000;

#[derive(Parser)]
#[command(
    name = "testsmith",
    version,
    about = "Generate, run and repair companion tests for source files."
)]
struct Cli {
    /// Project root (defaults to the current directory)
    #[arg(long, global = true)]
    root: Option<PathBuf>,

    /// -v info, -vv debug, -vvv trace
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Generate tests for source files until they pass
    Run(RunArgs),
    /// Print the test file that covers a source file
    FindTest { file: PathBuf },
    /// Print the source file a test file covers
    FindSource { test: PathBuf },
    /// List source files and their existing tests
    List,
    /// Classify a test failure as test, source or environment problem
    Classify(ClassifyArgs),
}

#[derive(Args, Debug, Clone)]
struct RunArgs {
    #[arg(required = true, help = "Source files to cover")]
    files: Vec<PathBuf>,

    #[arg(long, help = "Built-in command template: pytest | jest | vitest")]
    template: Option<String>,

    #[arg(long, help = "Generation attempts per file")]
    max_attempts: Option<usize>,

    #[arg(long, default_value_t = false, help = "Skip the setup commands")]
    no_setup: bool,

    #[arg(long, help = "openai | anthropic | mistral | deepseek | ollama")]
    provider: Option<String>,

    #[arg(long, help = "Model name for the provider")]
    model: Option<String>,
}

#[derive(Args, Debug, Clone)]
struct ClassifyArgs {
    #[arg(long, help = "Source file under test")]
    source: PathBuf,

    #[arg(long, help = "Failing test file")]
    test: PathBuf,

    #[arg(long, conflicts_with = "error_file", help = "Failure output")]
    error: Option<String>,

    #[arg(long, help = "File holding the failure output")]
    error_file: Option<PathBuf>,

    #[arg(long, help = "openai | anthropic | mistral | deepseek | ollama")]
    provider: Option<String>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logger::init(cli.verbose);

    match dispatch(cli) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}

fn dispatch(cli: Cli) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("cannot read current directory")?;
    let root = match cli.root {
        Some(r) => absolutize(&cwd, &r),
        None => cwd.clone(),
    };
    let config = Config::load(&root)?;

    match cli.command {
        CliCommand::Run(args) => run(&cwd, &root, config, args),
        CliCommand::FindTest { file } => {
            let resolver = resolver(&root, &config);
            match resolver.find_test(&absolutize(&cwd, &file)) {
                Some(t) => {
                    println!("{}", t.path.display());
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("no test file for {}", file.display());
                    Ok(ExitCode::from(EXIT_FAILURE))
                }
            }
        }
        CliCommand::FindSource { test } => {
            let resolver = resolver(&root, &config);
            match resolver.find_source(&absolutize(&cwd, &test)) {
                Some(s) => {
                    println!("{}", s.path.display());
                    Ok(ExitCode::SUCCESS)
                }
                None => {
                    eprintln!("no source file for {}", test.display());
                    Ok(ExitCode::from(EXIT_FAILURE))
                }
            }
        }
        CliCommand::List => {
            let (files, tests) = resolver(&root, &config).list_files_and_tests();
            println!("sources ({}):", files.len());
            for f in files {
                println!("  {}", display_rel(&root, &f));
            }
            println!("tests ({}):", tests.len());
            for t in tests {
                println!("  {}", display_rel(&root, &t));
            }
            Ok(ExitCode::SUCCESS)
        }
        CliCommand::Classify(args) => classify(&cwd, config, args),
    }
}

/* ============================================================
   run
   ============================================================ */

fn run(cwd: &Path, root: &Path, mut config: Config, args: RunArgs) -> Result<ExitCode> {
    if let Some(t) = args.template {
        config.unit.template = Some(t);
    }
    if let Some(n) = args.max_attempts {
        config.unit.max_attempts = n;
    }
    if args.no_setup {
        config.unit.run_setup = false;
    }
    apply_provider(&mut config, args.provider.as_deref(), args.model)?;

    let mut orchestration = config.orchestrator_config()?;
    let service = build_service(&config.provider)?;
    let resolver = resolver(root, &config);
    let executor = ProcessExecutor::new(root);
    let merger = config.merger();

    let sources: Vec<PathBuf> = args.files.iter().map(|f| absolutize(cwd, f)).collect();
    reject_shared_targets(&resolver, &sources)?;

    // Once for the whole batch; per-file orchestrators must not repeat it.
    if orchestration.run_setup && !orchestration.setup_commands.is_empty() {
        let setup = executor.run_setup(&orchestration.setup_commands)?;
        if !setup.success() {
            let err = SynthesisError::Setup { result: setup };
            report_failure(root, Path::new("setup"), &err);
            return Ok(ExitCode::from(EXIT_INFRA));
        }
    }
    orchestration.run_setup = false;

    let outcomes = thread::scope(|scope| {
        let handles: Vec<_> = sources
            .iter()
            .map(|source| {
                let ctx = RunContext {
                    completion: service.as_ref(),
                    resolver: &resolver,
                    executor: &executor,
                    merger: &merger,
                    config: &orchestration,
                };
                scope.spawn(move || (source.clone(), ctx.synthesize(source)))
            })
            .collect();

        handles
            .into_iter()
            .map(|h| h.join().map_err(|_| anyhow!("worker thread panicked")))
            .collect::<Result<Vec<_>>>()
    })?;

    let mut code = 0u8;
    for (source, outcome) in outcomes {
        match outcome {
            Ok(report) => report_success(root, &source, &report),
            Err(err) => {
                report_failure(root, &source, &err);
                code = code.max(exit_code_for(&err));
            }
        }
    }

    Ok(if code == 0 { ExitCode::SUCCESS } else { ExitCode::from(code) })
}

struct RunContext<'a> {
    completion: &'a dyn CompletionService,
    resolver: &'a TestCorrespondenceResolver,
    executor: &'a ProcessExecutor,
    merger: &'a CodeMerger,
    config: &'a OrchestratorConfig,
}

impl RunContext<'_> {
    fn synthesize(&self, source: &Path) -> Result<SynthesisReport, SynthesisError> {
        Orchestrator::new(self.completion, self.resolver, self.executor, self.merger, self.config).run(source)
    }
}

/// Two runs writing the same test file would clobber each other.
fn reject_shared_targets(resolver: &TestCorrespondenceResolver, sources: &[PathBuf]) -> Result<()> {
    let mut seen: HashMap<PathBuf, &PathBuf> = HashMap::new();
    for source in sources {
        let target = resolver.test_location(source);
        if let Some(other) = seen.insert(target.clone(), source) {
            bail!(
                "{} and {} both map to {}",
                other.display(),
                source.display(),
                target.display()
            );
        }
    }
    Ok(())
}

fn exit_code_for(err: &SynthesisError) -> u8 {
    if err.is_infrastructure() {
        EXIT_INFRA
    } else if matches!(err, SynthesisError::Exhausted { .. }) {
        EXIT_EXHAUSTED
    } else {
        EXIT_FAILURE
    }
}

fn report_success(root: &Path, source: &Path, report: &SynthesisReport) {
    let test = display_rel(root, &report.test_path);
    match report.outcome {
        Outcome::BaselinePassed => {
            println!("PASS {} -> {} (existing tests)", display_rel(root, source), test)
        }
        Outcome::Passed { attempt } => {
            println!("PASS {} -> {} (attempt {})", display_rel(root, source), test, attempt)
        }
    }
}

fn report_failure(root: &Path, source: &Path, err: &SynthesisError) {
    println!("FAIL {}: {}", display_rel(root, source), err);

    if let SynthesisError::Exhausted {
        verdict: Some((verdict, explanation)),
        ..
    } = err
    {
        println!("  verdict: {verdict}");
        if !explanation.is_empty() {
            println!("  {}", explanation.replace('\n', "\n  "));
        }
    }

    if let Some(last) = err.last_result() {
        let console = last.console();
        if !console.trim().is_empty() {
            println!("{}", truncate_tail(console.trim_end(), REPORT_TAIL));
        }
    }
}

/* ============================================================
   classify
   ============================================================ */

fn classify(cwd: &Path, mut config: Config, args: ClassifyArgs) -> Result<ExitCode> {
    apply_provider(&mut config, args.provider.as_deref(), None)?;

    let source = read(&absolutize(cwd, &args.source))?;
    let test = read(&absolutize(cwd, &args.test))?;
    let error = match (args.error, args.error_file) {
        (Some(e), _) => e,
        (None, Some(path)) => read(&absolutize(cwd, &path))?,
        (None, None) => bail!("pass --error or --error-file"),
    };

    let service = build_service(&config.provider)?;
    let classifier = FailureClassifier::new(service.as_ref());
    let (verdict, explanation) = classifier.classify(&source, &test, &error)?;

    println!("{} ({verdict})", verdict.tag());
    if !explanation.is_empty() {
        println!("{explanation}");
    }
    Ok(ExitCode::SUCCESS)
}

/* ============================================================
   Helpers
   ============================================================ */

fn apply_provider(config: &mut Config, provider: Option<&str>, model: Option<String>) -> Result<()> {
    if let Some(name) = provider {
        let kind = ProviderKind::parse(name).ok_or_else(|| anyhow!("unknown provider `{name}`"))?;
        if kind != config.provider.kind {
            config.provider.model = None;
            config.provider.base_url = None;
        }
        config.provider.kind = kind;
    }
    if model.is_some() {
        config.provider.model = model;
    }
    Ok(())
}

fn resolver(root: &Path, config: &Config) -> TestCorrespondenceResolver {
    TestCorrespondenceResolver::new(root).with_ignore(&config.ignore)
}

fn read(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))
}

fn absolutize(base: &Path, p: &Path) -> PathBuf {
    let joined = if p.is_absolute() { p.to_path_buf() } else { base.join(p) };
    joined
        .components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}

fn display_rel(root: &Path, p: &Path) -> String {
    p.strip_prefix(root).unwrap_or(p).display().to_string()
}
