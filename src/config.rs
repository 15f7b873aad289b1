use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::debug;

use crate::detectors::language::LanguageFamily;
use crate::llm::client::ProviderConfig;
use crate::testgen::merge::CodeMerger;
use crate::testgen::orchestrator::{OrchestratorConfig, DEFAULT_MAX_ATTEMPTS, DEFAULT_MAX_TOKENS};

pub const PROJECT_CONFIG_FILE: &str = "testsmith.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("invalid config {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("unknown template `{0}` (available: pytest, jest, vitest)")]
    UnknownTemplate(String),

    #[error("no test commands: set unit.template or unit.single_file_test_commands")]
    NoTestCommands,

    #[error("unit.max_attempts must be at least 1")]
    NoAttempts,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub provider: ProviderConfig,
    pub unit: UnitConfig,
    pub format: FormatConfig,
    /// Root-relative globs never scanned for sources or tests.
    pub ignore: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub template: Option<String>,
    pub single_file_test_commands: Vec<String>,
    pub setup_commands: Vec<String>,
    pub max_attempts: usize,
    pub max_tokens: u32,
    pub run_setup: bool,
    pub classify_on_give_up: bool,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            template: None,
            single_file_test_commands: Vec::new(),
            setup_commands: Vec::new(),
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            max_tokens: DEFAULT_MAX_TOKENS,
            run_setup: true,
            classify_on_give_up: true,
        }
    }
}

/// External formatters, one shell command per family, fed through stdin.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct FormatConfig {
    pub python: Option<String>,
    pub javascript: Option<String>,
}

/* ============================================================
   Templates
   ============================================================ */

#[derive(Debug, Clone, Copy)]
pub struct Template {
    pub name: &'static str,
    pub setup_commands: &'static [&'static str],
    pub single_file_test_commands: &'static [&'static str],
}

const TEMPLATES: &[Template] = &[
    Template {
        name: "pytest",
        setup_commands: &["python -m pip install -q pytest"],
        single_file_test_commands: &["python -m pytest -q \"$TEST_FILE\""],
    },
    Template {
        name: "jest",
        setup_commands: &["npm install --silent"],
        single_file_test_commands: &["npx jest --ci --runTestsByPath \"$TEST_FILE\""],
    },
    Template {
        name: "vitest",
        setup_commands: &["npm install --silent"],
        single_file_test_commands: &["npx vitest run \"$TEST_FILE\""],
    },
];

pub fn builtin_template(name: &str) -> Option<&'static Template> {
    TEMPLATES.iter().find(|t| t.name == name)
}

/* ============================================================
   Loading
   ============================================================ */

fn user_config_path() -> Option<PathBuf> {
    let mut dir = dirs::config_dir()?;
    dir.push("testsmith");
    dir.push("config.toml");
    Some(dir)
}

impl Config {
    /// `testsmith.toml` in `root`, else the user config file, else defaults.
    pub fn load(root: &Path) -> Result<Config, ConfigError> {
        let project = root.join(PROJECT_CONFIG_FILE);
        if project.is_file() {
            return Config::from_file(&project);
        }

        match user_config_path() {
            Some(user) if user.is_file() => Config::from_file(&user),
            _ => {
                debug!("no config file, using defaults");
                Ok(Config::default())
            }
        }
    }

    pub fn from_file(path: &Path) -> Result<Config, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg = toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!(config = %path.display(), "config loaded");
        Ok(cfg)
    }

    /// Explicit commands win over the template's.
    pub fn orchestrator_config(&self) -> Result<OrchestratorConfig, ConfigError> {
        let unit = &self.unit;
        if unit.max_attempts == 0 {
            return Err(ConfigError::NoAttempts);
        }

        let template = match unit.template.as_deref() {
            Some(name) => Some(builtin_template(name).ok_or_else(|| ConfigError::UnknownTemplate(name.to_string()))?),
            None => None,
        };

        let test_commands = pick(&unit.single_file_test_commands, template.map(|t| t.single_file_test_commands));
        if test_commands.is_empty() {
            return Err(ConfigError::NoTestCommands);
        }
        let setup_commands = pick(&unit.setup_commands, template.map(|t| t.setup_commands));

        Ok(OrchestratorConfig {
            max_attempts: unit.max_attempts,
            max_tokens: unit.max_tokens,
            run_setup: unit.run_setup,
            setup_commands,
            test_commands,
            classify_on_give_up: unit.classify_on_give_up,
        })
    }

    pub fn merger(&self) -> CodeMerger {
        let mut merger = CodeMerger::new();
        if let Some(cmd) = &self.format.python {
            merger = merger.with_formatter(LanguageFamily::Indented, cmd.clone());
        }
        if let Some(cmd) = &self.format.javascript {
            merger = merger.with_formatter(LanguageFamily::Braced, cmd.clone());
        }
        merger
    }
}

fn pick(explicit: &[String], fallback: Option<&[&str]>) -> Vec<String> {
    if !explicit.is_empty() {
        return explicit.to_vec();
    }
    fallback
        .unwrap_or_default()
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::client::ProviderKind;
    use tempfile::TempDir;

    #[test]
    fn project_file_is_parsed_with_defaults_filled_in() {
        let dir = TempDir::new().unwrap();
        fs::write(
            dir.path().join(PROJECT_CONFIG_FILE),
            r#"
ignore = ["legacy/**"]

[provider]
kind = "anthropic"
timeout_secs = 120

[unit]
template = "pytest"
max_attempts = 2

[format]
python = "black -q -"
"#,
        )
        .unwrap();

        let cfg = Config::load(dir.path()).unwrap();
        assert_eq!(cfg.provider.kind, ProviderKind::Anthropic);
        assert_eq!(cfg.provider.timeout_secs, Some(120));
        assert_eq!(cfg.ignore, vec!["legacy/**"]);
        assert_eq!(cfg.unit.max_tokens, DEFAULT_MAX_TOKENS);

        let oc = cfg.orchestrator_config().unwrap();
        assert_eq!(oc.max_attempts, 2);
        assert_eq!(oc.test_commands, vec!["python -m pytest -q \"$TEST_FILE\""]);
        assert!(oc.classify_on_give_up);
    }

    #[test]
    fn explicit_commands_beat_template() {
        let mut cfg = Config::default();
        cfg.unit.template = Some("jest".into());
        cfg.unit.single_file_test_commands = vec!["yarn test $TEST_FILE".into()];

        let oc = cfg.orchestrator_config().unwrap();
        assert_eq!(oc.test_commands, vec!["yarn test $TEST_FILE"]);
        assert_eq!(oc.setup_commands, vec!["npm install --silent"]);
    }

    #[test]
    fn invalid_unit_settings_are_rejected() {
        let mut cfg = Config::default();
        assert!(matches!(cfg.orchestrator_config(), Err(ConfigError::NoTestCommands)));

        cfg.unit.template = Some("mocha".into());
        assert!(matches!(cfg.orchestrator_config(), Err(ConfigError::UnknownTemplate(_))));

        cfg.unit.template = Some("vitest".into());
        cfg.unit.max_attempts = 0;
        assert!(matches!(cfg.orchestrator_config(), Err(ConfigError::NoAttempts)));
    }

    #[test]
    fn malformed_file_reports_path() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join(PROJECT_CONFIG_FILE);
        fs::write(&path, "[unit\n").unwrap();
        let err = Config::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains(PROJECT_CONFIG_FILE));
    }
}
