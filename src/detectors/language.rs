//! detectors/language.rs
//!
//! Language and language-family detection from file extensions.

use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum Language {
    Python,
    JavaScript,
    Jsx,
    TypeScript,
    Tsx,
    Unknown,
}

/// How a language delimits blocks. Drives test-file conventions and merging.
#[derive(Debug, Clone, Copy, Eq, PartialEq, Hash)]
pub enum LanguageFamily {
    /// Indentation-block languages (Python).
    Indented,
    /// Brace-delimited languages, component dialects included.
    Braced,
}

/* ============================================================
   Public API
   ============================================================ */

impl Language {
    pub fn from_extension(ext: &str) -> Language {
        match ext.trim_start_matches('.') {
            "py" => Language::Python,
            "js" | "mjs" | "cjs" => Language::JavaScript,
            "jsx" => Language::Jsx,
            "ts" | "mts" | "cts" => Language::TypeScript,
            "tsx" => Language::Tsx,
            _ => Language::Unknown,
        }
    }

    pub fn from_path(path: &Path) -> Language {
        path.extension()
            .and_then(|e| e.to_str())
            .map(Language::from_extension)
            .unwrap_or(Language::Unknown)
    }

    /// Unknown extensions fall back to the indented-family conventions.
    pub fn family(self) -> LanguageFamily {
        match self {
            Language::JavaScript | Language::Jsx | Language::TypeScript | Language::Tsx => {
                LanguageFamily::Braced
            }
            Language::Python | Language::Unknown => LanguageFamily::Indented,
        }
    }

    /// JSX/TSX sources.
    pub fn is_component_dialect(self) -> bool {
        matches!(self, Language::Jsx | Language::Tsx)
    }

    pub fn is_supported(self) -> bool {
        !matches!(self, Language::Unknown)
    }
}

/// Directories never worth scanning for sources or tests.
pub fn is_ignored(path: &Path) -> bool {
    path.components().any(|c| {
        matches!(
            c.as_os_str().to_str(),
            Some("target")
                | Some("node_modules")
                | Some(".git")
                | Some(".venv")
                | Some("venv")
                | Some("__pycache__")
                | Some("dist")
                | Some("build")
        )
    })
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Language::Python => "python",
            Language::JavaScript => "javascript",
            Language::Jsx => "jsx",
            Language::TypeScript => "typescript",
            Language::Tsx => "tsx",
            Language::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn families_follow_extension() {
        assert_eq!(Language::from_extension("py").family(), LanguageFamily::Indented);
        assert_eq!(Language::from_extension(".tsx").family(), LanguageFamily::Braced);
        assert_eq!(Language::from_extension("go").family(), LanguageFamily::Indented);
        assert!(Language::from_extension("jsx").is_component_dialect());
        assert!(!Language::from_extension("ts").is_component_dialect());
    }

    #[test]
    fn ignored_directories_are_detected_anywhere_in_path() {
        assert!(is_ignored(Path::new("web/node_modules/react/index.js")));
        assert!(is_ignored(Path::new(".venv/lib/site.py")));
        assert!(!is_ignored(Path::new("src/builder.py")));
    }
}
