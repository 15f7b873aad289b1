//! Structural merging of generated test code into an existing test file.
//!
//! Both sides are parsed with tree-sitter and split into keyed top-level
//! items. Items from the new side replace same-keyed items from the old side
//! in place; everything else is appended. The result is laid out canonically,
//! optionally passed through an external formatter, and parsed again.
//!
//! A parse failure anywhere is `Ok(None)`. Only an unusable configuration is
//! an `Err`.

mod python;
mod script;

use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};

use tracing::{debug, warn};
use tree_sitter::{Node, Parser, Tree};

use crate::detectors::language::{Language, LanguageFamily};

#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    #[error("no merger for {}", path.display())]
    UnsupportedLanguage { path: PathBuf },

    #[error("grammar rejected by parser: {0}")]
    Grammar(#[from] tree_sitter::LanguageError),

    #[error("formatter `{command}` could not run: {source}")]
    Formatter {
        command: String,
        #[source]
        source: io::Error,
    },
}

#[derive(Debug, Clone, Default)]
pub struct CodeMerger {
    indented_formatter: Option<String>,
    braced_formatter: Option<String>,
}

impl CodeMerger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Shell command that reads code on stdin and writes it formatted on
    /// stdout, e.g. `black -q -` or `prettier --stdin-filepath x.ts`.
    pub fn with_formatter(mut self, family: LanguageFamily, command: impl Into<String>) -> Self {
        let command = Some(command.into()).filter(|c| !c.trim().is_empty());
        match family {
            LanguageFamily::Indented => self.indented_formatter = command,
            LanguageFamily::Braced => self.braced_formatter = command,
        }
        self
    }

    /// Merges `new` into `old` for the file at `path`.
    ///
    /// `old` of `None` (or empty) means there is nothing to merge with; the
    /// new content is still normalized and validated.
    pub fn merge(&self, path: &Path, new: &str, old: Option<&str>) -> Result<Option<String>, MergeError> {
        let language = Language::from_path(path);
        let old = old.unwrap_or_default();

        let merged = match language {
            Language::Python => python::merge(new, old)?,
            Language::JavaScript | Language::Jsx | Language::TypeScript | Language::Tsx => {
                script::merge(language, new, old)?
            }
            Language::Unknown => {
                return Err(MergeError::UnsupportedLanguage {
                    path: path.to_path_buf(),
                })
            }
        };

        let Some(merged) = merged else {
            debug!(path = %path.display(), "merge input failed to parse");
            return Ok(None);
        };

        let formatted = match self.formatter(language.family()) {
            Some(cmd) => match run_formatter(cmd, &merged)? {
                Some(out) => out,
                None => return Ok(None),
            },
            None => merged,
        };

        if !validates(language, &formatted)? {
            warn!(path = %path.display(), "merged content failed to re-parse");
            return Ok(None);
        }

        Ok(Some(formatted))
    }

    fn formatter(&self, family: LanguageFamily) -> Option<&str> {
        match family {
            LanguageFamily::Indented => self.indented_formatter.as_deref(),
            LanguageFamily::Braced => self.braced_formatter.as_deref(),
        }
    }
}

fn validates(language: Language, code: &str) -> Result<bool, MergeError> {
    let grammar = match language {
        Language::Python => python::grammar(),
        other => match script::grammar(other) {
            Some(g) => g,
            None => return Ok(false),
        },
    };
    Ok(parse(&grammar, code)?.is_some())
}

/// `Ok(None)` when the formatter ran but rejected the input.
fn run_formatter(command: &str, code: &str) -> Result<Option<String>, MergeError> {
    let spawn_err = |source: io::Error| MergeError::Formatter {
        command: command.to_string(),
        source,
    };

    let mut child = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(code.as_bytes()).map_err(spawn_err)?;
    }

    let output = child.wait_with_output().map_err(spawn_err)?;
    if !output.status.success() {
        warn!(
            command,
            stderr = %String::from_utf8_lossy(&output.stderr).trim(),
            "formatter rejected merged code"
        );
        return Ok(None);
    }

    Ok(Some(String::from_utf8_lossy(&output.stdout).into_owned()))
}

/* ============================================================
   Shared item model
   ============================================================ */

pub(crate) fn parse(grammar: &tree_sitter::Language, code: &str) -> Result<Option<Tree>, MergeError> {
    let mut parser = Parser::new();
    parser.set_language(grammar)?;
    Ok(parser.parse(code, None).filter(|t| !t.root_node().has_error()))
}

/// Identity of a top-level item. Equal keys collide; the newer item wins.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Key {
    Import(String),
    /// Module docstring or directive prologue.
    Prologue,
    Named(String),
    /// Call statement, by callee and first string argument.
    Call(String),
    MainGuard,
    /// Anything else, by normalized text.
    Text(String),
}

impl Key {
    /// `Named` keys may list several comma-separated bindings
    /// (`const a = 1, b = 2`); sharing any one of them is a collision.
    pub fn collides(&self, other: &Key) -> bool {
        match (self, other) {
            (Key::Named(a), Key::Named(b)) => a.split(',').any(|x| b.split(',').any(|y| x.trim() == y.trim())),
            _ => self == other,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct Item {
    pub key: Key,
    pub text: String,
    /// Compound definitions get wider spacing.
    pub block: bool,
    pub class: Option<ClassBody>,
}

impl Item {
    pub fn new(key: Key, text: String, block: bool) -> Self {
        Self {
            key,
            text,
            block,
            class: None,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct ClassBody {
    pub header: String,
    pub members: Vec<Item>,
}

pub(crate) fn merge_items(old: Vec<Item>, new: Vec<Item>) -> Vec<Item> {
    let mut out = old;

    for item in new {
        let hits: Vec<usize> = out
            .iter()
            .enumerate()
            .filter(|(_, o)| o.key.collides(&item.key))
            .map(|(i, _)| i)
            .collect();

        let Some((&i, rest)) = hits.split_first() else {
            out.push(item);
            continue;
        };

        // The first collision keeps its slot; later ones are superseded.
        for &j in rest.iter().rev() {
            out.remove(j);
        }
        let prev = std::mem::replace(&mut out[i], item);
        if let (Some(prev_body), Some(body)) = (prev.class, out[i].class.as_mut()) {
            let members = std::mem::take(&mut body.members);
            body.members = merge_items(prev_body.members, members);
        }
    }

    out
}

/// Pending comments are glued to the next item so they move with it.
pub(crate) fn attach_comments(comments: &mut Vec<String>, text: String) -> String {
    if comments.is_empty() {
        return text;
    }
    let mut out = comments.join("\n");
    out.push('\n');
    out.push_str(&text);
    comments.clear();
    out
}

/// Node text with the node's own indentation removed from continuation
/// lines.
pub(crate) fn node_text(node: Node, src: &str) -> String {
    let text = node.utf8_text(src.as_bytes()).unwrap_or_default();
    let col = node.start_position().column;
    if col == 0 {
        return text.to_string();
    }

    text.lines()
        .enumerate()
        .map(|(i, line)| {
            if i == 0 {
                return line;
            }
            let ws = line.len() - line.trim_start_matches([' ', '\t']).len();
            &line[ws.min(col)..]
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub(crate) fn field_text(node: Node, field: &str, src: &str) -> Option<String> {
    node.child_by_field_name(field)
        .and_then(|n| n.utf8_text(src.as_bytes()).ok())
        .map(str::to_owned)
}

pub(crate) fn collapse_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}
