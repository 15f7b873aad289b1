//! Candidate test locations per language family.
//!
//! Each table is an ordered, first-match-wins list of root-relative glob
//! patterns. Order encodes preference: co-located files beat conventional
//! test directories, which beat recursive searches. Keep it that way when
//! adding entries.

use std::path::{Component, Path};

use crate::detectors::language::{Language, LanguageFamily};

/// Ordered candidate patterns for one source file. Recomputed per request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CorrespondenceRule {
    pub candidates: Vec<String>,
}

impl CorrespondenceRule {
    /// `rel_source` is relative to the project root. `colocated` adds the
    /// source's own directory as the highest-priority location.
    pub fn for_source(rel_source: &Path, colocated: bool) -> Self {
        let name = clean_stem(rel_source);
        let ext = dotted_extension(rel_source);
        let dir = if colocated { slash_dir(rel_source) } else { None };

        let raw = match Language::from_path(rel_source).family() {
            LanguageFamily::Braced => braced_candidates(&name, &ext, dir.as_deref()),
            LanguageFamily::Indented => indented_candidates(&name, &ext, dir.as_deref()),
        };

        let mut candidates: Vec<String> = Vec::with_capacity(raw.len());
        for c in raw {
            if !candidates.contains(&c) {
                candidates.push(c);
            }
        }

        Self { candidates }
    }
}

/* ============================================================
   Tables
   ============================================================ */

fn indented_candidates(n: &str, ext: &str, dir: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(d) = dir {
        out.push(format!("{d}/test_{n}{ext}"));
        out.push(format!("{d}/{n}_test{ext}"));
        out.push(format!("{d}/tests/test_{n}{ext}"));
    }

    out.extend([
        format!("test_{n}{ext}"),
        format!("{n}_test{ext}"),
        format!("tests/test_{n}{ext}"),
        format!("test/test_{n}{ext}"),
        format!("tests/{n}_test{ext}"),
        format!("test/{n}_test{ext}"),
        format!("test/{n}.test{ext}"),
        format!("**/test_{n}{ext}"),
        format!("**/{n}_test{ext}"),
        format!("**/tests/test_{n}{ext}"),
        format!("**/tests/{n}_test{ext}"),
        format!("**/test/test_{n}{ext}"),
        format!("**/test/{n}_test{ext}"),
    ]);

    out
}

fn braced_candidates(n: &str, ext: &str, dir: Option<&str>) -> Vec<String> {
    let mut out = Vec::new();

    if let Some(d) = dir {
        out.push(format!("{d}/{n}.test{ext}"));
        out.push(format!("{d}/{n}.spec{ext}"));
        out.push(format!("{d}/test_{n}{ext}"));
        out.push(format!("{d}/__tests__/{n}.test{ext}"));
        out.push(format!("{d}/__tests__/{n}.spec{ext}"));
        out.push(format!("{d}/__tests__/{n}{ext}"));
    }

    out.extend([
        // jest / react
        format!("test_{n}{ext}"),
        format!("{n}.test{ext}"),
        format!("{n}.spec{ext}"),
        format!("__tests__/{n}.test{ext}"),
        format!("__tests__/{n}.spec{ext}"),
        format!("tests/{n}.test{ext}"),
        format!("tests/{n}.spec{ext}"),
        format!("test/{n}.test{ext}"),
        format!("test/{n}.spec{ext}"),
        // js sources tested from typescript
        format!("test_{n}.ts"),
        format!("{n}.test.ts"),
        format!("{n}.spec.ts"),
        format!("test_{n}.tsx"),
        format!("{n}.test.tsx"),
        format!("{n}.spec.tsx"),
        // cypress
        format!("cypress/integration/{n}.spec{ext}"),
        format!("cypress/e2e/{n}.cy{ext}"),
        // next.js
        format!("__tests__/{n}{ext}"),
        format!("**/__tests__/{n}{ext}"),
        // anywhere
        format!("**/test_{n}{ext}"),
        format!("**/{n}.test{ext}"),
        format!("**/{n}.spec{ext}"),
    ]);

    out
}

/* ============================================================
   Name helpers
   ============================================================ */

/// File stem without leading underscores (`__init__` → `init__`).
pub fn clean_stem(path: &Path) -> String {
    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or_default();
    let clean = stem.trim_start_matches('_');
    if clean.is_empty() {
        stem.to_string()
    } else {
        clean.to_string()
    }
}

/// `.py`, `.tsx`, or empty.
pub fn dotted_extension(path: &Path) -> String {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{e}"))
        .unwrap_or_default()
}

/// Parent directory joined with `/`, `None` at the root.
fn slash_dir(rel: &Path) -> Option<String> {
    let parts: Vec<&str> = rel
        .parent()?
        .components()
        .filter_map(|c| match c {
            Component::Normal(s) => s.to_str(),
            _ => None,
        })
        .collect();

    if parts.is_empty() {
        None
    } else {
        Some(parts.join("/"))
    }
}

/// Makes `[` and `]` literal for glob matching (route groups like `[id]`).
pub fn escape_brackets(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 8);
    for ch in pattern.chars() {
        match ch {
            '[' => out.push_str("[[]"),
            ']' => out.push_str("[]]"),
            c => out.push(c),
        }
    }
    out
}
