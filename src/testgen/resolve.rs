use std::collections::HashSet;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::time::SystemTime;

use glob::{MatchOptions, Pattern};
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::detectors::language::{is_ignored, Language, LanguageFamily};
use crate::state::{SourceFile, TestFile};
use crate::testgen::patterns::{clean_stem, dotted_extension, escape_brackets, CorrespondenceRule};

const GLOB_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// Directory names that mark file-based routing (Next.js and friends).
const ROUTE_DIRS: [&str; 2] = ["pages", "app"];

const TEST_SUFFIXES: [&str; 4] = ["_test", ".test", ".spec", ".cy"];

/* ============================================================
   Resolver
   ============================================================ */

/// Maps source files to test files and back, relative to a project root.
///
/// Relative inputs are taken relative to `root`. Nothing is cached: every
/// call looks at the filesystem as it is now.
#[derive(Debug, Clone)]
pub struct TestCorrespondenceResolver {
    root: PathBuf,
    ignore: Vec<Pattern>,
}

impl TestCorrespondenceResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            ignore: Vec::new(),
        }
    }

    /// Extra root-relative globs to skip. Invalid patterns are dropped.
    pub fn with_ignore(mut self, patterns: &[String]) -> Self {
        self.ignore = patterns
            .iter()
            .filter_map(|p| match Pattern::new(p) {
                Ok(p) => Some(p),
                Err(e) => {
                    debug!(pattern = %p, error = %e, "ignoring invalid ignore glob");
                    None
                }
            })
            .collect();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// The existing test for `source`, if any candidate location has one.
    pub fn find_test(&self, source: &Path) -> Option<TestFile> {
        let abs = self.absolute(source);
        let (rel, colocated) = match self.relative(&abs) {
            Some(rel) => (rel, true),
            None => (PathBuf::from(abs.file_name()?), false),
        };

        let rule = CorrespondenceRule::for_source(&rel, colocated);
        self.first_match(&rule.candidates, &abs).map(TestFile::new)
    }

    /// Like [`find_test`](Self::find_test), but picks and creates a location
    /// when nothing exists. The new file is empty.
    pub fn create_test(&self, source: &Path) -> io::Result<TestFile> {
        if let Some(found) = self.find_test(source) {
            debug!(test = %found.path.display(), "existing test file");
            return Ok(found);
        }

        let path = self.new_test_location(&self.absolute(source));

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        if !path.exists() {
            fs::File::create(&path)?;
            info!(test = %path.display(), "created test file");
        }

        Ok(TestFile::new(path))
    }

    /// Where the test for `source` lives or would be created. Touches
    /// nothing.
    pub fn test_location(&self, source: &Path) -> PathBuf {
        match self.find_test(source) {
            Some(found) => found.path,
            None => self.new_test_location(&self.absolute(source)),
        }
    }

    fn new_test_location(&self, abs_source: &Path) -> PathBuf {
        let rel_test = self
            .infer_from_siblings(abs_source)
            .unwrap_or_else(|| self.standard_location(abs_source));
        self.root.join(rel_test)
    }

    /// Reverse lookup: the source a test file most likely covers.
    pub fn find_source(&self, test: &Path) -> Option<SourceFile> {
        let abs_test = self.absolute(test);
        let stem = abs_test.file_stem()?.to_str()?;
        let name = strip_test_affixes(stem);
        if name.is_empty() {
            return None;
        }

        let ext = abs_test.extension()?.to_str()?;
        let patterns: Vec<String> = source_extensions(ext)
            .iter()
            .flat_map(|e| source_candidates(name, e))
            .collect();

        let path = self.first_match(&patterns, &abs_test)?;
        SourceFile::read(&path).ok()
    }

    /// Supported non-test files and the tests that correspond to them, each
    /// list newest first.
    pub fn list_files_and_tests(&self) -> (Vec<PathBuf>, Vec<PathBuf>) {
        let all: Vec<PathBuf> = WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !self.skipped(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
            .map(|e| e.into_path())
            .filter(|p| Language::from_path(p).is_supported())
            .collect();

        let tests: HashSet<PathBuf> = all
            .iter()
            .filter_map(|p| self.find_test(p))
            .map(|t| t.path)
            .collect();

        let mut files: Vec<PathBuf> = all.into_iter().filter(|p| !tests.contains(p)).collect();
        let mut tests: Vec<PathBuf> = tests.into_iter().collect();

        sort_newest_first(&mut files);
        sort_newest_first(&mut tests);
        (files, tests)
    }

    /* ============================================================
       Matching
       ============================================================ */

    /// First pattern with a hit wins. Per pattern: literal path, then the
    /// pattern with brackets escaped, then the pattern as written. Hits
    /// inside one pattern are ordered lexically.
    fn first_match(&self, patterns: &[String], exclude: &Path) -> Option<PathBuf> {
        let escaped_root = Pattern::escape(&self.root.to_string_lossy());

        for pattern in patterns {
            let direct = self.root.join(pattern);
            if direct.is_file() && direct != exclude && !self.skipped(&direct) {
                return Some(direct);
            }

            let escaped = escape_brackets(pattern);
            let mut variants = vec![escaped.as_str()];
            if escaped != *pattern {
                variants.push(pattern.as_str());
            }

            for candidate in variants {
                let full = format!("{}/{}", escaped_root.trim_end_matches('/'), candidate);
                let Ok(paths) = glob::glob_with(&full, GLOB_OPTIONS) else {
                    continue;
                };

                let mut hits: Vec<PathBuf> = paths
                    .filter_map(Result::ok)
                    .filter(|p| p.is_file() && p != exclude && !self.skipped(p))
                    .collect();
                hits.sort();

                if let Some(hit) = hits.into_iter().next() {
                    return Some(hit);
                }
            }
        }

        None
    }

    fn skipped(&self, path: &Path) -> bool {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        is_ignored(rel) || self.ignore.iter().any(|p| p.matches_path(rel))
    }

    /* ============================================================
       Creation strategies
       ============================================================ */

    /// Borrows the naming of a nearby source's existing test. Walks from
    /// the source's directory up to the root; siblings are tried in name
    /// order.
    fn infer_from_siblings(&self, abs_source: &Path) -> Option<PathBuf> {
        let rel_source = self.relative(abs_source)?;
        let target_name = clean_stem(&rel_source);
        let ext = abs_source.extension()?;

        let mut dir = abs_source.parent()?.to_path_buf();
        loop {
            for sibling in self.siblings(&dir, ext, abs_source) {
                let Some(rel_sibling) = self.relative(&sibling) else {
                    continue;
                };
                let rule = CorrespondenceRule::for_source(&rel_sibling, true);
                let Some(found) = self.first_match(&rule.candidates, &sibling) else {
                    continue;
                };
                let Some(rel_found) = self.relative(&found) else {
                    continue;
                };

                let sibling_name = clean_stem(&rel_sibling);
                let Some(file_name) = rel_found.file_name().and_then(|f| f.to_str()) else {
                    continue;
                };
                let Some(renamed) = substitute_stem(file_name, &sibling_name, &target_name) else {
                    continue;
                };

                let inferred = rel_found.with_file_name(renamed);
                if self.root.join(&inferred) == abs_source {
                    continue;
                }

                debug!(
                    sibling = %rel_sibling.display(),
                    test = %inferred.display(),
                    "test location inferred from sibling"
                );
                return Some(inferred);
            }

            if dir == self.root || !dir.pop() || !dir.starts_with(&self.root) {
                break;
            }
        }

        None
    }

    fn siblings(&self, dir: &Path, ext: &std::ffi::OsStr, exclude: &Path) -> Vec<PathBuf> {
        let Ok(entries) = fs::read_dir(dir) else {
            return Vec::new();
        };

        let mut out: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_file() && p != exclude && p.extension() == Some(ext))
            .filter(|p| !self.skipped(p))
            .collect();
        out.sort();
        out
    }

    /// Root-relative fallback location when no convention can be inferred.
    /// Named with the same cleaned stem the candidate tables search for.
    fn standard_location(&self, abs_source: &Path) -> PathBuf {
        let stem = clean_stem(abs_source);
        let ext = dotted_extension(abs_source);

        match Language::from_path(abs_source).family() {
            LanguageFamily::Indented => PathBuf::from(format!("tests/test_{stem}{ext}")),
            LanguageFamily::Braced => {
                let rel_dir = self
                    .relative(abs_source)
                    .and_then(|r| r.parent().map(Path::to_path_buf))
                    .unwrap_or_default();
                let marker = self.majority_marker(&ext);
                let file = format!("{stem}.{marker}{ext}");

                let routed = rel_dir.components().any(|c| match c {
                    Component::Normal(s) => ROUTE_DIRS.iter().any(|r| s == *r),
                    _ => false,
                });

                if routed {
                    rel_dir.join("__tests__").join(file)
                } else {
                    rel_dir.join(file)
                }
            }
        }
    }

    /// `test` or `spec`, whichever the project already uses more. Ties go
    /// to `test`.
    fn majority_marker(&self, ext: &str) -> &'static str {
        let test_suffix = format!(".test{ext}");
        let spec_suffix = format!(".spec{ext}");
        let (mut tests, mut specs) = (0usize, 0usize);

        for entry in WalkDir::new(&self.root)
            .into_iter()
            .filter_entry(|e| !self.skipped(e.path()))
            .filter_map(Result::ok)
            .filter(|e| e.file_type().is_file())
        {
            let name = entry.file_name().to_string_lossy();
            if name.ends_with(&test_suffix) {
                tests += 1;
            } else if name.ends_with(&spec_suffix) {
                specs += 1;
            }
        }

        if specs > tests {
            "spec"
        } else {
            "test"
        }
    }

    /* ============================================================
       Paths
       ============================================================ */

    /// Relative paths are taken relative to the root.
    pub fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            let clean: PathBuf = path
                .components()
                .filter(|c| !matches!(c, Component::CurDir))
                .collect();
            self.root.join(clean)
        }
    }

    /// `None` when `abs` lies outside the root.
    fn relative(&self, abs: &Path) -> Option<PathBuf> {
        abs.strip_prefix(&self.root).ok().map(Path::to_path_buf)
    }
}

/* ============================================================
   Creation helpers
   ============================================================ */

/// Markers that may follow the stem in a test file name.
const STEM_TERMINATORS: [&str; 5] = ["_test", ".test", ".spec", ".cy", "."];

/// Swaps `old` for `new` where the stem sits in a test file name: right
/// after an optional `test_` prefix and right before a test marker or the
/// extension. `None` when the name has no such slot.
fn substitute_stem(file_name: &str, old: &str, new: &str) -> Option<String> {
    ["test_", ""].into_iter().find_map(|prefix| {
        let rest = file_name.strip_prefix(prefix)?.strip_prefix(old)?;
        let bounded = rest.is_empty() || STEM_TERMINATORS.iter().any(|t| rest.starts_with(t));
        bounded.then(|| format!("{prefix}{new}{rest}"))
    })
}

/* ============================================================
   Reverse lookup helpers
   ============================================================ */

fn strip_test_affixes(stem: &str) -> &str {
    let name = stem.strip_prefix("test_").unwrap_or(stem);
    TEST_SUFFIXES
        .iter()
        .find_map(|s| name.strip_suffix(s))
        .unwrap_or(name)
}

/// Tests in one braced dialect often cover sources in another.
fn source_extensions(test_ext: &str) -> Vec<String> {
    let braced = ["ts", "tsx", "js", "jsx"];
    if braced.contains(&test_ext) {
        let mut out = vec![format!(".{test_ext}")];
        out.extend(braced.iter().filter(|e| **e != test_ext).map(|e| format!(".{e}")));
        out
    } else {
        vec![format!(".{test_ext}")]
    }
}

fn source_candidates(n: &str, ext: &str) -> Vec<String> {
    vec![
        format!("{n}{ext}"),
        format!("src/{n}{ext}"),
        format!("**/{n}{ext}"),
        format!("src/**/{n}{ext}"),
        format!("src/pages/**/{n}{ext}"),
        format!("src/components/**/{n}{ext}"),
        format!("src/app/**/{n}{ext}"),
        format!("pages/**/{n}{ext}"),
        format!("app/**/{n}{ext}"),
        format!("components/**/{n}{ext}"),
    ]
}

fn sort_newest_first(paths: &mut [PathBuf]) {
    paths.sort_by_cached_key(|p| {
        let modified = fs::metadata(p)
            .and_then(|m| m.modified())
            .unwrap_or(SystemTime::UNIX_EPOCH);
        (std::cmp::Reverse(modified), p.clone())
    });
}
