// src/testgen/file.rs

use std::fs;
use std::io;
use std::path::Path;

use similar::{ChangeTag, TextDiff};
use tracing::{debug, enabled, Level};

/* ============================================================
   Public API
   ============================================================ */

/// Replaces the test file's content. The file always holds exactly the
/// code that is about to run.
pub fn write_test(path: &Path, content: &str) -> io::Result<()> {
    ensure_parent_dir(path)?;

    if enabled!(Level::DEBUG) {
        let before = fs::read_to_string(path).ok();
        debug!(
            test = %path.display(),
            "test file update:\n{}",
            pretty_diff(before.as_deref(), Some(content))
        );
    }

    fs::write(path, content)
}

pub fn ensure_parent_dir(path: &Path) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Line diff with `+`/`-`/` ` markers.
pub fn pretty_diff(before: Option<&str>, after: Option<&str>) -> String {
    match (before, after) {
        (Some(b), Some(a)) => {
            let diff = TextDiff::from_lines(b, a);
            let mut out = String::new();

            for change in diff.iter_all_changes() {
                let sign = match change.tag() {
                    ChangeTag::Delete => "-",
                    ChangeTag::Insert => "+",
                    ChangeTag::Equal => " ",
                };
                out.push_str(sign);
                out.push_str(change.value());
                if change.missing_newline() {
                    out.push('\n');
                }
            }

            out
        }

        (None, Some(a)) => prefix_lines(a, '+'),
        (Some(b), None) => prefix_lines(b, '-'),
        (None, None) => String::new(),
    }
}

fn prefix_lines(s: &str, sign: char) -> String {
    s.lines().map(|l| format!("{sign}{l}\n")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn write_creates_parents_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("a/b/test_x.py");

        write_test(&path, "one\n").unwrap();
        write_test(&path, "two\n").unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap(), "two\n");
    }

    #[test]
    fn diff_marks_changes() {
        let d = pretty_diff(Some("a\nb\n"), Some("a\nc\n"));
        assert_eq!(d, " a\n-b\n+c\n");
        assert_eq!(pretty_diff(None, Some("x\ny")), "+x\n+y\n");
        assert_eq!(pretty_diff(None, None), "");
    }
}
