use std::path::Path;

use testsmith::detectors::language::LanguageFamily;
use testsmith::testgen::{CodeMerger, MergeError};

fn defines_all(out: &str, names: &[&str]) {
    for n in names {
        assert!(out.contains(n), "missing {n} in:\n{out}");
    }
}

#[test]
fn python_merge_keeps_both_sides_and_revalidates() {
    let old = "import math\n\n\ndef test_sqrt():\n    assert math.sqrt(4) == 2\n";
    let new = "import math\nfrom calc import add\n\n\ndef test_add():\n    assert add(1, 2) == 3\n";

    let merger = CodeMerger::new();
    let out = merger
        .merge(Path::new("tests/test_calc.py"), new, Some(old))
        .unwrap()
        .expect("valid inputs merge");

    defines_all(&out, &["def test_sqrt", "def test_add", "from calc import add"]);
    assert_eq!(out.matches("import math").count(), 1);

    // The result is itself a valid merge input.
    let again = merger.merge(Path::new("tests/test_calc.py"), &out, Some(&out)).unwrap();
    assert_eq!(again.as_deref(), Some(out.as_str()));
}

#[test]
fn typescript_merge_keeps_both_sides() {
    let old = "import { sum } from '../sum';\n\ntest('sums', () => {\n  expect(sum(1, 2)).toBe(3);\n});\n";
    let new = "import { sum } from '../sum';\n\ndescribe('sum', () => {\n  it('handles zero', () => expect(sum(0, 0)).toBe(0));\n});\n";

    let out = CodeMerger::new()
        .merge(Path::new("src/sum.test.ts"), new, Some(old))
        .unwrap()
        .expect("valid inputs merge");

    defines_all(&out, &["test('sums'", "describe('sum'"]);
    assert_eq!(out.matches("import { sum }").count(), 1);
}

#[test]
fn missing_old_content_still_validates_new() {
    let merger = CodeMerger::new();
    let out = merger
        .merge(Path::new("a.spec.tsx"), "test('renders', () => <b />);", None)
        .unwrap();
    assert!(out.is_some());

    let bad = merger.merge(Path::new("a.spec.tsx"), "test('renders', () => <b>);", None).unwrap();
    assert!(bad.is_none());
}

#[test]
fn syntax_errors_never_raise() {
    let merger = CodeMerger::new();
    for (path, code) in [
        ("t.py", "class :\n"),
        ("t.test.js", "function (\n"),
        ("t.test.ts", "const x: = 1;"),
    ] {
        let res = merger.merge(Path::new(path), code, Some(""));
        assert!(matches!(res, Ok(None)), "{path}: {res:?}");
    }
}

#[test]
fn unsupported_extension_is_distinct_from_parse_failure() {
    let err = CodeMerger::new()
        .merge(Path::new("tests/test_main.go"), "package main", Some(""))
        .unwrap_err();
    assert!(matches!(err, MergeError::UnsupportedLanguage { .. }));
}

#[test]
fn formatter_runs_after_merge() {
    let merger = CodeMerger::new().with_formatter(LanguageFamily::Braced, "tr -d ';'");
    let out = merger
        .merge(Path::new("x.test.js"), "test('a', () => {});", Some("const a = 1;"))
        .unwrap()
        .unwrap();
    assert!(!out.contains(';'));
    assert!(out.contains("const a = 1"));
}
