mod common;

use std::path::Path;

use tempfile::TempDir;
use testsmith::testgen::TestCorrespondenceResolver;

use common::touch;

#[test]
fn created_test_is_found_again() {
    let layouts = [
        "calc.py",
        "pkg/deep/calc.py",
        "pkg/_helpers.py",
        "src/util.ts",
        "src/components/Button.tsx",
        "app/dashboard/page.tsx",
        "lib/widget.jsx",
    ];

    for source in layouts {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), source, "");
        let r = TestCorrespondenceResolver::new(dir.path());

        assert!(r.find_test(Path::new(source)).is_none(), "{source}: unexpected test");
        let created = r.create_test(Path::new(source)).unwrap();
        assert!(created.exists(), "{source}: not created");

        let found = r.find_test(Path::new(source)).expect("created test resolves");
        assert_eq!(found, created, "{source}");
    }
}

#[test]
fn component_dialect_keeps_its_suffix() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "src/components/Button.tsx", "");
    let r = TestCorrespondenceResolver::new(dir.path());

    let t = r.create_test(Path::new("src/components/Button.tsx")).unwrap();
    assert_eq!(t.path, dir.path().join("src/components/Button.test.tsx"));
}

#[test]
fn route_directories_get_tests_subdirectory() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "app/dashboard/page.tsx", "");
    let r = TestCorrespondenceResolver::new(dir.path());

    let t = r.create_test(Path::new("app/dashboard/page.tsx")).unwrap();
    assert_eq!(t.path, dir.path().join("app/dashboard/__tests__/page.test.tsx"));
}

#[test]
fn convention_is_inherited_from_a_parent_level_sibling() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "src/api.ts", "");
    touch(dir.path(), "src/__tests__/api.spec.ts", "");
    touch(dir.path(), "src/nested/client.ts", "");
    let r = TestCorrespondenceResolver::new(dir.path());

    // src/nested has no tested sibling; src/api.ts resolves one level up.
    let t = r.create_test(Path::new("src/nested/client.ts")).unwrap();
    assert_eq!(t.path, dir.path().join("src/__tests__/client.spec.ts"));
}

#[test]
fn short_sibling_name_does_not_leak_into_the_new_test_name() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "lib/t.py", "");
    touch(dir.path(), "lib/test_t.py", "");
    touch(dir.path(), "lib/calc.py", "");
    let r = TestCorrespondenceResolver::new(dir.path());

    let created = r.create_test(Path::new("lib/calc.py")).unwrap();
    assert_eq!(created.path, dir.path().join("lib/test_calc.py"));
    assert_eq!(r.find_test(Path::new("lib/calc.py")).unwrap(), created);
}

#[test]
fn config_ignore_globs_hide_matches() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "calc.py", "");
    touch(dir.path(), "legacy/tests/test_calc.py", "");

    let plain = TestCorrespondenceResolver::new(dir.path());
    assert!(plain.find_test(Path::new("calc.py")).is_some());

    let ignoring = TestCorrespondenceResolver::new(dir.path()).with_ignore(&["legacy/**".to_string()]);
    assert!(ignoring.find_test(Path::new("calc.py")).is_none());
}

#[test]
fn first_match_is_stable_across_calls() {
    let dir = TempDir::new().unwrap();
    touch(dir.path(), "calc.py", "");
    touch(dir.path(), "b/tests/test_calc.py", "");
    touch(dir.path(), "a/tests/test_calc.py", "");
    let r = TestCorrespondenceResolver::new(dir.path());

    let first = r.find_test(Path::new("calc.py")).unwrap();
    assert_eq!(first.path, dir.path().join("a/tests/test_calc.py"));
    for _ in 0..3 {
        assert_eq!(r.find_test(Path::new("calc.py")).unwrap(), first);
    }
}
