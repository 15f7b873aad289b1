use crate::state::{SourceFile, TestFile};

/// Console feedback kept in a generation prompt (tail end).
pub const FEEDBACK_LIMIT: usize = 10_000;

#[derive(Debug, Clone)]
pub struct LlmPrompt {
    pub system: String,
    pub user: String,
}

pub fn build_generation_prompt(
    source: &SourceFile,
    test: &TestFile,
    current_test: &str,
    feedback: &str,
) -> LlmPrompt {
    LlmPrompt {
        system: generation_system_prompt(),
        user: generation_user_prompt(source, test, current_test, feedback),
    }
}

pub fn build_classification_prompt(
    source_code: &str,
    test_code: &str,
    error: &str,
) -> LlmPrompt {
    LlmPrompt {
        system: classification_system_prompt(),
        user: classification_user_prompt(source_code, test_code, error),
    }
}

/* ============================================================
   Generation
   ============================================================ */

fn generation_system_prompt() -> String {
    r#"
You are an expert software engineer writing unit tests for a single source file.

Rules:
- Test the public behavior of the file; do not modify production code
- Tests must be deterministic and runnable with the project's existing test runner
- Reuse the existing test file's imports, fixtures and style
- Only add or replace test code; never emit explanations outside the block
- Wrap the complete test code in <test>[test] ... </test>
"#
    .trim()
    .to_string()
}

fn generation_user_prompt(
    source: &SourceFile,
    test: &TestFile,
    current_test: &str,
    feedback: &str,
) -> String {
    let mut out = String::new();

    /* ---------- CONTEXT ---------- */
    out.push_str("CONTEXT\n");
    out.push_str(&format!("Source file: {}\n", source.path.display()));
    out.push_str(&format!("Language: {}\n", source.language));
    out.push_str(&format!("Test file: {}\n\n", test.path.display()));

    out.push_str("SOURCE\n```\n");
    out.push_str(source.contents.trim_end());
    out.push_str("\n```\n\n");

    /* ---------- EXISTING TESTS ---------- */
    out.push_str("TEST STATUS\n");
    if current_test.trim().is_empty() {
        out.push_str("The test file is empty. Write a complete test module.\n\n");
    } else {
        out.push_str(
            "The test file already contains the tests below. Add missing tests and \
             fix broken ones; unchanged tests may be omitted from your answer.\n```\n",
        );
        out.push_str(current_test.trim_end());
        out.push_str("\n```\n\n");
    }

    /* ---------- FEEDBACK ---------- */
    if !feedback.trim().is_empty() {
        out.push_str("PREVIOUS RUN OUTPUT\n");
        out.push_str("Earlier attempts failed with the output below. Fix the causes.\n```\n");
        out.push_str(&truncate_tail(feedback.trim_end(), FEEDBACK_LIMIT));
        out.push_str("\n```\n\n");
    }

    /* ---------- FORMAT ---------- */
    out.push_str("RESPONSE FORMAT\n");
    out.push_str("<test>\n[test]\n<test code>\n</test>\n");

    out
}

/* ============================================================
   Classification
   ============================================================ */

fn classification_system_prompt() -> String {
    r#"
You triage failing unit tests.

Decide whether the failure is caused by:
- the test itself (answer with /test)
- a bug in the source code under test (answer with /bug)
- the environment, dependencies or runner settings (answer with /settings)

Explain your reasoning inside <explanation> ... </explanation>, then finish
with exactly one tag on its own line.
"#
    .trim()
    .to_string()
}

fn classification_user_prompt(source_code: &str, test_code: &str, error: &str) -> String {
    let mut out = String::new();

    out.push_str("SOURCE\n```\n");
    out.push_str(source_code.trim_end());
    out.push_str("\n```\n\n");

    out.push_str("TEST\n```\n");
    out.push_str(test_code.trim_end());
    out.push_str("\n```\n\n");

    out.push_str("ERROR\n```\n");
    out.push_str(&truncate_tail(error.trim_end(), FEEDBACK_LIMIT));
    out.push_str("\n```\n");

    out
}

/* ============================================================
   Helpers
   ============================================================ */

/// Keeps the last `limit` chars; test runners print the useful part last.
pub fn truncate_tail(s: &str, limit: usize) -> String {
    let count = s.chars().count();
    if count <= limit {
        return s.to_string();
    }

    let tail: String = s.chars().skip(count - limit).collect();
    format!("...truncated...\n{}", tail)
}
