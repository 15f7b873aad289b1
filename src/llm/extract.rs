//! Pulls the test payload out of a raw completion.
//!
//! Convention: `<test ...>` `[test]` payload `</test>`. Whitespace may sit
//! between the opening tag and the marker; anything else makes the block
//! malformed. Tags are case-sensitive and the first well-formed block wins.

use std::sync::OnceLock;

use regex::Regex;

fn block_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)<test(?:\s[^>]*)?>\s*\[test\](.*?)</test>").expect("block pattern is valid")
    })
}

/// Returns the dedented, trimmed payload, or `""` when there is none.
pub fn extract(raw: &str) -> String {
    let Some(caps) = block_re().captures(raw) else {
        return String::new();
    };

    let payload = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
    dedent(payload).trim().to_string()
}

/// Strips the indentation shared by every non-blank line.
fn dedent(s: &str) -> String {
    let common = s
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| l.len() - l.trim_start_matches([' ', '\t']).len())
        .min()
        .unwrap_or(0);

    if common == 0 {
        return s.to_string();
    }

    s.lines()
        .map(|l| if l.trim().is_empty() { "" } else { &l[common..] })
        .collect::<Vec<_>>()
        .join("\n")
}
