//! Post-processing for plain-text segments
//!
//! Smaller models leak pieces of the tool protocol into prose: bare
//! `SEARCH WEB ...` header lines, raw `{"name": ..., "arguments": ...}`
//! objects that escaped their tags, and empty fenced code blocks left over
//! from aborted formatting. All of these are stripped before display.

use regex::Regex;
use std::sync::OnceLock;

fn tool_header_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^[ \t]*(?:GET|UPDATE|DELETE|SEARCH|WRITE)[ \t]+(?:MEMORY|WEB|FILE)\b.*\n?")
            .expect("tool header pattern is valid")
    })
}

fn tool_json_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"\{\s*"name"\s*:\s*"[^"]*"\s*,\s*"arguments"\s*:\s*\{[^{}]*\}\s*\}"#)
            .expect("tool json pattern is valid")
    })
}

fn empty_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?m)^```[A-Za-z0-9_+-]*[ \t]*\n(?:[ \t]*\n)*```[ \t]*\n?")
            .expect("empty fence pattern is valid")
    })
}

/// Strip leaked tool artifacts from one plain-text segment.
///
/// Returns the cleaned, trimmed text; an empty result means the segment
/// should be dropped entirely.
pub(crate) fn sanitize_text(text: &str) -> String {
    let cleaned = tool_header_re().replace_all(text, "");
    let cleaned = tool_json_re().replace_all(&cleaned, "");
    let cleaned = empty_fence_re().replace_all(&cleaned, "");
    cleaned.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::sanitize_text;

    #[test]
    fn strips_leaked_tool_header_lines() {
        let input = "Let me check.\nSEARCH WEB current weather\nHere is what I found.";
        assert_eq!(sanitize_text(input), "Let me check.\nHere is what I found.");
    }

    #[test]
    fn keeps_prose_that_merely_mentions_verbs() {
        let input = "You can GET a coffee while I search the web.";
        assert_eq!(sanitize_text(input), input);
    }

    #[test]
    fn strips_escaped_tool_json() {
        let input = r#"Running it now {"name": "web", "arguments": {"action": "search"}} done."#;
        assert_eq!(sanitize_text(input), "Running it now  done.");
    }

    #[test]
    fn strips_empty_code_fences() {
        let input = "Before\n```python\n\n```\nAfter";
        assert_eq!(sanitize_text(input), "Before\nAfter");
    }

    #[test]
    fn fully_leaked_segment_becomes_empty() {
        assert_eq!(sanitize_text("GET MEMORY user profile\n"), "");
        assert_eq!(sanitize_text("   \n  "), "");
    }
}
