//! Argument extraction for `<tool>` / `<tool_call>` tags
//!
//! Models are inconsistent about how they spell tool calls: some emit a
//! JSON body, some flat `<argument name value/>` elements, some nested
//! `<key>value</key>` children. This module normalizes all of them into a
//! `{"name": ..., "arguments": {...}}` content string and never fails —
//! the worst case degrades to the raw inner text so the caller still has
//! something to display.

use regex::Regex;
use serde_json::{json, Map, Value};
use std::sync::OnceLock;

use super::tokenizer::get_attribute;

/// Child tag names that are structure, never argument keys.
const EXCLUDED_KEYS: [&str; 4] = ["arguments", "thought", "think", "tool_call"];

fn flat_argument_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<argument\s+name=["']([^"']*)["']\s+value=["']([^"']*)["']\s*/?>"#)
            .expect("flat argument pattern is valid")
    })
}

/// Build the content string for a tool segment from the tag's attribute
/// string and inner text.
pub(crate) fn tool_content(attrs: &str, inner: &str) -> String {
    let trimmed = inner.trim();

    // Trust embedded JSON over re-derivation.
    if trimmed.starts_with('{') {
        return trimmed.to_string();
    }

    let Some(tool_name) = get_attribute(attrs, "name") else {
        // No declared tool name and no JSON body: nothing to normalize.
        return trimmed.to_string();
    };

    let mut args = Map::new();

    for captures in flat_argument_re().captures_iter(inner) {
        args.insert(
            captures[1].to_string(),
            Value::String(captures[2].to_string()),
        );
    }

    if args.is_empty() {
        // Nested form: each immediate child element is one argument keyed
        // by its tag name, optionally wrapped in an <arguments> block.
        let scope = inner_block(inner, "arguments").unwrap_or(inner);
        for (key, value) in child_elements(scope) {
            if EXCLUDED_KEYS.contains(&key) {
                continue;
            }
            args.insert(key.to_string(), Value::String(value.trim().to_string()));
        }
    }

    json!({ "name": tool_name, "arguments": Value::Object(args) }).to_string()
}

/// Extract the inner text of the first `<name>...</name>` block, if any.
fn inner_block<'a>(text: &'a str, name: &str) -> Option<&'a str> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    let start = text.find(&open)? + open.len();
    let end = text[start..].find(&close)? + start;
    Some(&text[start..end])
}

/// Scan for `<key>value</key>` child elements. The regex crate has no
/// backreferences, so open/close pairing is done by literal search.
fn child_elements(scope: &str) -> Vec<(&str, &str)> {
    let mut out = Vec::new();
    let mut pos = 0;
    while pos < scope.len() {
        let Some(rel) = scope[pos..].find('<') else {
            break;
        };
        let start = pos + rel;
        let rest = &scope[start + 1..];
        let name_len: usize = rest
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '_')
            .map(char::len_utf8)
            .sum();
        if name_len == 0 || !rest[name_len..].starts_with('>') {
            pos = start + 1;
            continue;
        }
        let name = &rest[..name_len];
        let body_start = start + 1 + name_len + 1;
        let close = format!("</{name}>");
        match scope[body_start..].find(&close) {
            Some(at) => {
                out.push((name, &scope[body_start..body_start + at]));
                pos = body_start + at + close.len();
            }
            None => {
                pos = start + 1;
            }
        }
    }
    out
}
