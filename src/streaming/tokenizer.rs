//! Scanning tokenizer for the inline tag grammar
//!
//! One pass over the buffer, one state per currently-open tag. All bounds
//! (buffer length, tag-match count, forward progress) are structural: the
//! scan position strictly advances on every iteration and recognized tags
//! are counted against a hard cap.

use super::{arguments, pending, Segment, SegmentKind, TokenizerLimits};
use super::{SCAN_ABORT_MARKER, TRUNCATION_MARKER};

/// Longest unterminated tag header we are willing to hold back at the end
/// of the buffer while waiting for more chunks. Anything longer is treated
/// as plain text.
const MAX_HEADER_LEN: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TagKind {
    Thought,
    Tool,
    Pending,
    ToolResult,
    Answer,
}

fn lookup_tag(name: &str) -> Option<TagKind> {
    match name {
        "thought" | "think" => Some(TagKind::Thought),
        "tool_call" | "tool" => Some(TagKind::Tool),
        "tool_pending" => Some(TagKind::Pending),
        "tool_result" => Some(TagKind::ToolResult),
        "answer" => Some(TagKind::Answer),
        _ => None,
    }
}

/// Whether `name` could still grow into a recognized tag name.
fn is_tag_name_prefix(name: &str) -> bool {
    const NAMES: [&str; 7] = [
        "thought",
        "think",
        "tool_call",
        "tool",
        "tool_pending",
        "tool_result",
        "answer",
    ];
    NAMES.iter().any(|n| n.starts_with(name))
}

struct TagHeader<'a> {
    kind: TagKind,
    name: &'a str,
    attrs: &'a str,
    /// Length of the full `<name ...>` header in bytes.
    len: usize,
    self_closing: bool,
}

enum HeaderScan<'a> {
    Tag(TagHeader<'a>),
    /// The `<` does not open a recognized tag; keep it as plain text.
    NotATag,
    /// A recognized tag may still be forming at the end of the buffer.
    PartialAtEnd,
}

/// Parse a tag header at the start of `slice` (which begins with `<`).
fn parse_tag_header(slice: &str) -> HeaderScan<'_> {
    let rest = &slice[1..];
    let name_len: usize = rest
        .chars()
        .take_while(|c| c.is_ascii_lowercase() || *c == '_')
        .map(char::len_utf8)
        .sum();
    if name_len == 0 {
        return HeaderScan::NotATag;
    }
    let name = &rest[..name_len];

    if name_len == rest.len() {
        // Buffer ends inside the name. Hold it back only if it can still
        // become one of our tags once more chunks arrive.
        if is_tag_name_prefix(name) {
            return HeaderScan::PartialAtEnd;
        }
        return HeaderScan::NotATag;
    }

    let Some(kind) = lookup_tag(name) else {
        return HeaderScan::NotATag;
    };

    // The name must be delimited by `>`, `/` or whitespace.
    let after_name = &rest[name_len..];
    let delimiter = after_name.chars().next().unwrap_or('>');
    if delimiter != '>' && delimiter != '/' && !delimiter.is_whitespace() {
        return HeaderScan::NotATag;
    }

    let Some(close) = after_name.find('>') else {
        if slice.len() <= MAX_HEADER_LEN {
            return HeaderScan::PartialAtEnd;
        }
        return HeaderScan::NotATag;
    };

    let mut attrs = &after_name[..close];
    let mut self_closing = false;
    let trimmed = attrs.trim_end();
    if let Some(stripped) = trimmed.strip_suffix('/') {
        self_closing = true;
        attrs = stripped;
    }

    HeaderScan::Tag(TagHeader {
        kind,
        name,
        attrs,
        len: 1 + name_len + close + 1,
        self_closing,
    })
}

/// Clamp the buffer to the length cap, cutting at a char boundary.
fn clamp_to_limit(buffer: &str, max_len: usize) -> (&str, bool) {
    if buffer.len() <= max_len {
        return (buffer, false);
    }
    let mut cut = max_len;
    while cut > 0 && !buffer.is_char_boundary(cut) {
        cut -= 1;
    }
    (&buffer[..cut], true)
}

fn push_text(segments: &mut Vec<Segment>, run: &str) {
    let trimmed = run.trim();
    if !trimmed.is_empty() {
        segments.push(Segment::text(trimmed));
    }
}

fn emit_tag(segments: &mut Vec<Segment>, header: &TagHeader<'_>, content: &str, streaming: bool) {
    match header.kind {
        TagKind::Thought => {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                segments.push(Segment::thought(trimmed, streaming));
            }
        }
        TagKind::Answer => {
            let trimmed = content.trim();
            if !trimmed.is_empty() {
                segments.push(Segment {
                    kind: SegmentKind::Text,
                    content: trimmed.to_string(),
                    streaming,
                });
            }
        }
        TagKind::Tool => {
            segments.push(Segment::tool(
                arguments::tool_content(header.attrs, content),
                streaming,
            ));
        }
        TagKind::Pending => {
            // Attributes carry the whole payload; inner text (if any) is
            // ignored. A malformed tag is dropped here, not surfaced.
            if let Some(action) = pending::decode_pending(header.attrs) {
                if let Ok(encoded) = serde_json::to_string(&action) {
                    segments.push(Segment {
                        kind: SegmentKind::Pending,
                        content: encoded,
                        streaming,
                    });
                }
            }
        }
        TagKind::ToolResult => {
            // Recognized and discarded: tool results are fed back to the
            // model, never shown to the user.
        }
    }
}

/// Scan the full buffer and emit ordered segments.
///
/// Pure function of the input: the same buffer always yields the same
/// segment list. Segments whose closing tag has not arrived are flagged
/// `streaming = true`; callers re-invoke on the grown buffer.
pub fn tokenize(buffer: &str, limits: &TokenizerLimits) -> Vec<Segment> {
    let (text, truncated) = clamp_to_limit(buffer, limits.max_buffer_len);

    let mut segments = Vec::new();
    let mut pos = 0;
    let mut text_start = 0;
    let mut matches = 0usize;
    let mut aborted = false;

    while pos < text.len() {
        let Some(rel) = text[pos..].find('<') else {
            break;
        };
        let tag_pos = pos + rel;

        match parse_tag_header(&text[tag_pos..]) {
            HeaderScan::NotATag => {
                // The `<` stays part of the current text run.
                pos = tag_pos + 1;
            }
            HeaderScan::PartialAtEnd => {
                // Flush preceding text; the held-back header re-appears in
                // the next parse of the grown buffer.
                push_text(&mut segments, &text[text_start..tag_pos]);
                text_start = text.len();
                pos = text.len();
            }
            HeaderScan::Tag(header) => {
                matches += 1;
                if matches > limits.max_tag_matches {
                    aborted = true;
                    push_text(&mut segments, &text[text_start..tag_pos]);
                    text_start = text.len();
                    break;
                }

                push_text(&mut segments, &text[text_start..tag_pos]);

                let body_start = tag_pos + header.len;
                let (content, end, streaming) = if header.self_closing {
                    ("", body_start, false)
                } else {
                    let close = format!("</{}>", header.name);
                    match text[body_start..].find(&close) {
                        Some(at) => (
                            &text[body_start..body_start + at],
                            body_start + at + close.len(),
                            false,
                        ),
                        None => (&text[body_start..], text.len(), true),
                    }
                };

                emit_tag(&mut segments, &header, content, streaming);

                // Forward progress even for a degenerate zero-width match.
                pos = end.max(tag_pos + 1);
                text_start = pos;
            }
        }
    }

    if text_start < text.len() {
        push_text(&mut segments, &text[text_start..]);
    }
    if aborted {
        segments.push(Segment::text(SCAN_ABORT_MARKER));
    }
    if truncated {
        segments.push(Segment::text(TRUNCATION_MARKER));
    }
    segments
}

/// Look up one attribute value in a tag's attribute string.
///
/// Pure scan, no caching: per-call cost is negligible relative to the parse
/// itself. Accepts single or double quotes.
pub(crate) fn get_attribute(attrs: &str, name: &str) -> Option<String> {
    let mut search = 0;
    while let Some(rel) = attrs[search..].find(name) {
        let at = search + rel;
        search = at + name.len();

        let preceded_by_name_char = attrs[..at]
            .chars()
            .next_back()
            .is_some_and(|c| c.is_ascii_alphanumeric() || c == '_');
        if preceded_by_name_char {
            continue;
        }

        let after = attrs[search..].trim_start();
        let Some(rest) = after.strip_prefix('=') else {
            continue;
        };
        let rest = rest.trim_start();
        let mut chars = rest.chars();
        match chars.next() {
            Some(quote @ ('"' | '\'')) => {
                if let Some(end) = rest[1..].find(quote) {
                    return Some(rest[1..1 + end].to_string());
                }
                return None;
            }
            _ => continue,
        }
    }
    None
}

#[cfg(test)]
mod attribute_tests {
    use super::get_attribute;

    #[test]
    fn finds_double_and_single_quoted_values() {
        let attrs = r#" request_id="r1" tool='file' "#;
        assert_eq!(get_attribute(attrs, "request_id").as_deref(), Some("r1"));
        assert_eq!(get_attribute(attrs, "tool").as_deref(), Some("file"));
    }

    #[test]
    fn does_not_match_inside_longer_names() {
        let attrs = r#" request_id="r1" id="other" "#;
        assert_eq!(get_attribute(attrs, "id").as_deref(), Some("other"));
    }

    #[test]
    fn missing_or_unquoted_attributes_are_none() {
        assert_eq!(get_attribute(r#" tool="file" "#, "action"), None);
        assert_eq!(get_attribute(" tool=file ", "tool"), None);
        assert_eq!(get_attribute(r#" tool="unterminated "#, "tool"), None);
    }
}
