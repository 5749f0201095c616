//! Streaming parser for assistant output containing inline control tags
//!
//! The model emits plain text interleaved with a small tag vocabulary:
//! `<thought>`/`<think>` reasoning, `<tool_call>`/`<tool>` invocations,
//! `<tool_pending>` approval requests, `<tool_result>` blocks (consumed,
//! never displayed) and `<answer>` wrappers. The tokenizer re-scans the
//! whole accumulated buffer on every pass and produces an ordered segment
//! list; the consumer drives that re-scan as chunks arrive.

mod arguments;
mod consumer;
mod pending;
mod sanitize;
mod tokenizer;


use serde::{Deserialize, Serialize};

use crate::approval::PendingAction;

pub use consumer::{StreamConsumer, DEFAULT_FLUSH_INTERVAL};
pub use tokenizer::tokenize;

/// Marker appended when the buffer exceeded the length cap and was cut off.
pub const TRUNCATION_MARKER: &str = "[response truncated]";

/// Marker appended when the scan hit the tag-match cap and stopped early.
pub const SCAN_ABORT_MARKER: &str = "[response contained too many tags; parsing stopped]";

/// Bounds enforced by the tokenizer on every parse.
///
/// The parser must terminate in bounded time and memory for any input,
/// including adversarial buffers full of malformed tags.
#[derive(Debug, Clone)]
pub struct TokenizerLimits {
    /// Hard cap on the buffer length considered by one parse, in bytes.
    pub max_buffer_len: usize,
    /// Hard cap on the number of recognized tags per parse.
    pub max_tag_matches: usize,
}

impl Default for TokenizerLimits {
    fn default() -> Self {
        Self {
            max_buffer_len: 256 * 1024,
            max_tag_matches: 2048,
        }
    }
}

/// The type of one parsed segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SegmentKind {
    Text,
    Thought,
    Tool,
    Pending,
}

/// One typed, ordered chunk of parsed message content.
///
/// Segments are recreated from scratch on every re-parse, never mutated.
/// `streaming` is set when the segment's closing tag has not yet arrived;
/// the caller should re-tokenize once more chunks are available.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub kind: SegmentKind,
    pub content: String,
    pub streaming: bool,
}

impl Segment {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            kind: SegmentKind::Text,
            content: content.into(),
            streaming: false,
        }
    }

    pub fn thought(content: impl Into<String>, streaming: bool) -> Self {
        Self {
            kind: SegmentKind::Thought,
            content: content.into(),
            streaming,
        }
    }

    pub fn tool(content: impl Into<String>, streaming: bool) -> Self {
        Self {
            kind: SegmentKind::Tool,
            content: content.into(),
            streaming,
        }
    }

    /// Derive the structured `{name, arguments}` view of a tool segment.
    ///
    /// Tool segment content is a JSON-encoded string of this shape; anything
    /// that fails to parse yields `None` and the caller falls back to
    /// displaying the raw content.
    pub fn tool_invocation(&self) -> Option<ToolInvocation> {
        if self.kind != SegmentKind::Tool {
            return None;
        }
        ToolInvocation::from_json(&self.content)
    }

    /// Decode the pending action carried by a pending segment.
    pub fn pending_action(&self) -> Option<PendingAction> {
        if self.kind != SegmentKind::Pending {
            return None;
        }
        serde_json::from_str(&self.content).ok()
    }
}

/// A structured `{name, arguments}` description of a requested tool action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub name: String,
    pub arguments: std::collections::BTreeMap<String, String>,
}

impl ToolInvocation {
    fn from_json(content: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(content).ok()?;
        let name = value.get("name")?.as_str()?.to_string();
        let mut arguments = std::collections::BTreeMap::new();
        if let Some(map) = value.get("arguments").and_then(|v| v.as_object()) {
            for (key, val) in map {
                let rendered = match val.as_str() {
                    Some(s) => s.to_string(),
                    None => val.to_string(),
                };
                arguments.insert(key.clone(), rendered);
            }
        }
        Some(Self { name, arguments })
    }
}

/// Tokenize a buffer and post-process plain-text segments.
///
/// This is the entry point callers should use: it runs the tokenizer, then
/// strips leaked tool artifacts from text segments and drops segments that
/// end up empty. Pure function of the buffer: identical input always yields
/// an identical segment list.
pub fn parse_message(buffer: &str, limits: &TokenizerLimits) -> Vec<Segment> {
    tokenize(buffer, limits)
        .into_iter()
        .filter_map(|mut segment| {
            if segment.kind == SegmentKind::Text {
                segment.content = sanitize::sanitize_text(&segment.content);
                if segment.content.is_empty() {
                    return None;
                }
            }
            Some(segment)
        })
        .collect()
}
