//! Decoder for `<tool_pending>` approval-request tags
//!
//! The emitter writes one self-contained tag per queued action:
//! `request_id`, `tool`, `action` and a `params_b64` attribute holding
//! base64-encoded UTF-8 JSON. A tag that cannot be decoded is dropped with
//! a warning; a broken approval prompt must never reach the user.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use tracing::warn;

use super::tokenizer::get_attribute;
use crate::approval::{ApprovalStatus, PendingAction};

pub(crate) fn decode_pending(attrs: &str) -> Option<PendingAction> {
    let request_id = require_attr(attrs, "request_id")?;
    let tool = require_attr(attrs, "tool")?;
    let action = require_attr(attrs, "action")?;
    let params_b64 = require_attr(attrs, "params_b64")?;

    // Models like to wrap long attribute values across lines.
    let cleaned: String = params_b64.chars().filter(|c| !c.is_whitespace()).collect();

    let bytes = match STANDARD.decode(cleaned.as_bytes()) {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!("Dropping tool_pending '{request_id}': invalid base64 params: {e}");
            return None;
        }
    };
    let params: serde_json::Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(e) => {
            warn!("Dropping tool_pending '{request_id}': params are not valid JSON: {e}");
            return None;
        }
    };

    Some(PendingAction {
        request_id,
        tool,
        action,
        params,
        status: ApprovalStatus::Unresolved,
    })
}

fn require_attr(attrs: &str, name: &str) -> Option<String> {
    let value = get_attribute(attrs, name);
    if value.is_none() {
        warn!("Dropping tool_pending tag: missing '{name}' attribute");
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn decodes_a_well_formed_tag() {
        // "eyJhIjoxfQ==" is {"a":1}
        let action = decode_pending(
            r#" request_id="r1" tool="file" action="write" params_b64="eyJhIjoxfQ==" "#,
        )
        .unwrap();
        assert_eq!(action.request_id, "r1");
        assert_eq!(action.tool, "file");
        assert_eq!(action.action, "write");
        assert_eq!(action.params, json!({"a": 1}));
        assert_eq!(action.status, ApprovalStatus::Unresolved);
    }

    #[test]
    fn whitespace_inside_params_is_tolerated() {
        let action = decode_pending(
            " request_id=\"r2\" tool=\"web\" action=\"search\" params_b64=\"eyJh\nIjoxfQ==\" ",
        )
        .unwrap();
        assert_eq!(action.params, json!({"a": 1}));
    }

    #[test]
    fn missing_attribute_drops_the_tag() {
        assert!(decode_pending(r#" request_id="r1" tool="file" "#).is_none());
    }

    #[test]
    fn bad_base64_drops_the_tag() {
        assert!(decode_pending(
            r#" request_id="r1" tool="file" action="write" params_b64="!!!" "#
        )
        .is_none());
    }

    #[test]
    fn non_json_params_drop_the_tag() {
        // "bm90IGpzb24=" is "not json"
        assert!(decode_pending(
            r#" request_id="r1" tool="file" action="write" params_b64="bm90IGpzb24=" "#
        )
        .is_none());
    }
}
