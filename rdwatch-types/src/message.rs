//! Connection push-stream frames.

use json_patch::Patch;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A frame received on the connection stream.
///
/// The server sends a `full` snapshot first and, in patch mode, a `patch`
/// against the previously sent document on every following tick.
///
/// ```text
/// {"full": {"connections": {...}, "total_upload": 0, "total_download": 0}}
/// {"patch": [{"op": "replace", "path": "/total_upload", "value": 42}]}
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionMessage {
    /// Complete replacement of the baseline document.
    Full(Value),
    /// Ordered operations to apply to the current baseline.
    Patch(Patch),
}

impl ConnectionMessage {
    /// Decode a raw text frame.
    ///
    /// Unknown operations or operations missing required members (`from`
    /// for `move`) fail here, before any of them is applied.
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Returns true for a full snapshot.
    pub fn is_full(&self) -> bool {
        matches!(self, ConnectionMessage::Full(_))
    }

    /// Number of operations carried by a patch (0 for a full snapshot).
    pub fn operation_count(&self) -> usize {
        match self {
            ConnectionMessage::Full(_) => 0,
            ConnectionMessage::Patch(patch) => patch.0.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_full() {
        let msg = ConnectionMessage::parse(
            r#"{"full":{"connections":{"c1":{"upload":0,"download":0}}}}"#,
        )
        .unwrap();

        match msg {
            ConnectionMessage::Full(doc) => {
                assert_eq!(doc["connections"]["c1"]["upload"], json!(0));
            }
            ConnectionMessage::Patch(_) => panic!("expected a full snapshot"),
        }
    }

    #[test]
    fn test_parse_patch_keeps_order() {
        let msg = ConnectionMessage::parse(
            r#"{"patch":[
                {"op":"add","path":"/a","value":1},
                {"op":"remove","path":"/b"},
                {"op":"move","from":"/c","path":"/d"}
            ]}"#,
        )
        .unwrap();

        assert!(!msg.is_full());
        assert_eq!(msg.operation_count(), 3);

        let ConnectionMessage::Patch(patch) = msg else {
            panic!("expected a patch");
        };
        let ops = serde_json::to_value(&patch).unwrap();
        assert_eq!(ops[0]["op"], "add");
        assert_eq!(ops[1]["op"], "remove");
        assert_eq!(ops[2]["op"], "move");
    }

    #[test]
    fn test_parse_rejects_unknown_operation() {
        let result = ConnectionMessage::parse(r#"{"patch":[{"op":"merge","path":"/a"}]}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_parse_rejects_unknown_frame() {
        assert!(ConnectionMessage::parse(r#"{"delta":{}}"#).is_err());
        assert!(ConnectionMessage::parse("not json").is_err());
    }

    #[test]
    fn full_snapshot_serializes_with_lowercase_tag() {
        let msg = ConnectionMessage::Full(json!({"connections": {}}));
        let text = serde_json::to_string(&msg).unwrap();
        assert_eq!(text, r#"{"full":{"connections":{}}}"#);
    }
}
