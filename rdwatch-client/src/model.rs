//! Request and response bodies of the control API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Configuration source posted to `/config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportSource {
    #[serde(rename = "type")]
    pub kind: String,
    pub data: Map<String, Value>,
}

/// Registered net and server plugins, keyed by category then by name.
pub type RegistryData = BTreeMap<String, BTreeMap<String, Value>>;

/// Latency test request for `/delay/{net}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DelayRequest {
    /// URL fetched through the net.
    pub url: String,
    /// Timeout in milliseconds, server default when `None`.
    pub timeout: Option<u64>,
}

/// Latency measured by the server, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DelayResponse {
    pub connect: u64,
    pub response: u64,
}

#[derive(Debug, Serialize)]
pub(crate) struct SelectPayload<'a> {
    pub selected: &'a str,
}

/// Keys present in the server-side user data store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserDataList {
    pub keys: Vec<String>,
}

/// A net definition from the running configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Net {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(flatten)]
    pub opts: Map<String, Value>,
}

impl Net {
    /// For `select` nets, the names it can switch between.
    pub fn select_list(&self) -> Option<Vec<&str>> {
        if self.kind != "select" {
            return None;
        }
        let list = self.opts.get("list")?.as_array()?;
        Some(list.iter().filter_map(Value::as_str).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_select_list() {
        let net: Net = serde_json::from_value(json!({
            "type": "select",
            "selected": "a",
            "list": ["a", "b"]
        }))
        .unwrap();
        assert_eq!(net.select_list(), Some(vec!["a", "b"]));

        let net: Net = serde_json::from_value(json!({"type": "local"})).unwrap();
        assert_eq!(net.select_list(), None);
    }

    #[test]
    fn test_import_source_uses_type_key() {
        let source = ImportSource {
            kind: "clash".into(),
            data: Map::new(),
        };
        assert_eq!(
            serde_json::to_value(&source).unwrap(),
            json!({"type": "clash", "data": {}})
        );
    }
}
