//! Remote control endpoints.

use serde::{Deserialize, Serialize};

/// Storage key under which the endpoint list is persisted.
pub const ENDPOINTS_KEY: &str = "rdp-instances";

/// Address of the control API bundled with a local install.
pub const LOCAL_ENDPOINT_URL: &str = "http://127.0.0.1:8030";

/// A named remote control endpoint.
///
/// Serialized in camelCase so lists written by other frontends load as-is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Endpoint {
    pub id: String,
    pub name: String,
    /// Base URL of the control API, e.g. `http://127.0.0.1:8030`.
    pub url: String,
    /// Whether this endpoint is the current focus.
    pub is_active: bool,
}

impl Endpoint {
    /// Create an inactive endpoint.
    pub fn new(id: impl Into<String>, name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            url: url.into(),
            is_active: false,
        }
    }

    /// The endpoint used when nothing has been stored yet.
    pub fn local() -> Self {
        Self {
            id: "local".to_string(),
            name: "Local instance".to_string(),
            url: LOCAL_ENDPOINT_URL.to_string(),
            is_active: true,
        }
    }
}
