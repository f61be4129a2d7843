//! Traffic counters retained between connection-stream updates.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The last observed counters for one entity (a connection, or the totals).
///
/// Only used to diff the next update against; never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TrafficSample {
    /// Bytes sent so far.
    pub upload: u64,
    /// Bytes received so far.
    pub download: u64,
}

impl TrafficSample {
    /// Create a sample from raw counters.
    pub const fn new(upload: u64, download: u64) -> Self {
        Self { upload, download }
    }

    /// Read the `upload` and `download` counters of a connection record.
    ///
    /// Missing or non-numeric counters read as 0; fractional or negative
    /// numbers are truncated into `u64` range.
    pub fn from_record(record: &Value) -> Self {
        Self {
            upload: counter(record.get("upload")),
            download: counter(record.get("download")),
        }
    }

    /// Read the document-level `total_upload` / `total_download` counters.
    ///
    /// Returns `None` if the document carries neither.
    pub fn totals(document: &Value) -> Option<Self> {
        let upload = document.get("total_upload");
        let download = document.get("total_download");
        if upload.is_none() && download.is_none() {
            return None;
        }
        Some(Self {
            upload: counter(upload),
            download: counter(download),
        })
    }
}

fn counter(value: Option<&Value>) -> u64 {
    match value {
        Some(v) => v
            .as_u64()
            .or_else(|| v.as_f64().map(|f| f.max(0.0) as u64))
            .unwrap_or(0),
        None => 0,
    }
}
