//! Baseline document reconciliation.
//!
//! The connection stream sends one full document and then RFC 6902 patches
//! against it. [`Reconciler`] owns the current baseline and turns each
//! message into a new one. Application is copy-on-write: the previous
//! baseline is never touched, so anything still holding its `Arc` (the rate
//! engine, a consumer mid-render) keeps seeing a consistent document.

use std::sync::Arc;

use json_patch::Patch;
use serde_json::Value;

use crate::error::PatchError;

/// Apply `patch` to a structural copy of `baseline`.
///
/// Operations run strictly in order. If any of them fails the whole patch is
/// rejected and no partial result escapes; `baseline` itself is never
/// modified either way.
pub fn apply_patch(baseline: &Value, patch: &Patch) -> Result<Value, PatchError> {
    let mut document = baseline.clone();
    json_patch::patch(&mut document, &patch.0).map_err(|e| PatchError::Rejected(e.to_string()))?;
    Ok(document)
}

/// Holds the baseline document of one connection stream.
#[derive(Debug, Default)]
pub struct Reconciler {
    baseline: Option<Arc<Value>>,
}

impl Reconciler {
    /// Create a reconciler with no baseline yet.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current baseline, `None` until the first full snapshot.
    pub fn baseline(&self) -> Option<&Arc<Value>> {
        self.baseline.as_ref()
    }

    /// Replace the baseline with a full snapshot.
    pub fn reset(&mut self, document: Value) -> Arc<Value> {
        let document = Arc::new(document);
        self.baseline = Some(document.clone());
        document
    }

    /// Apply a patch to the current baseline.
    ///
    /// On success the result becomes the new baseline. On failure the
    /// baseline is left exactly as it was.
    pub fn apply(&mut self, patch: &Patch) -> Result<Arc<Value>, PatchError> {
        let current = self.baseline.as_ref().ok_or(PatchError::NoBaseline)?;
        let next = Arc::new(apply_patch(current, patch)?);
        self.baseline = Some(next.clone());
        Ok(next)
    }

    /// Drop the baseline, e.g. when the stream is torn down.
    pub fn clear(&mut self) {
        self.baseline = None;
    }
}
