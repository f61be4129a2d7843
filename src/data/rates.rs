//! Per-connection traffic rates.
//!
//! The server reports cumulative byte counters. A rate here is the counter's
//! increase since the previous update of the same stream, so the unit is
//! "bytes per update" (the server ticks once per second).

use std::collections::{BTreeMap, HashMap};

use rdwatch_types::TrafficSample;
use serde_json::Value;

/// Key under which the document-level totals are sampled.
const TOTALS_KEY: &str = "";

/// Last sample per entity key.
pub type SampleTable = HashMap<String, TrafficSample>;

/// Increase of both counters since the previous update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rate {
    pub upload: u64,
    pub download: u64,
}

impl Rate {
    /// Rate between two samples of the same entity.
    ///
    /// Counters are monotonic; a decrease (counter reset on the server) reads
    /// as 0 rather than a negative rate.
    pub fn between(previous: &TrafficSample, current: &TrafficSample) -> Self {
        Self {
            upload: current.upload.saturating_sub(previous.upload),
            download: current.download.saturating_sub(previous.download),
        }
    }
}

/// Rates derived from one update.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RateSheet {
    /// Rate per connection id, for every connection in the document.
    pub connections: BTreeMap<String, Rate>,
    /// Rate of the document's `total_upload` / `total_download`, if present.
    pub total: Option<Rate>,
}

impl RateSheet {
    /// Rate of one connection.
    pub fn get(&self, id: &str) -> Option<&Rate> {
        self.connections.get(id)
    }

    /// Sum of all connection rates.
    pub fn sum(&self) -> Rate {
        self.connections.values().fold(Rate::default(), |acc, r| Rate {
            upload: acc.upload.saturating_add(r.upload),
            download: acc.download.saturating_add(r.download),
        })
    }
}

/// Compute rates for `document` against the previous samples.
///
/// Every connection under `document.connections` gets a rate; connections
/// with no previous sample get 0. The returned table holds exactly the
/// entities of `document`, so the next update diffs against this one and
/// closed connections are forgotten.
pub fn compute_rates(previous: &SampleTable, document: &Value) -> (RateSheet, SampleTable) {
    let mut sheet = RateSheet::default();
    let mut samples = SampleTable::new();

    if let Some(connections) = document.get("connections").and_then(Value::as_object) {
        for (id, record) in connections {
            let current = TrafficSample::from_record(record);
            let rate = previous
                .get(id)
                .map(|prev| Rate::between(prev, &current))
                .unwrap_or_default();
            sheet.connections.insert(id.clone(), rate);
            samples.insert(id.clone(), current);
        }
    }

    if let Some(current) = TrafficSample::totals(document) {
        let rate = previous
            .get(TOTALS_KEY)
            .map(|prev| Rate::between(prev, &current))
            .unwrap_or_default();
        sheet.total = Some(rate);
        samples.insert(TOTALS_KEY.to_string(), current);
    }

    (sheet, samples)
}

/// Owns the sample table of one connection stream.
#[derive(Debug, Default)]
pub struct RateTracker {
    samples: SampleTable,
}

impl RateTracker {
    /// Create a tracker with no history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Compute rates for a new document and remember its counters.
    pub fn update(&mut self, document: &Value) -> RateSheet {
        let (sheet, samples) = compute_rates(&self.samples, document);
        self.samples = samples;
        sheet
    }

    /// Last sample recorded for a connection.
    pub fn sample(&self, id: &str) -> Option<&TrafficSample> {
        self.samples.get(id)
    }

    /// Forget all samples.
    pub fn reset(&mut self) {
        self.samples.clear();
    }
}
