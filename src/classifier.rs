//! Sub-protocol classification
//!
//! A device family covers several sub-tests (a force plate runs squat jumps,
//! countermovement jumps, drop jumps). The record itself only carries
//! free-text hints, so classification builds a lowercase haystack from the
//! device label and every hint field present and checks rule needles
//! against it, first rule wins.

use crate::catalog::{default_rules, ProtocolRule};
use crate::types::RawRecord;
use serde_json::Value;

/// Label used when no rule matches. Unclassified records stay countable for
/// data-quality auditing; they are never dropped.
pub const UNCLASSIFIED: &str = "Unclassified";

/// Free-text fields that may describe the sub-test performed
const HINT_KEYS: &[&str] = &[
    "testTypeName",
    "testName",
    "test_name",
    "testType",
    "testPositionName",
    "categoryName",
];

/// Classifies records into canonical sub-protocols from free-text hints
#[derive(Debug, Clone)]
pub struct ProtocolClassifier {
    rules: Vec<ProtocolRule>,
}

impl Default for ProtocolClassifier {
    fn default() -> Self {
        Self::new(default_rules())
    }
}

impl ProtocolClassifier {
    /// Build a classifier from a rule list. Declaration order is priority
    /// order.
    pub fn new(rules: Vec<ProtocolRule>) -> Self {
        Self { rules }
    }

    /// Classify a record, returning the first matching rule's label or
    /// [`UNCLASSIFIED`] when nothing matches.
    pub fn classify(&self, record: &RawRecord) -> &str {
        let haystack = self.haystack(record);

        for rule in &self.rules {
            if rule.needles.iter().any(|n| haystack.contains(n.as_str())) {
                return &rule.label;
            }
        }
        UNCLASSIFIED
    }

    /// The grouping key used for statistics: `{device}_{protocol}` when a
    /// sub-protocol is known, the bare device label otherwise.
    pub fn protocol_group(&self, record: &RawRecord) -> String {
        let device = record.device.as_str();
        match self.classify(record) {
            UNCLASSIFIED => device.to_string(),
            label => format!("{}_{}", device, label),
        }
    }

    /// Lowercase concatenation of the device label and all hint fields
    /// present on the record. Absent fields contribute nothing.
    fn haystack(&self, record: &RawRecord) -> String {
        let mut haystack = record.device.as_str().to_lowercase();

        let scopes = [Some(&record.metrics), record.metrics.get("results")];
        for scope in scopes.into_iter().flatten() {
            for key in HINT_KEYS {
                if let Some(Value::String(hint)) = scope.get(key) {
                    haystack.push(' ');
                    haystack.push_str(&hint.to_lowercase());
                }
            }
        }

        haystack
    }
}
