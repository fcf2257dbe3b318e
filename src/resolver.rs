//! Canonical metric resolution
//!
//! Vendors spell the same measurement many ways (`Jump Height (Imp-Mom)`,
//! `JumpHeight(Imp-Mom)`, `jumpHeightImpulseMomentum_cm_`) and nest it at
//! different levels. Resolution walks a spec's ordered candidate keys and,
//! for each, its ordered extraction locations, returning the first value
//! that passes the spec's validity predicate.
//!
//! `None` means the metric is truly absent from the record. It is never
//! conflated with zero: a measured zero is valid data for some metrics,
//! while the positive-number predicate rejects zero as a sensor fault.

use crate::catalog::{Location, MetricSpec, Validity, IGNORE_KEYS};
use crate::types::RawRecord;
use serde_json::Value;
use std::collections::BTreeMap;

/// Stateless resolver over raw payloads
pub struct KeyResolver;

impl KeyResolver {
    /// Resolve one canonical metric from a record.
    ///
    /// Pure and deterministic: first match by candidate order, then by
    /// location order. Duplicate keys at multiple nesting levels resolve to
    /// the declared order, not the most-nested occurrence.
    pub fn resolve(record: &RawRecord, spec: &MetricSpec) -> Option<f64> {
        for candidate in &spec.candidates {
            for location in &spec.locations {
                if let Some(value) = lookup(&record.metrics, location, candidate) {
                    if let Some(n) = accept(value, spec.validity) {
                        return Some(n);
                    }
                }
            }
        }
        None
    }

    /// Collect every numeric field of a record across the standard
    /// locations, later locations overriding earlier ones for duplicate
    /// keys. Bookkeeping keys (ids, dates, weights) are filtered out.
    ///
    /// Used by the sweep to aggregate vendor fields that no catalog spec
    /// claims, so unmapped measurements still show up in audits.
    pub fn collect_numeric(record: &RawRecord) -> BTreeMap<String, f64> {
        let mut fields = BTreeMap::new();

        let scopes = [
            record.metrics.as_object(),
            record.metrics.get("results").and_then(Value::as_object),
            record.metrics.get("resultFields").and_then(Value::as_object),
        ];

        for scope in scopes.into_iter().flatten() {
            for (key, value) in scope {
                if is_ignored_key(key) {
                    continue;
                }
                if let Some(n) = value.as_f64() {
                    if n.is_finite() {
                        fields.insert(key.clone(), n);
                    }
                }
            }
        }

        fields
    }
}

fn lookup<'a>(metrics: &'a Value, location: &Location, key: &str) -> Option<&'a Value> {
    let scope = match location {
        Location::Root => metrics,
        Location::Nested(name) => metrics.get(name)?,
    };
    scope.get(key)
}

fn accept(value: &Value, validity: Validity) -> Option<f64> {
    let n = value.as_f64()?;
    if !n.is_finite() {
        return None;
    }
    match validity {
        Validity::Numeric => Some(n),
        Validity::PositiveNumber => (n > 0.0).then_some(n),
    }
}

/// True when a key is bookkeeping rather than a measurement
pub fn is_ignored_key(key: &str) -> bool {
    let lower = key.to_lowercase();
    IGNORE_KEYS.iter().any(|ig| lower.contains(ig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::MetricCatalog;
    use crate::types::Device;
    use chrono::Utc;
    use serde_json::json;

    fn record(metrics: Value) -> RawRecord {
        RawRecord::new(Device::ForceDecks, Utc::now(), metrics)
    }

    #[test]
    fn test_resolves_later_candidate_when_first_absent() {
        let spec = MetricSpec::new(
            "CMJ Height (cm)",
            &["JumpHeight(Imp-Mom)", "Jump Height (Imp-Mom)"],
        );
        let rec = record(json!({ "Jump Height (Imp-Mom)": 45.2 }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(45.2));
    }

    #[test]
    fn test_first_declared_candidate_wins() {
        let spec = MetricSpec::new("CMJ Height (cm)", &["Jump Height", "jumpHeight"]);
        let rec = record(json!({ "jumpHeight": 38.0, "Jump Height": 41.5 }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(41.5));
    }

    #[test]
    fn test_declared_order_beats_nesting_depth() {
        // Same key present at root and nested with different values: the
        // candidate order decides, probing root before sub-objects.
        let spec = MetricSpec::new("Peak Power (W)", &["Peak Power"]);
        let rec = record(json!({
            "Peak Power": 4100.0,
            "results": { "Peak Power": 3900.0 }
        }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(4100.0));
    }

    #[test]
    fn test_resolves_from_nested_location() {
        let spec = MetricSpec::new("Peak Power (W)", &["Peak Power"]);
        let rec = record(json!({ "results": { "Peak Power": 3900.0 } }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(3900.0));

        let rec = record(json!({ "resultFields": { "Peak Power": 3750.0 } }));
        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(3750.0));
    }

    #[test]
    fn test_absent_is_not_zero() {
        let spec = MetricSpec::new("CMJ Height (cm)", &["Jump Height"]);

        // Missing key
        let rec = record(json!({ "other": 12.0 }));
        assert_eq!(KeyResolver::resolve(&rec, &spec), None);

        // Present but zero: rejected by the positive predicate (sensor fault)
        let rec = record(json!({ "Jump Height": 0.0 }));
        assert_eq!(KeyResolver::resolve(&rec, &spec), None);

        // Present but wrong type
        let rec = record(json!({ "Jump Height": "45.2" }));
        assert_eq!(KeyResolver::resolve(&rec, &spec), None);
    }

    #[test]
    fn test_numeric_validity_accepts_non_positive() {
        let spec = MetricSpec::new("Countermovement Depth (cm)", &["CountermovementDepth"])
            .with_validity(Validity::Numeric);
        let rec = record(json!({ "CountermovementDepth": -31.4 }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(-31.4));
    }

    #[test]
    fn test_invalid_candidate_falls_through() {
        // First candidate present but invalid; the second one should win.
        let spec = MetricSpec::new("CMJ Height (cm)", &["Jump Height", "jumpHeight"]);
        let rec = record(json!({ "Jump Height": null, "jumpHeight": 36.8 }));

        assert_eq!(KeyResolver::resolve(&rec, &spec), Some(36.8));
    }

    #[test]
    fn test_single_match_position_independent() {
        // A record with exactly one matching candidate resolves to it no
        // matter where that candidate sits in the list.
        let candidates = ["a", "b", "Jump Height (Imp-Mom)", "c"];
        for rotation in 0..candidates.len() {
            let mut rotated = candidates.to_vec();
            rotated.rotate_left(rotation);
            let spec = MetricSpec::new("CMJ Height (cm)", &rotated);
            let rec = record(json!({ "Jump Height (Imp-Mom)": 45.2 }));
            assert_eq!(KeyResolver::resolve(&rec, &spec), Some(45.2));
        }
    }

    #[test]
    fn test_collect_numeric_filters_bookkeeping() {
        let rec = record(json!({
            "Jump Height (Imp-Mom)": 45.2,
            "athleteId": 9931,
            "bodyWeight": 78.2,
            "results": { "Peak Power": 4012.5 }
        }));

        let fields = KeyResolver::collect_numeric(&rec);
        assert_eq!(fields.get("Jump Height (Imp-Mom)"), Some(&45.2));
        assert_eq!(fields.get("Peak Power"), Some(&4012.5));
        // "athleteId" contains "id", "bodyWeight" contains "weight"
        assert!(!fields.contains_key("athleteId"));
        assert!(!fields.contains_key("bodyWeight"));
    }

    #[test]
    fn test_collect_numeric_nested_overrides_root() {
        let rec = record(json!({
            "Peak Power": 4100.0,
            "results": { "Peak Power": 3900.0 }
        }));

        let fields = KeyResolver::collect_numeric(&rec);
        assert_eq!(fields.get("Peak Power"), Some(&3900.0));
    }

    #[test]
    fn test_built_in_catalog_resolution() {
        let catalog = MetricCatalog::built_in();
        let rec = record(json!({
            "testTypeName": "CMJ",
            "jumpHeightImpulseMomentum_cm_": 41.7
        }));

        let spec = catalog.get("CMJ Height (cm)").unwrap();
        assert_eq!(KeyResolver::resolve(&rec, spec), Some(41.7));
    }
}
