//! Reconciliation orchestration
//!
//! This module provides the public API of Fieldpulse. It wires the paged
//! record fetch through classification, metric resolution, and aggregation,
//! and runs the identity resolution pass against the profile store.

use crate::catalog::{MetricCatalog, ProtocolRule};
use crate::classifier::{ProtocolClassifier, UNCLASSIFIED};
use crate::error::ReconcileError;
use crate::identity::{source_identity, IdentityResolver};
use crate::resolver::KeyResolver;
use crate::stats::{Aggregator, StatExport, ALL_COHORT};
use crate::store::{ProfileStore, RecordQuery, RecordStore, DEFAULT_PAGE_SIZE};
use crate::types::{AggregateStat, CanonicalProfile, MatchProposal, RawRecord};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};

/// Cohort label for records whose owning profile has no tier, or whose
/// source identity is not linked to any profile
pub const UNKNOWN_COHORT: &str = "Unknown";

/// Sweep tuning
#[derive(Debug, Clone)]
pub struct SweepOptions {
    /// Also aggregate numeric vendor fields no catalog spec claims, under
    /// their raw key names (bookkeeping keys filtered)
    pub include_unmapped: bool,
}

impl Default for SweepOptions {
    fn default() -> Self {
        Self {
            include_unmapped: true,
        }
    }
}

/// What a sweep saw, for data-quality auditing
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub records: u64,
    /// Records no protocol rule matched. Counted, never dropped.
    pub unclassified: u64,
    pub by_protocol: BTreeMap<String, u64>,
    pub by_device: BTreeMap<String, u64>,
}

/// Stateful reconciliation processor.
///
/// Holds the metric catalog, the protocol rule set, and accumulated
/// statistics across sweeps.
pub struct ReconcileProcessor {
    catalog: MetricCatalog,
    classifier: ProtocolClassifier,
    aggregator: Aggregator,
}

impl Default for ReconcileProcessor {
    fn default() -> Self {
        Self::new()
    }
}

impl ReconcileProcessor {
    /// Create a processor with the built-in catalog and rules
    pub fn new() -> Self {
        Self {
            catalog: MetricCatalog::built_in(),
            classifier: ProtocolClassifier::default(),
            aggregator: Aggregator::new(),
        }
    }

    pub fn with_catalog(mut self, catalog: MetricCatalog) -> Self {
        self.catalog = catalog;
        self
    }

    pub fn with_rules(mut self, rules: Vec<ProtocolRule>) -> Self {
        self.classifier = ProtocolClassifier::new(rules);
        self
    }

    pub fn catalog(&self) -> &MetricCatalog {
        &self.catalog
    }

    /// Resolve one canonical metric from a record.
    ///
    /// `Ok(None)` means the metric is genuinely absent from the record;
    /// an unknown metric name is an error.
    pub fn resolve_metric(
        &self,
        record: &RawRecord,
        metric: &str,
    ) -> Result<Option<f64>, ReconcileError> {
        let spec = self
            .catalog
            .get(metric)
            .ok_or_else(|| ReconcileError::UnknownMetric(metric.to_string()))?;
        Ok(KeyResolver::resolve(record, spec))
    }

    /// Classify a record's sub-protocol
    pub fn classify(&self, record: &RawRecord) -> &str {
        self.classifier.classify(record)
    }

    /// Fetch every matching record page by page, classify and resolve each,
    /// and fold the values into the aggregation state.
    ///
    /// The loop runs until the store reports exhaustion; a fetch error
    /// (including timeout) aborts the whole sweep and leaves previously
    /// accumulated statistics untouched, so partial fetches are never
    /// mistaken for complete ones.
    pub fn sweep(
        &mut self,
        store: &dyn RecordStore,
        query: &RecordQuery,
        profiles: &[CanonicalProfile],
        options: &SweepOptions,
    ) -> Result<SweepSummary, ReconcileError> {
        let tiers: HashMap<&str, &str> = profiles
            .iter()
            .filter_map(|p| {
                let source_id = p.source_id.as_deref()?;
                Some((source_id, p.tier.as_deref().unwrap_or(UNKNOWN_COHORT)))
            })
            .collect();

        let mut aggregator = self.aggregator.clone();
        let mut summary = SweepSummary::default();

        let page_size = if query.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            query.page_size
        };

        let mut page = 0;
        loop {
            let records = store.fetch_page(query, page)?;
            if records.is_empty() {
                break;
            }

            for record in &records {
                self.ingest_record(record, &tiers, options, &mut aggregator, &mut summary);
            }

            if records.len() < page_size {
                break;
            }
            page += 1;
        }

        // All pages fetched; only now does the new state become visible.
        self.aggregator = aggregator;
        Ok(summary)
    }

    fn ingest_record(
        &self,
        record: &RawRecord,
        tiers: &HashMap<&str, &str>,
        options: &SweepOptions,
        aggregator: &mut Aggregator,
        summary: &mut SweepSummary,
    ) {
        let device = record.device.as_str();
        let label = self.classifier.classify(record);
        let group = self.classifier.protocol_group(record);

        summary.records += 1;
        *summary.by_device.entry(device.to_string()).or_default() += 1;
        *summary.by_protocol.entry(label.to_string()).or_default() += 1;
        if label == UNCLASSIFIED {
            summary.unclassified += 1;
        }

        let cohort = source_identity(record)
            .and_then(|(source_id, _)| tiers.get(source_id.as_str()).copied())
            .unwrap_or(UNKNOWN_COHORT);

        let mut ingest = |metric: &str, value: f64| {
            aggregator.ingest(&group, metric, cohort, value);
            // A sub-protocol group also feeds the bare device group so
            // device-wide queries see every value.
            if group != device {
                aggregator.ingest(device, metric, cohort, value);
            }
        };

        for spec in self.catalog.iter() {
            if let Some(value) = KeyResolver::resolve(record, spec) {
                ingest(&spec.name, value);
            }
        }

        if options.include_unmapped {
            for (key, value) in KeyResolver::collect_numeric(record) {
                if !self.catalog.is_candidate_key(&key) {
                    ingest(&key, value);
                }
            }
        }
    }

    /// Statistics for one (protocol-group, metric, cohort) cell.
    /// `None` cohort queries the across-cohorts `ALL` bucket.
    pub fn stats(&self, group: &str, metric: &str, cohort: Option<&str>) -> AggregateStat {
        self.aggregator
            .stats(group, metric, cohort.unwrap_or(ALL_COHORT))
    }

    /// All accumulated statistics, nested group -> metric -> cohort
    pub fn export(&self) -> StatExport {
        self.aggregator.export()
    }

    /// Run an identity resolution pass: harvest unlinked vendor identities
    /// from the matching records and rank match proposals against the
    /// unlinked profiles.
    pub fn propose_links(
        &self,
        store: &dyn RecordStore,
        query: &RecordQuery,
        profiles: &[CanonicalProfile],
    ) -> Result<Vec<MatchProposal>, ReconcileError> {
        let records = fetch_all(store, query)?;

        let linked: HashSet<String> = profiles
            .iter()
            .filter_map(|p| p.source_id.clone())
            .collect();

        let candidates = IdentityResolver::harvest(&records, &linked);
        Ok(IdentityResolver::resolve_all(&candidates, profiles))
    }

    /// Write accepted proposals to the profile store. Safe to retry:
    /// re-applying an already-written link is a no-op.
    ///
    /// Returns the number of links written.
    pub fn apply_links(
        store: &mut dyn ProfileStore,
        proposals: &[MatchProposal],
    ) -> Result<usize, ReconcileError> {
        for proposal in proposals {
            store.link(proposal.profile_id, &proposal.source_id)?;
        }
        Ok(proposals.len())
    }
}

/// Fetch every page of a query until exhaustion
fn fetch_all(store: &dyn RecordStore, query: &RecordQuery) -> Result<Vec<RawRecord>, ReconcileError> {
    let page_size = if query.page_size == 0 {
        DEFAULT_PAGE_SIZE
    } else {
        query.page_size
    };

    let mut records = Vec::new();
    let mut page = 0;
    loop {
        let batch = store.fetch_page(query, page)?;
        let exhausted = batch.len() < page_size;
        records.extend(batch);
        if exhausted {
            break;
        }
        page += 1;
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{MemoryProfileStore, MemoryRecordStore};
    use crate::types::Device;
    use chrono::Utc;
    use serde_json::json;

    fn jump_record(source_id: &str, name: &str, test_name: &str, height: f64) -> RawRecord {
        RawRecord::new(
            Device::ForceDecks,
            Utc::now(),
            json!({
                "profileId": source_id,
                "profileName": name,
                "testTypeName": test_name,
                "Jump Height (Imp-Mom)": height
            }),
        )
    }

    fn fixture_profiles() -> Vec<CanonicalProfile> {
        vec![
            CanonicalProfile::new("Kim Min Jae")
                .with_tier("Pro")
                .with_source_id("ext-1"),
            CanonicalProfile::new("Lee Kang In")
                .with_tier("Amateur")
                .with_source_id("ext-2"),
            CanonicalProfile::new("Cho Gue Sung"),
        ]
    }

    #[test]
    fn test_sweep_aggregates_by_tier_and_all() {
        let store = MemoryRecordStore::new(vec![
            jump_record("ext-1", "Kim Min Jae", "CMJ", 40.0),
            jump_record("ext-1", "Kim Min Jae", "CMJ", 44.0),
            jump_record("ext-2", "Lee Kang In", "CMJ", 30.0),
        ]);

        let mut processor = ReconcileProcessor::new();
        let summary = processor
            .sweep(
                &store,
                &RecordQuery::new(),
                &fixture_profiles(),
                &SweepOptions::default(),
            )
            .unwrap();

        assert_eq!(summary.records, 3);
        assert_eq!(summary.by_protocol["CMJ"], 3);

        let pro = processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", Some("Pro"));
        assert_eq!(pro.count, 2);
        assert_eq!(pro.mean, 42.0);

        let all = processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", None);
        assert_eq!(all.count, 3);
        assert_eq!(all.mean, 38.0);

        // Sub-protocol values also feed the bare device group
        let device_wide = processor.stats("ForceDecks", "CMJ Height (cm)", None);
        assert_eq!(device_wide.count, 3);
    }

    #[test]
    fn test_sweep_counts_unclassified() {
        let store = MemoryRecordStore::new(vec![RawRecord::new(
            Device::Other("Keiser".to_string()),
            Utc::now(),
            json!({ "testTypeName": "Leg Press", "powerOutput": 512.0 }),
        )]);

        let mut processor = ReconcileProcessor::new();
        let summary = processor
            .sweep(&store, &RecordQuery::new(), &[], &SweepOptions::default())
            .unwrap();

        assert_eq!(summary.unclassified, 1);
        assert_eq!(summary.by_protocol[UNCLASSIFIED], 1);
        // Unmapped numeric field lands under the bare device group
        assert_eq!(processor.stats("Keiser", "powerOutput", None).count, 1);
    }

    #[test]
    fn test_sweep_unlinked_record_goes_to_unknown_cohort() {
        let store = MemoryRecordStore::new(vec![jump_record("ext-9", "Nobody Linked", "CMJ", 35.0)]);

        let mut processor = ReconcileProcessor::new();
        processor
            .sweep(
                &store,
                &RecordQuery::new(),
                &fixture_profiles(),
                &SweepOptions::default(),
            )
            .unwrap();

        let unknown = processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", Some(UNKNOWN_COHORT));
        assert_eq!(unknown.count, 1);
        assert_eq!(processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", None).count, 1);
    }

    #[test]
    fn test_sweep_without_unmapped_fields() {
        let store = MemoryRecordStore::new(vec![RawRecord::new(
            Device::ForceDecks,
            Utc::now(),
            json!({ "testTypeName": "CMJ", "Jump Height (Imp-Mom)": 40.0, "vendorNoise": 7.7 }),
        )]);

        let mut processor = ReconcileProcessor::new();
        processor
            .sweep(
                &store,
                &RecordQuery::new(),
                &[],
                &SweepOptions {
                    include_unmapped: false,
                },
            )
            .unwrap();

        assert_eq!(processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", None).count, 1);
        assert_eq!(processor.stats("ForceDecks_CMJ", "vendorNoise", None).count, 0);
    }

    #[test]
    fn test_sweep_pages_until_exhaustion() {
        let records: Vec<RawRecord> = (0..25)
            .map(|i| jump_record("ext-1", "Kim Min Jae", "CMJ", 30.0 + i as f64))
            .collect();
        let store = MemoryRecordStore::new(records);

        let mut processor = ReconcileProcessor::new();
        let summary = processor
            .sweep(
                &store,
                &RecordQuery::new().with_page_size(10),
                &fixture_profiles(),
                &SweepOptions::default(),
            )
            .unwrap();

        assert_eq!(summary.records, 25);
        assert_eq!(processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", None).count, 25);
    }

    /// Store that times out after serving its first page
    struct FlakyStore {
        first_page: Vec<RawRecord>,
    }

    impl RecordStore for FlakyStore {
        fn count(&self, _query: &RecordQuery) -> Result<u64, ReconcileError> {
            Err(ReconcileError::StoreTimeout("count".to_string()))
        }

        fn fetch_page(
            &self,
            _query: &RecordQuery,
            page: usize,
        ) -> Result<Vec<RawRecord>, ReconcileError> {
            if page == 0 {
                Ok(self.first_page.clone())
            } else {
                Err(ReconcileError::StoreTimeout("page fetch".to_string()))
            }
        }
    }

    #[test]
    fn test_sweep_timeout_discards_partial_state() {
        let first_page: Vec<RawRecord> = (0..10)
            .map(|_| jump_record("ext-1", "Kim Min Jae", "CMJ", 40.0))
            .collect();
        let store = FlakyStore { first_page };

        let mut processor = ReconcileProcessor::new();
        let err = processor
            .sweep(
                &store,
                &RecordQuery::new().with_page_size(10),
                &fixture_profiles(),
                &SweepOptions::default(),
            )
            .unwrap_err();

        assert!(matches!(err, ReconcileError::StoreTimeout(_)));
        // Nothing from the truncated fetch leaked into visible statistics
        assert_eq!(processor.stats("ForceDecks_CMJ", "CMJ Height (cm)", None).count, 0);
    }

    #[test]
    fn test_resolve_metric_unknown_name() {
        let processor = ReconcileProcessor::new();
        let record = jump_record("ext-1", "Kim Min Jae", "CMJ", 40.0);

        let err = processor.resolve_metric(&record, "Nonexistent Metric").unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownMetric(_)));

        // Known metric, absent from the record: Ok(None), not an error
        let value = processor.resolve_metric(&record, "Peak Power (W)").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn test_propose_and_apply_links() {
        let store = MemoryRecordStore::new(vec![
            jump_record("ext-7", "cho gue sung", "CMJ", 38.0),
            jump_record("ext-1", "Kim Min Jae", "CMJ", 40.0), // already linked
        ]);
        let profiles = fixture_profiles();
        let processor = ReconcileProcessor::new();

        let proposals = processor
            .propose_links(&store, &RecordQuery::new(), &profiles)
            .unwrap();

        // ext-1 is linked already; only ext-7 produces a proposal
        assert_eq!(proposals.len(), 1);
        assert_eq!(proposals[0].source_id, "ext-7");
        assert_eq!(proposals[0].profile_name, "Cho Gue Sung");
        assert_eq!(proposals[0].similarity, 100);
        assert!(proposals[0].auto_accept);

        let mut profile_store = MemoryProfileStore::new(profiles);
        let applied = ReconcileProcessor::apply_links(&mut profile_store, &proposals).unwrap();
        assert_eq!(applied, 1);

        // Retrying is a no-op, and the linked identity no longer surfaces
        // as a candidate on the next pass.
        ReconcileProcessor::apply_links(&mut profile_store, &proposals).unwrap();
        let updated = profile_store.profiles().unwrap();
        let again = processor
            .propose_links(&store, &RecordQuery::new(), &updated)
            .unwrap();
        assert!(again.is_empty());
    }
}
