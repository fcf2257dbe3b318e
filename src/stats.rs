//! Cohort statistics
//!
//! The aggregation engine consumes (group, metric, cohort, value) tuples and
//! serves descriptive statistics on demand. Accumulation is Welford's online
//! algorithm: single pass, O(1) memory per cohort cell, no retained value
//! vectors.
//!
//! Two conventions are load-bearing for consumers and must not drift:
//! - every value written to a named cohort is also written to the sentinel
//!   `ALL` cohort for the same (group, metric);
//! - standard deviation is the population form (divide by N, not N-1), which
//!   feeds displayed "normal ranges".

use crate::types::AggregateStat;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Sentinel cohort receiving every ingested value
pub const ALL_COHORT: &str = "ALL";

/// Grouping key for one statistics cell
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct CohortKey {
    /// Protocol group, e.g. `ForceDecks_CMJ`
    pub group: String,
    /// Canonical metric name
    pub metric: String,
    /// Cohort label (tier) or [`ALL_COHORT`]
    pub cohort: String,
}

impl CohortKey {
    pub fn new(group: &str, metric: &str, cohort: &str) -> Self {
        Self {
            group: group.to_string(),
            metric: metric.to_string(),
            cohort: cohort.to_string(),
        }
    }
}

/// Welford online accumulator for one cell
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct Accumulator {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl Accumulator {
    fn push(&mut self, value: f64) {
        if self.count == 0 {
            self.min = value;
            self.max = value;
        } else {
            if value < self.min {
                self.min = value;
            }
            if value > self.max {
                self.max = value;
            }
        }

        self.count += 1;
        let delta = value - self.mean;
        self.mean += delta / self.count as f64;
        let delta2 = value - self.mean;
        self.m2 += delta * delta2;
    }

    fn stat(&self) -> AggregateStat {
        if self.count == 0 {
            return AggregateStat::zeroed();
        }
        AggregateStat {
            count: self.count,
            mean: self.mean,
            std: (self.m2 / self.count as f64).sqrt(),
            min: self.min,
            max: self.max,
        }
    }
}

/// Nested export shape: group -> metric -> cohort -> stat
pub type StatExport = BTreeMap<String, BTreeMap<String, BTreeMap<String, AggregateStat>>>;

/// Accumulates values per cohort cell and serves stats on demand
#[derive(Debug, Clone, Default)]
pub struct Aggregator {
    cells: BTreeMap<CohortKey, Accumulator>,
}

/// JSON-friendly snapshot of accumulated state. Cells are a sequence
/// because JSON map keys must be strings.
#[derive(Serialize, Deserialize)]
struct AggregatorState {
    cells: Vec<(CohortKey, Accumulator)>,
}

impl Aggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ingest one value.
    ///
    /// Always also ingests into the `ALL` cohort for the same (group,
    /// metric) pair. This dual-write is a hard invariant: consumers of the
    /// aggregate-across-cohorts view depend on it.
    pub fn ingest(&mut self, group: &str, metric: &str, cohort: &str, value: f64) {
        self.cell(group, metric, cohort).push(value);
        if cohort != ALL_COHORT {
            self.cell(group, metric, ALL_COHORT).push(value);
        }
    }

    /// Statistics for one cell. An unknown or empty cell yields the
    /// all-zero stat, never NaN or infinity.
    pub fn stats(&self, group: &str, metric: &str, cohort: &str) -> AggregateStat {
        self.cells
            .get(&CohortKey::new(group, metric, cohort))
            .map(Accumulator::stat)
            .unwrap_or_else(AggregateStat::zeroed)
    }

    /// All cells as a nested group -> metric -> cohort map
    pub fn export(&self) -> StatExport {
        let mut out: StatExport = BTreeMap::new();
        for (key, acc) in &self.cells {
            out.entry(key.group.clone())
                .or_default()
                .entry(key.metric.clone())
                .or_default()
                .insert(key.cohort.clone(), acc.stat());
        }
        out
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Load accumulated state from JSON
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let state: AggregatorState = serde_json::from_str(json)?;
        Ok(Self {
            cells: state.cells.into_iter().collect(),
        })
    }

    /// Serialize accumulated state to JSON
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        let state = AggregatorState {
            cells: self.cells.iter().map(|(k, a)| (k.clone(), a.clone())).collect(),
        };
        serde_json::to_string(&state)
    }

    fn cell(&mut self, group: &str, metric: &str, cohort: &str) -> &mut Accumulator {
        self.cells
            .entry(CohortKey::new(group, metric, cohort))
            .or_default()
    }
}
