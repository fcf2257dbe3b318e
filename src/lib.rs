//! Fieldpulse - Telemetry reconciliation engine for athletic performance data
//!
//! Fieldpulse reconciles performance-testing records from independent device
//! vendors (force plates, sprint timing gates, isometric and hamstring rigs)
//! whose payloads spell and nest the same measurements differently:
//! candidate-key resolution → sub-protocol classification → cohort
//! statistics, plus fuzzy identity resolution of vendor-local athlete names
//! against canonical profiles.
//!
//! ## Modules
//!
//! - **resolver / catalog**: Canonical metric values out of vendor key variants
//! - **classifier**: Sub-protocol labels from free-text hints
//! - **stats**: Per-cohort descriptive statistics with an `ALL` sentinel
//! - **identity**: Name-similarity matching and link proposals
//! - **pipeline**: Paged sweeps over the record store and the public API

pub mod catalog;
pub mod classifier;
pub mod error;
pub mod identity;
pub mod indices;
pub mod pipeline;
pub mod resolver;
pub mod stats;
pub mod store;
pub mod types;

pub use catalog::{MetricCatalog, MetricSpec, ProtocolRule};
pub use classifier::{ProtocolClassifier, UNCLASSIFIED};
pub use error::ReconcileError;
pub use pipeline::{ReconcileProcessor, SweepOptions, SweepSummary};
pub use resolver::KeyResolver;
pub use stats::{Aggregator, ALL_COHORT};
pub use types::{
    AggregateStat, CanonicalProfile, Device, IdentityCandidate, MatchProposal, RawRecord,
};

/// Fieldpulse version embedded in CLI output
pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Producer name for provenance
pub const PRODUCER_NAME: &str = "fieldpulse";
