//! Metric and protocol configuration
//!
//! Everything here is data, not code: candidate key spellings, extraction
//! locations, validity predicates, and protocol substring rules. New vendor
//! key spellings and new protocols are additive configuration changes.

use serde::{Deserialize, Serialize};

/// Where to look for a candidate key inside a raw payload.
///
/// Vendors sometimes emit metrics at the top level and sometimes nested under
/// a `results`/`resultFields` sub-object. Extraction probes a small ordered
/// list of locations rather than deep-searching, so resolution stays bounded
/// and deterministic.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Location {
    /// The payload root
    Root,
    /// A named sub-object of the root
    Nested(String),
}

/// Default probe order: root first, then the known vendor sub-objects
pub fn default_locations() -> Vec<Location> {
    vec![
        Location::Root,
        Location::Nested("results".to_string()),
        Location::Nested("resultFields".to_string()),
    ]
}

/// Validity predicate applied to a candidate value before it is accepted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Validity {
    /// Any finite number
    Numeric,
    /// Finite and strictly positive. Used for magnitude metrics (jump
    /// height, force) where upstream vendors emit zero on sensor fault.
    PositiveNumber,
}

/// One canonical metric and the ordered raw spellings that may carry it.
///
/// Resolution tries `candidates` strictly in order and, within each
/// candidate, `locations` in order; the first value passing `validity` wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricSpec {
    /// Canonical, vendor-independent metric name
    pub name: String,
    /// Raw key spellings, highest priority first
    pub candidates: Vec<String>,
    /// Extraction locations, probed in order for each candidate
    pub locations: Vec<Location>,
    pub validity: Validity,
    /// True for metrics where a lower value is better (sprint and contact
    /// times); consumers use this for ranking direction
    #[serde(default)]
    pub lower_is_better: bool,
}

impl MetricSpec {
    /// Create a spec with the default locations and the positive-number
    /// predicate (the common case for magnitude metrics)
    pub fn new(name: &str, candidates: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            candidates: candidates.iter().map(|c| c.to_string()).collect(),
            locations: default_locations(),
            validity: Validity::PositiveNumber,
            lower_is_better: false,
        }
    }

    pub fn with_validity(mut self, validity: Validity) -> Self {
        self.validity = validity;
        self
    }

    pub fn with_locations(mut self, locations: Vec<Location>) -> Self {
        self.locations = locations;
        self
    }

    pub fn with_lower_is_better(mut self) -> Self {
        self.lower_is_better = true;
        self
    }
}

/// The set of canonical metrics known to the engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricCatalog {
    specs: Vec<MetricSpec>,
}

impl Default for MetricCatalog {
    fn default() -> Self {
        Self::built_in()
    }
}

impl MetricCatalog {
    pub fn empty() -> Self {
        Self { specs: Vec::new() }
    }

    /// The built-in candidate table covering the supported device families
    pub fn built_in() -> Self {
        let specs = vec![
            // ForceDecks - jump tests
            MetricSpec::new(
                "CMJ Height (cm)",
                &[
                    "Jump Height (Imp-Mom)",
                    "Jump Height (Imp-Mom) [cm]",
                    "JumpHeight(Imp-Mom)",
                    "jumpHeightImpulseMomentum_cm_",
                    "Jump Height",
                    "jumpHeight",
                ],
            ),
            MetricSpec::new("Peak Power (W)", &["Peak Power", "PeakPower", "concentricPeakPower"]),
            MetricSpec::new("Rel. Peak Power (W/kg)", &["Peak Power / BM", "PeakPower/BM"]),
            MetricSpec::new("RSI-modified", &["RSI-modified", "RSI-modified(Imp-Mom)"]),
            MetricSpec::new("RSI", &["RSI"]),
            MetricSpec::new("Flight Time (s)", &["Flight Time", "FlightTime"]),
            MetricSpec::new("Contact Time (s)", &["Contact Time", "ContactTime"]).with_lower_is_better(),
            MetricSpec::new("Contraction Time (s)", &["Contraction Time", "ContractionTime"])
                .with_lower_is_better(),
            MetricSpec::new("Ecc. Duration (s)", &["Eccentric Duration", "EccentricDuration"])
                .with_lower_is_better(),
            MetricSpec::new(
                "Conc. Peak Force (N)",
                &["Concentric Peak Force", "ConcentricPeakForce"],
            ),
            MetricSpec::new(
                "Ecc. Peak Force (N)",
                &["Eccentric Peak Force", "EccentricPeakForce"],
            ),
            MetricSpec::new("Conc. Impulse (Ns)", &["Concentric Impulse", "ConcentricImpulse"]),
            // Depth is signed (downward displacement); zero is not a fault
            MetricSpec::new(
                "Countermovement Depth (cm)",
                &["Countermovement Depth", "CountermovementDepth"],
            )
            .with_validity(Validity::Numeric),
            MetricSpec::new(
                "Leg Stiffness (N/m)",
                &["Lower-Limb Stiffness", "Lower-LimbStiffness"],
            ),
            // NordBord - hamstring strength
            MetricSpec::new(
                "Left Max Force (N)",
                &["leftMaxForce", "maxForceLeft", "maxForceL_N_", "Left Max Force (N)"],
            ),
            MetricSpec::new(
                "Right Max Force (N)",
                &["rightMaxForce", "maxForceRight", "maxForceR_N_", "Right Max Force (N)"],
            ),
            MetricSpec::new("Left Torque (Nm)", &["leftTorque"]),
            MetricSpec::new("Right Torque (Nm)", &["rightTorque"]),
            MetricSpec::new("Left Avg Force (N)", &["leftAvgForce"]),
            MetricSpec::new("Right Avg Force (N)", &["rightAvgForce"]),
            // ForceFrame - hip strength
            MetricSpec::new(
                "Add Left Max (N)",
                &[
                    "Inner Left Max Force (N)",
                    "Inner Left Max Force",
                    "innerLeftMaxForce",
                ],
            ),
            MetricSpec::new(
                "Add Right Max (N)",
                &[
                    "Inner Right Max Force (N)",
                    "Inner Right Max Force",
                    "innerRightMaxForce",
                ],
            ),
            MetricSpec::new(
                "Abd Left Max (N)",
                &[
                    "Outer Left Max Force (N)",
                    "Outer Left Max Force",
                    "outerLeftMaxForce",
                    "Abduction Left Max Force (N)",
                    "abdLeftMaxForce",
                ],
            ),
            MetricSpec::new(
                "Abd Right Max (N)",
                &[
                    "Outer Right Max Force (N)",
                    "Outer Right Max Force",
                    "outerRightMaxForce",
                    "Abduction Right Max Force (N)",
                    "abdRightMaxForce",
                ],
            ),
            MetricSpec::new("Add Left Impulse (Ns)", &["innerLeftImpulse"]),
            MetricSpec::new("Add Right Impulse (Ns)", &["innerRightImpulse"]),
            // SmartSpeed - sprint timing
            MetricSpec::new(
                "Sprint Time (s)",
                &["runningSummaryFields_totalTimeSeconds", "time", "time_s_"],
            )
            .with_lower_is_better(),
            MetricSpec::new(
                "Peak Velocity (m/s)",
                &["runningSummaryFields_velocityFields_peakVelocityMetersPerSecond"],
            ),
            MetricSpec::new(
                "Mean Velocity (m/s)",
                &["runningSummaryFields_velocityFields_meanVelocityMetersPerSecond"],
            ),
            MetricSpec::new(
                "Split 10m (s)",
                &["runningSummaryFields_gateSummaryFields_cumulativeOne"],
            )
            .with_lower_is_better(),
            MetricSpec::new(
                "Split 20m (s)",
                &["runningSummaryFields_gateSummaryFields_cumulativeTwo"],
            )
            .with_lower_is_better(),
            MetricSpec::new(
                "Split 30m (s)",
                &["runningSummaryFields_gateSummaryFields_cumulativeThree"],
            )
            .with_lower_is_better(),
            MetricSpec::new(
                "Split 40m (s)",
                &["runningSummaryFields_gateSummaryFields_cumulativeFour"],
            )
            .with_lower_is_better(),
            // DynaMo - isometric strength
            MetricSpec::new("Peak Force (N)", &["peakForce", "maximumForce", "maxForce_N_"]),
            MetricSpec::new("Avg Force (N)", &["averageForce"]),
        ];

        Self { specs }
    }

    /// Look up a spec by canonical name
    pub fn get(&self, name: &str) -> Option<&MetricSpec> {
        self.specs.iter().find(|s| s.name == name)
    }

    /// Register an additional spec. A spec with the same canonical name
    /// replaces the existing one.
    pub fn register(&mut self, spec: MetricSpec) {
        if let Some(existing) = self.specs.iter_mut().find(|s| s.name == spec.name) {
            *existing = spec;
        } else {
            self.specs.push(spec);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &MetricSpec> {
        self.specs.iter()
    }

    pub fn len(&self) -> usize {
        self.specs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specs.is_empty()
    }

    /// True if `key` is a candidate spelling of any catalog metric
    pub fn is_candidate_key(&self, key: &str) -> bool {
        self.specs.iter().any(|s| s.candidates.iter().any(|c| c == key))
    }
}

/// Substrings that mark a numeric field as bookkeeping rather than a
/// measurement (ids, dates, weights, recording metadata). Matched
/// case-insensitively against the key when sweeping unmapped fields.
pub const IGNORE_KEYS: &[&str] = &[
    "id",
    "test",
    "date",
    "profile",
    "valid",
    "notes",
    "device",
    "version",
    "pct",
    "count",
    "idx",
    "impulse",
    "repetition",
    "weight",
    "duration",
    "mass",
    "bmi",
    "timestamp",
    "tenant",
    "recording",
    "parameter",
    "attribute",
    "uuid",
];

/// One sub-protocol and the case-insensitive substrings that indicate it.
///
/// Rules are checked in declaration order; the first rule with any needle
/// present in the haystack wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProtocolRule {
    pub label: String,
    pub needles: Vec<String>,
}

impl ProtocolRule {
    pub fn new(label: &str, needles: &[&str]) -> Self {
        Self {
            label: label.to_string(),
            needles: needles.iter().map(|n| n.to_string()).collect(),
        }
    }
}

/// Built-in sub-protocol rules for the supported device families
pub fn default_rules() -> Vec<ProtocolRule> {
    vec![
        ProtocolRule::new("SJ", &["sj", "squat jump"]),
        ProtocolRule::new("CMJ", &["cmj", "countermovement"]),
        ProtocolRule::new("HJ", &["hj", "hop"]),
        ProtocolRule::new("DJ", &["drop", "dj"]),
        ProtocolRule::new("Nordic", &["nordic", "nordbord", "hamstring"]),
        ProtocolRule::new("Adduction", &["adduction", "adductor", "hip ad"]),
        ProtocolRule::new("Abduction", &["abduction", "abductor", "hip ab"]),
        ProtocolRule::new("Sprint", &["sprint", "gate", "running"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_built_in_catalog_lookup() {
        let catalog = MetricCatalog::built_in();
        let spec = catalog.get("CMJ Height (cm)").unwrap();
        assert_eq!(spec.candidates[0], "Jump Height (Imp-Mom)");
        assert_eq!(spec.validity, Validity::PositiveNumber);
        assert!(!spec.lower_is_better);

        let sprint = catalog.get("Sprint Time (s)").unwrap();
        assert!(sprint.lower_is_better);
    }

    #[test]
    fn test_register_replaces_by_name() {
        let mut catalog = MetricCatalog::built_in();
        let before = catalog.len();

        catalog.register(MetricSpec::new("CMJ Height (cm)", &["customJumpKey"]));
        assert_eq!(catalog.len(), before);
        assert_eq!(catalog.get("CMJ Height (cm)").unwrap().candidates, vec!["customJumpKey"]);

        catalog.register(MetricSpec::new("Grip Strength (N)", &["gripForce"]));
        assert_eq!(catalog.len(), before + 1);
    }

    #[test]
    fn test_candidate_key_membership() {
        let catalog = MetricCatalog::built_in();
        assert!(catalog.is_candidate_key("JumpHeight(Imp-Mom)"));
        assert!(catalog.is_candidate_key("leftMaxForce"));
        assert!(!catalog.is_candidate_key("someVendorNoise"));
    }

    #[test]
    fn test_depth_allows_non_positive() {
        let catalog = MetricCatalog::built_in();
        let depth = catalog.get("Countermovement Depth (cm)").unwrap();
        assert_eq!(depth.validity, Validity::Numeric);
    }
}
