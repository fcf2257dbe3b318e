//! Core types for the Fieldpulse reconciliation engine
//!
//! This module defines the data structures that flow through reconciliation:
//! raw vendor records, canonical athlete profiles, identity match proposals,
//! and derived aggregate statistics.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Coarse vendor/device family a record came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Device {
    ForceDecks,
    SmartSpeed,
    NordBord,
    ForceFrame,
    DynaMo,
    Manual,
    /// For custom/unknown device families, use Other with a name
    #[serde(untagged)]
    Other(String),
}

impl Device {
    pub fn as_str(&self) -> &str {
        match self {
            Device::ForceDecks => "ForceDecks",
            Device::SmartSpeed => "SmartSpeed",
            Device::NordBord => "NordBord",
            Device::ForceFrame => "ForceFrame",
            Device::DynaMo => "DynaMo",
            Device::Manual => "Manual",
            Device::Other(name) => name.as_str(),
        }
    }
}

/// One vendor payload as stored: an opaque, arbitrarily-nested JSON object
/// tagged with its device family and recording time.
///
/// Records are immutable once stored; the record store owns them. Field names
/// and nesting inside `metrics` are vendor-specific and inconsistent, which
/// is exactly what the key resolver exists to untangle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawRecord {
    /// Device family that produced this record
    pub device: Device,
    /// When the measurement was recorded
    pub recorded_at: DateTime<Utc>,
    /// Raw vendor payload (object with string keys)
    pub metrics: serde_json::Value,
}

impl RawRecord {
    pub fn new(device: Device, recorded_at: DateTime<Utc>, metrics: serde_json::Value) -> Self {
        Self {
            device,
            recorded_at,
            metrics,
        }
    }
}

/// Canonical athlete profile, owned by the external profile store.
///
/// `source_id` is the vendor-local identity link; it is the only field this
/// subsystem ever writes back.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CanonicalProfile {
    pub id: Uuid,
    pub name: String,
    /// Application-defined cohort tier (e.g. experience level)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tier: Option<String>,
    /// Vendor-local identity this profile is linked to, if any
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_id: Option<String>,
}

impl CanonicalProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            tier: None,
            source_id: None,
        }
    }

    pub fn with_tier(mut self, tier: impl Into<String>) -> Self {
        self.tier = Some(tier.into());
        self
    }

    pub fn with_source_id(mut self, source_id: impl Into<String>) -> Self {
        self.source_id = Some(source_id.into());
        self
    }
}

/// A vendor-local athlete identity observed in raw records that has not yet
/// been linked to a canonical profile
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityCandidate {
    pub source_id: String,
    pub source_name: String,
}

/// A proposed link between a vendor-local identity and a canonical profile.
///
/// Ephemeral: computed fresh on each resolution pass and never persisted
/// until confirmed, at which point the link is written to the profile store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MatchProposal {
    pub source_id: String,
    pub source_name: String,
    pub profile_id: Uuid,
    pub profile_name: String,
    /// Similarity score, 0-100
    pub similarity: u8,
    /// True when the score clears the automatic-accept threshold
    pub auto_accept: bool,
}

/// Descriptive statistics for one cohort cell.
///
/// Derived on demand, never persisted. All fields are zero when `count` is
/// zero so display code never has to special-case "no data".
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AggregateStat {
    pub count: u64,
    pub mean: f64,
    /// Population standard deviation (divide by N, not N-1)
    pub std: f64,
    pub min: f64,
    pub max: f64,
}

impl AggregateStat {
    pub fn zeroed() -> Self {
        Self {
            count: 0,
            mean: 0.0,
            std: 0.0,
            min: 0.0,
            max: 0.0,
        }
    }
}

impl Default for AggregateStat {
    fn default() -> Self {
        Self::zeroed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_device_serde_roundtrip() {
        let json = serde_json::to_string(&Device::ForceDecks).unwrap();
        assert_eq!(json, "\"ForceDecks\"");

        let device: Device = serde_json::from_str("\"NordBord\"").unwrap();
        assert_eq!(device, Device::NordBord);

        // Unknown families fall through to Other
        let device: Device = serde_json::from_str("\"Keiser\"").unwrap();
        assert_eq!(device, Device::Other("Keiser".to_string()));
        assert_eq!(device.as_str(), "Keiser");
    }

    #[test]
    fn test_deserialize_record() {
        let json = r#"{
            "device": "ForceDecks",
            "recorded_at": "2024-03-02T09:15:00Z",
            "metrics": {
                "testTypeName": "CMJ",
                "Jump Height (Imp-Mom)": 42.1,
                "results": { "Peak Power": 4012.5 }
            }
        }"#;

        let record: RawRecord = serde_json::from_str(json).unwrap();
        assert_eq!(record.device, Device::ForceDecks);
        assert_eq!(record.metrics["results"]["Peak Power"], 4012.5);
    }

    #[test]
    fn test_zeroed_stat() {
        let stat = AggregateStat::zeroed();
        assert_eq!(stat.count, 0);
        assert_eq!(stat.mean, 0.0);
        assert_eq!(stat.std, 0.0);
    }
}
