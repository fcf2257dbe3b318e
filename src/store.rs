//! External store interfaces
//!
//! The persistent record store and the profile store are external
//! collaborators; this module defines the seams the engine consumes and
//! ships in-memory implementations for tests and the CLI.
//!
//! A timed-out fetch is surfaced as [`ReconcileError::StoreTimeout`], never
//! as an empty page: "no data" and "fetch failed" have different correct
//! downstream behaviors.

use crate::error::ReconcileError;
use crate::types::{CanonicalProfile, Device, RawRecord};
use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Maximum rows per page the store will return
pub const DEFAULT_PAGE_SIZE: usize = 1000;

/// Filter for record queries: device family and recording time range
#[derive(Debug, Clone, Default)]
pub struct RecordQuery {
    pub device: Option<Device>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub page_size: usize,
}

impl RecordQuery {
    pub fn new() -> Self {
        Self {
            device: None,
            since: None,
            until: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_device(mut self, device: Device) -> Self {
        self.device = Some(device);
        self
    }

    pub fn with_since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    fn matches(&self, record: &RawRecord) -> bool {
        if let Some(device) = &self.device {
            if record.device != *device {
                return false;
            }
        }
        if let Some(since) = self.since {
            if record.recorded_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if record.recorded_at > until {
                return false;
            }
        }
        true
    }
}

/// Read access to the append-only record table
pub trait RecordStore {
    /// Exact number of records matching the query, without fetching rows
    fn count(&self, query: &RecordQuery) -> Result<u64, ReconcileError>;

    /// One page of matching records, up to `query.page_size` rows.
    /// Pages are zero-indexed; a short or empty page marks exhaustion.
    fn fetch_page(&self, query: &RecordQuery, page: usize) -> Result<Vec<RawRecord>, ReconcileError>;
}

/// Access to canonical athlete profiles and their identity links
pub trait ProfileStore {
    fn profiles(&self) -> Result<Vec<CanonicalProfile>, ReconcileError>;

    /// Write the external identity link for a profile.
    ///
    /// Idempotent: writing the same link twice is a no-op, never a
    /// duplicate or an error.
    fn link(&mut self, profile_id: Uuid, source_id: &str) -> Result<(), ReconcileError>;
}

/// In-memory record store for tests and the CLI
#[derive(Debug, Clone, Default)]
pub struct MemoryRecordStore {
    records: Vec<RawRecord>,
}

impl MemoryRecordStore {
    pub fn new(records: Vec<RawRecord>) -> Self {
        Self { records }
    }

    pub fn push(&mut self, record: RawRecord) {
        self.records.push(record);
    }
}

impl RecordStore for MemoryRecordStore {
    fn count(&self, query: &RecordQuery) -> Result<u64, ReconcileError> {
        Ok(self.records.iter().filter(|r| query.matches(r)).count() as u64)
    }

    fn fetch_page(&self, query: &RecordQuery, page: usize) -> Result<Vec<RawRecord>, ReconcileError> {
        let page_size = if query.page_size == 0 {
            DEFAULT_PAGE_SIZE
        } else {
            query.page_size
        };
        Ok(self
            .records
            .iter()
            .filter(|r| query.matches(r))
            .skip(page * page_size)
            .take(page_size)
            .cloned()
            .collect())
    }
}

/// In-memory profile store for tests and the CLI
#[derive(Debug, Clone, Default)]
pub struct MemoryProfileStore {
    profiles: Vec<CanonicalProfile>,
}

impl MemoryProfileStore {
    pub fn new(profiles: Vec<CanonicalProfile>) -> Self {
        Self { profiles }
    }

    pub fn into_profiles(self) -> Vec<CanonicalProfile> {
        self.profiles
    }
}

impl ProfileStore for MemoryProfileStore {
    fn profiles(&self) -> Result<Vec<CanonicalProfile>, ReconcileError> {
        Ok(self.profiles.clone())
    }

    fn link(&mut self, profile_id: Uuid, source_id: &str) -> Result<(), ReconcileError> {
        let profile = self
            .profiles
            .iter_mut()
            .find(|p| p.id == profile_id)
            .ok_or(ReconcileError::UnknownProfile(profile_id))?;

        if profile.source_id.as_deref() == Some(source_id) {
            return Ok(());
        }
        profile.source_id = Some(source_id.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn record(device: Device, day: u32) -> RawRecord {
        RawRecord::new(
            device,
            Utc.with_ymd_and_hms(2024, 3, day, 9, 0, 0).unwrap(),
            json!({}),
        )
    }

    fn store_with(n: usize) -> MemoryRecordStore {
        let mut store = MemoryRecordStore::default();
        for i in 0..n {
            store.push(record(Device::ForceDecks, (i % 28) as u32 + 1));
        }
        store
    }

    #[test]
    fn test_count_without_rows() {
        let store = store_with(7);
        let query = RecordQuery::new();
        assert_eq!(store.count(&query).unwrap(), 7);
    }

    #[test]
    fn test_pagination_until_exhaustion() {
        let store = store_with(25);
        let query = RecordQuery::new().with_page_size(10);

        assert_eq!(store.fetch_page(&query, 0).unwrap().len(), 10);
        assert_eq!(store.fetch_page(&query, 1).unwrap().len(), 10);
        assert_eq!(store.fetch_page(&query, 2).unwrap().len(), 5);
        assert!(store.fetch_page(&query, 3).unwrap().is_empty());
    }

    #[test]
    fn test_device_and_range_filters() {
        let mut store = MemoryRecordStore::default();
        store.push(record(Device::ForceDecks, 1));
        store.push(record(Device::ForceDecks, 15));
        store.push(record(Device::NordBord, 15));

        let query = RecordQuery::new().with_device(Device::ForceDecks);
        assert_eq!(store.count(&query).unwrap(), 2);

        let query = query.with_since(Utc.with_ymd_and_hms(2024, 3, 10, 0, 0, 0).unwrap());
        assert_eq!(store.count(&query).unwrap(), 1);
    }

    #[test]
    fn test_link_is_idempotent() {
        let profile = CanonicalProfile::new("Kim Min Jae");
        let id = profile.id;
        let mut store = MemoryProfileStore::new(vec![profile]);

        store.link(id, "ext-1").unwrap();
        store.link(id, "ext-1").unwrap();

        let profiles = store.profiles().unwrap();
        assert_eq!(profiles[0].source_id.as_deref(), Some("ext-1"));
    }

    #[test]
    fn test_link_unknown_profile_errors() {
        let mut store = MemoryProfileStore::default();
        let missing = Uuid::new_v4();

        let err = store.link(missing, "ext-1").unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownProfile(_)));
    }
}
