//! Remote record store abstraction.

use crate::asset::AssetStager;
use crate::error::{SyncError, SyncResult};
use parking_lot::RwLock;
use reqsync_core::{RecordKey, ZoneHandle};
use reqsync_record::{Conflict, Field, Record};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, trace};

/// A partitioned remote record store.
///
/// Writes use optimistic concurrency: every saved record carries a change
/// tag, and a save must present the tag it last read. Records carrying
/// asset fields are uploaded from the referenced files; fetched records
/// point at fresh local files the caller is expected to consume.
pub trait RecordStore: Send + Sync {
    /// Creates a zone. Creating an existing zone is a no-op.
    fn create_zone(&self, zone: &ZoneHandle) -> SyncResult<()>;

    /// Deletes a zone and every record in it. Returns false if the zone
    /// did not exist.
    fn delete_zone(&self, zone: &ZoneHandle) -> SyncResult<bool>;

    /// Returns true if the zone exists.
    fn zone_exists(&self, zone: &ZoneHandle) -> SyncResult<bool>;

    /// Fetches one record.
    ///
    /// Fails with [`SyncError::ZoneMissing`] if its zone does not exist.
    fn fetch_record(&self, key: &RecordKey) -> SyncResult<Option<Record>>;

    /// Saves a record and returns the stored copy with its new change tag.
    ///
    /// `expected_tag` is the tag of the copy the caller last read, or
    /// `None` when creating. A mismatch fails with
    /// [`SyncError::RecordConflict`]; an absent zone with
    /// [`SyncError::ZoneMissing`].
    fn save_record(&self, record: &Record, expected_tag: Option<u64>) -> SyncResult<Record>;

    /// Fetches every record of a zone.
    fn fetch_zone(&self, zone: &ZoneHandle) -> SyncResult<Vec<Record>>;
}

#[derive(Debug, Clone)]
struct StoredRecord {
    record: Record,
    blobs: BTreeMap<String, Vec<u8>>,
}

/// An in-memory record store for tests and local tooling.
///
/// Asset files are read into memory on save and written back out to temp
/// files on fetch. The default zone always exists.
#[derive(Debug)]
pub struct MemoryRecordStore {
    zones: RwLock<BTreeMap<ZoneHandle, BTreeMap<String, StoredRecord>>>,
    next_tag: AtomicU64,
    connected: AtomicBool,
    failing_saves: AtomicUsize,
    saves: AtomicU64,
    stager: AssetStager,
}

impl MemoryRecordStore {
    /// Creates a store holding only the empty default zone.
    pub fn new() -> Self {
        Self::with_stager(AssetStager::default())
    }

    /// Creates a store that materializes fetched assets through `stager`.
    pub fn with_stager(stager: AssetStager) -> Self {
        let mut zones = BTreeMap::new();
        zones.insert(ZoneHandle::default_zone(), BTreeMap::new());
        Self {
            zones: RwLock::new(zones),
            next_tag: AtomicU64::new(1),
            connected: AtomicBool::new(true),
            failing_saves: AtomicUsize::new(0),
            saves: AtomicU64::new(0),
            stager,
        }
    }

    /// Sets the connected state. A disconnected store fails every call
    /// with a retryable transport error.
    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::SeqCst);
    }

    /// Makes the next `count` saves fail with [`SyncError::SaveFailure`].
    pub fn fail_next_saves(&self, count: usize) {
        self.failing_saves.store(count, Ordering::SeqCst);
    }

    /// Number of successful saves.
    pub fn save_count(&self) -> u64 {
        self.saves.load(Ordering::SeqCst)
    }

    /// Number of records in a zone, or `None` if the zone does not exist.
    pub fn record_count(&self, zone: &ZoneHandle) -> Option<usize> {
        self.zones.read().get(zone).map(BTreeMap::len)
    }

    /// Returns the blob stored for asset field `name` of `key`.
    pub fn blob(&self, key: &RecordKey, name: &str) -> Option<Vec<u8>> {
        self.zones
            .read()
            .get(&key.zone)?
            .get(&key.name)?
            .blobs
            .get(name)
            .cloned()
    }

    fn ensure_connected(&self) -> SyncResult<()> {
        if self.connected.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(SyncError::transport_retryable("record store unreachable"))
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_saves
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }

    fn materialize(&self, stored: &StoredRecord) -> SyncResult<Record> {
        let mut record = stored.record.clone();
        for (name, bytes) in &stored.blobs {
            let path = self.stager.stage(bytes)?;
            record.set_asset(name.clone(), path);
        }
        Ok(record)
    }

    fn upload(record: &Record) -> SyncResult<StoredRecord> {
        let mut stripped = record.clone();
        let mut blobs = BTreeMap::new();
        for (name, asset) in record.assets() {
            let bytes = std::fs::read(&asset.path).map_err(SyncError::asset_io)?;
            blobs.insert(name.clone(), bytes);
            stripped.fields.remove(name);
        }
        Ok(StoredRecord {
            record: stripped,
            blobs,
        })
    }
}

impl Default for MemoryRecordStore {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordStore for MemoryRecordStore {
    fn create_zone(&self, zone: &ZoneHandle) -> SyncResult<()> {
        self.ensure_connected()?;
        self.zones.write().entry(zone.clone()).or_default();
        debug!(zone = %zone, "zone created");
        Ok(())
    }

    fn delete_zone(&self, zone: &ZoneHandle) -> SyncResult<bool> {
        self.ensure_connected()?;
        if zone.is_default() {
            return Err(SyncError::save_failure("the default zone cannot be deleted"));
        }
        let removed = self.zones.write().remove(zone).is_some();
        debug!(zone = %zone, removed, "zone deleted");
        Ok(removed)
    }

    fn zone_exists(&self, zone: &ZoneHandle) -> SyncResult<bool> {
        self.ensure_connected()?;
        Ok(self.zones.read().contains_key(zone))
    }

    fn fetch_record(&self, key: &RecordKey) -> SyncResult<Option<Record>> {
        self.ensure_connected()?;
        let zones = self.zones.read();
        let records = zones.get(&key.zone).ok_or_else(|| SyncError::ZoneMissing {
            zone: key.zone.clone(),
        })?;
        records.get(&key.name).map(|s| self.materialize(s)).transpose()
    }

    fn save_record(&self, record: &Record, expected_tag: Option<u64>) -> SyncResult<Record> {
        self.ensure_connected()?;
        if self.take_injected_failure() {
            return Err(SyncError::save_failure(format!("injected failure for {}", record.key)));
        }
        let mut stored = Self::upload(record)?;

        let mut zones = self.zones.write();
        let records = zones
            .get_mut(&record.key.zone)
            .ok_or_else(|| SyncError::ZoneMissing {
                zone: record.key.zone.clone(),
            })?;
        if let Some(existing) = records.get(&record.key.name) {
            if existing.record.change_tag != expected_tag {
                return Err(SyncError::conflict(Conflict::new(
                    record.key.clone(),
                    record.stamp(),
                    existing.record.stamp(),
                    existing.record.change_tag,
                )));
            }
        }

        let tag = self.next_tag.fetch_add(1, Ordering::SeqCst);
        stored.record.change_tag = Some(tag);
        let mut saved = record.clone();
        saved.change_tag = Some(tag);
        records.insert(record.key.name.clone(), stored);
        self.saves.fetch_add(1, Ordering::SeqCst);
        trace!(record = %record.key, tag, "record saved");
        Ok(saved)
    }

    fn fetch_zone(&self, zone: &ZoneHandle) -> SyncResult<Vec<Record>> {
        self.ensure_connected()?;
        let zones = self.zones.read();
        let records = zones.get(zone).ok_or_else(|| SyncError::ZoneMissing { zone: zone.clone() })?;
        records.values().map(|s| self.materialize(s)).collect()
    }
}

/// Returns true if any field of `record` is an asset.
pub(crate) fn has_assets(record: &Record) -> bool {
    record.fields.values().any(|f| matches!(f, Field::Asset(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::{record_name, zone_of, EntityKind, TypedId};

    fn key() -> RecordKey {
        let ws = TypedId::mint(EntityKind::Workspace);
        record_name(&TypedId::mint(EntityKind::Project), &zone_of(&ws).unwrap())
    }

    fn project(key: &RecordKey, version: i64) -> Record {
        Record::for_kind(EntityKind::Project, key.clone())
            .with("name", "API")
            .with("version", version)
    }

    #[test]
    fn save_requires_zone() {
        let store = MemoryRecordStore::new();
        let key = key();
        let err = store.save_record(&project(&key, 1), None).unwrap_err();
        assert!(matches!(err, SyncError::ZoneMissing { .. }));
        assert!(matches!(store.fetch_record(&key), Err(SyncError::ZoneMissing { .. })));

        store.create_zone(&key.zone).unwrap();
        let saved = store.save_record(&project(&key, 1), None).unwrap();
        assert!(saved.change_tag.is_some());
        assert_eq!(store.fetch_record(&key).unwrap(), Some(saved));
    }

    #[test]
    fn stale_tag_conflicts() {
        let store = MemoryRecordStore::new();
        let key = key();
        store.create_zone(&key.zone).unwrap();
        let first = store.save_record(&project(&key, 1), None).unwrap();
        let second = store.save_record(&project(&key, 2), first.change_tag).unwrap();

        let err = store.save_record(&project(&key, 3), first.change_tag).unwrap_err();
        match err {
            SyncError::RecordConflict(conflict) => {
                assert_eq!(conflict.remote.version, 2);
                assert_eq!(conflict.local.version, 3);
                assert_eq!(conflict.remote_tag, second.change_tag);
            }
            other => panic!("expected conflict, got {other:?}"),
        }

        // Creating over an existing record conflicts as well.
        assert!(matches!(
            store.save_record(&project(&key, 1), None),
            Err(SyncError::RecordConflict(_))
        ));
    }

    #[test]
    fn assets_are_uploaded_and_materialized() {
        let store = MemoryRecordStore::new();
        let stager = AssetStager::default();
        let key = key();
        store.create_zone(&key.zone).unwrap();

        let mut record = Record::for_kind(EntityKind::File, key.clone());
        stager.attach(&mut record, "data", b"payload");
        store.save_record(&record, None).unwrap();
        stager.discard_record(&record);
        assert_eq!(store.blob(&key, "data"), Some(b"payload".to_vec()));

        let fetched = store.fetch_record(&key).unwrap().unwrap();
        assert!(has_assets(&fetched));
        assert_eq!(stager.detach(&fetched, "data"), b"payload");
    }

    #[test]
    fn failure_injection_and_disconnect() {
        let store = MemoryRecordStore::new();
        let key = key();
        store.create_zone(&key.zone).unwrap();

        store.fail_next_saves(1);
        assert!(matches!(
            store.save_record(&project(&key, 1), None),
            Err(SyncError::SaveFailure { .. })
        ));
        store.save_record(&project(&key, 1), None).unwrap();
        assert_eq!(store.save_count(), 1);

        store.set_connected(false);
        assert!(store.zone_exists(&key.zone).unwrap_err().is_retryable());
    }

    #[test]
    fn zones_can_be_deleted_except_default() {
        let store = MemoryRecordStore::new();
        let key = key();
        store.create_zone(&key.zone).unwrap();
        store.save_record(&project(&key, 1), None).unwrap();
        assert_eq!(store.record_count(&key.zone), Some(1));

        assert!(store.delete_zone(&key.zone).unwrap());
        assert!(!store.zone_exists(&key.zone).unwrap());
        assert!(!store.delete_zone(&key.zone).unwrap());
        assert!(store.delete_zone(&ZoneHandle::default_zone()).is_err());
    }
}
