//! Sync orchestration between the synced local store and a record store.

use crate::codec::{ancestors, owner_chain, RecordCodec};
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::record_store::{has_assets, RecordStore};
use parking_lot::RwLock;
use reqsync_core::{
    delete, purge, record_name, zone_of, AnyEntity, CoreError, DeleteMode, EntityKind, EntityView, Meta,
    RecordKey, Store, Timestamp, Transaction, TypedId, Workspace, ZoneHandle,
};
use reqsync_record::{Conflict, ConflictResolution, Record, RecordStamp, ZoneRecord};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Statistics about sync operations.
#[derive(Debug, Clone, Default)]
pub struct SyncStats {
    /// Records written to the remote store.
    pub records_pushed: u64,
    /// Records ingested from the remote store.
    pub records_pulled: u64,
    /// Zones created after a write found them missing.
    pub zones_created: u64,
    /// Conflicts encountered on push or pull.
    pub conflicts_encountered: u64,
    /// Conflicts the policy settled.
    pub conflicts_resolved: u64,
    /// Local entities purged after their deletion was synced.
    pub entities_purged: u64,
    /// Retries of transient transport errors.
    pub retries: u64,
    /// Last sync time.
    pub last_sync_time: Option<Instant>,
    /// Last error message.
    pub last_error: Option<String>,
}

/// Outcome of [`SyncOrchestrator::push_aggregate`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PushReport {
    /// The workspace is not synced or not active; nothing was written.
    pub skipped: bool,
    /// Entities whose local state was written.
    pub written: Vec<TypedId>,
    /// Entities replaced by their remote copy after a conflict.
    pub accepted_remote: Vec<TypedId>,
    /// Tombstoned entities removed locally once their deletion was written.
    pub purged: usize,
}

/// Outcome of a pull.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PullReport {
    /// Records ingested.
    pub ingested: usize,
    /// Records ignored because the unsynced local copy won.
    pub kept_local: usize,
    /// Local entities removed because their remote copy was deleted.
    pub purged: usize,
    /// Workspaces removed because their zone was disabled.
    pub workspaces_removed: Vec<TypedId>,
    /// Conflicts left for manual resolution.
    pub conflicts: Vec<Conflict>,
}

impl PullReport {
    fn merge(&mut self, other: PullReport) {
        self.ingested += other.ingested;
        self.kept_local += other.kept_local;
        self.purged += other.purged;
        self.workspaces_removed.extend(other.workspaces_removed);
        self.conflicts.extend(other.conflicts);
    }
}

enum Written {
    Saved(Record),
    AcceptedRemote(Record),
}

/// Entities of one push, cloned under the store's read lock.
struct PushPlan {
    workspace: Workspace,
    owners: Vec<AnyEntity>,
    subtree: Vec<AnyEntity>,
    methods: HashMap<TypedId, AnyEntity>,
}

impl PushPlan {
    fn collect<V: EntityView>(view: &V, root: &TypedId) -> SyncResult<Self> {
        let root_entity = view.get_any(root).ok_or_else(|| CoreError::not_found(root))?;
        let workspace_id = root_entity.meta().workspace_id().clone();
        let workspace = view
            .get::<Workspace>(&workspace_id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(&workspace_id))?;
        let owners = owner_chain(view, root)
            .iter()
            .filter(|id| **id != workspace_id)
            .filter_map(|id| view.get_any(id).cloned())
            .collect();

        let mut subtree = Vec::new();
        let mut methods = HashMap::new();
        let mut level = vec![root.clone()];
        while !level.is_empty() {
            let mut entities: Vec<AnyEntity> =
                level.iter().filter_map(|id| view.get_any(id).cloned()).collect();
            // Methods before requests, so a selected method is resolved first.
            entities.sort_by(|a, b| {
                (a.kind() != EntityKind::RequestMethod, a.meta().created(), a.id())
                    .cmp(&(b.kind() != EntityKind::RequestMethod, b.meta().created(), b.id()))
            });
            for entity in &entities {
                if let AnyEntity::Request(request) = entity {
                    if let Some(method) = request.method_id.as_ref().and_then(|m| view.get_any(m)) {
                        methods.insert(method.id().clone(), method.clone());
                    }
                }
            }
            level = entities.iter().flat_map(|e| view.child_ids(e.id())).collect();
            subtree.extend(entities);
        }

        Ok(Self {
            workspace,
            owners,
            subtree,
            methods,
        })
    }
}

/// Coordinates pushes and pulls for the synced back-end.
pub struct SyncOrchestrator<S: RecordStore> {
    local: Arc<Store>,
    remote: Arc<S>,
    codec: RecordCodec,
    config: SyncConfig,
    stats: RwLock<SyncStats>,
}

impl<S: RecordStore> SyncOrchestrator<S> {
    /// Creates an orchestrator syncing `local` with `remote`.
    pub fn new(local: Arc<Store>, remote: Arc<S>, codec: RecordCodec, config: SyncConfig) -> Self {
        Self {
            local,
            remote,
            codec,
            config,
            stats: RwLock::new(SyncStats::default()),
        }
    }

    /// The local store.
    pub fn local(&self) -> &Arc<Store> {
        &self.local
    }

    /// The remote record store.
    pub fn remote(&self) -> &Arc<S> {
        &self.remote
    }

    /// The sync configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Gets the current stats.
    pub fn stats(&self) -> SyncStats {
        self.stats.read().clone()
    }

    /// Writes `root` and everything it owns to the remote store.
    ///
    /// Owner records are resolved first, fetched if present and created
    /// otherwise, so no remote record is ever orphaned. Entities already
    /// synced are only created if their record is missing. Written entities
    /// are marked synced unless they changed meanwhile, and tombstoned ones
    /// are purged locally.
    ///
    /// # Errors
    ///
    /// Fails if `root` is unknown, on unresolved conflicts and on store
    /// errors that survive the zone and transport retries.
    pub fn push_aggregate(&self, root: &TypedId) -> SyncResult<PushReport> {
        let plan = self.local.read(|g| PushPlan::collect(g, root))?;
        let workspace = &plan.workspace;
        if !workspace.is_sync_enabled || !workspace.is_active {
            debug!(workspace = %workspace.meta.id(), "push skipped, workspace not synced or inactive");
            return Ok(PushReport {
                skipped: true,
                ..PushReport::default()
            });
        }

        let mut report = PushReport::default();
        let mut resolved: HashMap<TypedId, Record> = HashMap::new();
        let mut written: Vec<AnyEntity> = Vec::new();

        if workspace.meta.id() != root {
            let ws_any = AnyEntity::Workspace(workspace.clone());
            let record = self.materialize(&ws_any, None, workspace, &mut written)?;
            resolved.insert(workspace.meta.id().clone(), record);
        }
        for owner in &plan.owners {
            let parent = owner.parent_id().and_then(|p| resolved.get(p)).cloned();
            let record = self.materialize(owner, parent.as_ref(), workspace, &mut written)?;
            resolved.insert(owner.id().clone(), record);
        }

        for entity in &plan.subtree {
            if let AnyEntity::Request(request) = entity {
                let pending = request
                    .method_id
                    .as_ref()
                    .filter(|m| !resolved.contains_key(*m))
                    .and_then(|m| plan.methods.get(m));
                if let Some(method) = pending {
                    let parent = method.parent_id().and_then(|p| resolved.get(p)).cloned();
                    let record = self.materialize(method, parent.as_ref(), workspace, &mut written)?;
                    resolved.insert(method.id().clone(), record);
                }
            }

            let parent = entity.parent_id().and_then(|p| resolved.get(p)).cloned();
            let id = entity.id().clone();
            let record = if entity.meta().is_synced {
                self.materialize(entity, parent.as_ref(), workspace, &mut written)?
            } else {
                match self.write(entity, parent.as_ref(), workspace)? {
                    Written::Saved(record) => {
                        written.push(entity.clone());
                        report.written.push(id.clone());
                        record
                    }
                    Written::AcceptedRemote(record) => {
                        report.accepted_remote.push(id.clone());
                        record
                    }
                }
            };
            resolved.insert(id, record);
        }

        report.purged = self.transact(|txn| Ok(finalize(txn, &written)))?;
        let mut stats = self.stats.write();
        stats.entities_purged += report.purged as u64;
        stats.last_sync_time = Some(Instant::now());
        drop(stats);
        info!(
            root = %root,
            written = report.written.len(),
            accepted_remote = report.accepted_remote.len(),
            purged = report.purged,
            "aggregate pushed"
        );
        Ok(report)
    }

    /// Creates the zone of `workspace` and its zone tombstone in the default
    /// zone.
    ///
    /// # Errors
    ///
    /// Propagates record store errors.
    pub fn on_zone_missing(&self, workspace: &Workspace) -> SyncResult<()> {
        let zone = zone_of(workspace.meta.id())?;
        info!(zone = %zone, "creating missing zone");
        self.with_retry(|| self.remote.create_zone(&zone))?;
        self.write_zone_tombstone(&ZoneRecord::for_workspace(workspace))?;
        self.stats.write().zones_created += 1;
        Ok(())
    }

    /// Settles a rejected write of `local` with the configured policy.
    ///
    /// Keeping the local copy overwrites the remote one; accepting the remote
    /// copy ingests it into the local store.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::RecordConflict`] when the policy leaves the
    /// conflict unresolved, or the error of the follow-up write.
    fn on_remote_conflict(&self, mut conflict: Conflict, local: &Record) -> SyncResult<Written> {
        self.stats.write().conflicts_encountered += 1;
        let resolution = self.config.conflict_policy.resolve(&mut conflict);
        warn!(record = %conflict.key, ?resolution, "write conflict");
        let written = match resolution {
            ConflictResolution::KeepLocal => {
                let saved = self.remote.save_record(local, conflict.remote_tag)?;
                self.stats.write().records_pushed += 1;
                Written::Saved(saved)
            }
            ConflictResolution::AcceptRemote => {
                let remote = self
                    .fetch_existing(&conflict.key)?
                    .ok_or_else(|| SyncError::conflict(conflict.clone()))?;
                let ingested = self.transact(|txn| self.codec.from_record(&remote, txn));
                self.codec.assets().discard_record(&remote);
                ingested?;
                self.stats.write().records_pulled += 1;
                Written::AcceptedRemote(remote)
            }
            ConflictResolution::Skip => return Err(SyncError::conflict(conflict)),
        };
        self.stats.write().conflicts_resolved += 1;
        Ok(written)
    }

    /// Ingests every record of a workspace zone.
    ///
    /// Delivery order does not matter; missing owners are stubbed. A remote
    /// copy of an entity with unsynced local changes goes through the
    /// conflict policy. Records marked deleted are purged locally.
    ///
    /// # Errors
    ///
    /// Fails with [`SyncError::ZoneMissing`] if the zone does not exist, or
    /// with the first ingestion error, in which case nothing is applied.
    pub fn pull_zone(&self, workspace_id: &TypedId) -> SyncResult<PullReport> {
        let zone = zone_of(workspace_id)?;
        let mut records = self.with_retry(|| self.remote.fetch_zone(&zone))?;
        records.sort_by_key(|r| ancestors(r).len());

        let outcome = self.transact(|txn| self.ingest(txn, &records));
        for record in records.iter().filter(|r| has_assets(r)) {
            self.codec.assets().discard_record(record);
        }
        let report = outcome?;

        let mut stats = self.stats.write();
        stats.records_pulled += report.ingested as u64;
        stats.entities_purged += report.purged as u64;
        stats.conflicts_encountered += report.conflicts.len() as u64;
        stats.last_sync_time = Some(Instant::now());
        drop(stats);
        info!(zone = %zone, ingested = report.ingested, purged = report.purged, "zone pulled");
        Ok(report)
    }

    /// Discovers workspaces through the zone tombstones of the default zone.
    ///
    /// A disabled tombstone removes the local workspace. Any other tombstone
    /// creates the workspace if it is unknown and pulls its zone.
    ///
    /// # Errors
    ///
    /// Propagates store errors. Zones that vanished between listing and
    /// pulling are skipped.
    pub fn pull_workspaces(&self) -> SyncResult<PullReport> {
        let default_zone = ZoneHandle::default_zone();
        let records = self.with_retry(|| self.remote.fetch_zone(&default_zone))?;
        let mut report = PullReport::default();

        for record in &records {
            if record.kind().ok() != Some(EntityKind::Zone) {
                continue;
            }
            let zone = ZoneRecord::from_record(record)?;
            let workspace_id = zone.workspace_id.clone();
            let known = self.local.read(|g| g.exists(&workspace_id));

            if zone.is_disabled {
                if known {
                    let removed = self.transact(|txn| {
                        Ok(delete(txn, &workspace_id, DeleteMode::Direct)?.len())
                    })?;
                    info!(workspace = %workspace_id, removed, "workspace deleted remotely");
                    report.purged += removed;
                    report.workspaces_removed.push(workspace_id);
                }
                continue;
            }

            if !known {
                self.transact(|txn| {
                    let mut meta = Meta::restore(
                        workspace_id.clone(),
                        workspace_id.clone(),
                        zone.created,
                        zone.modified,
                        zone.version,
                    );
                    meta.is_synced = true;
                    let mut workspace = Workspace::new(meta, zone.name.clone());
                    workspace.desc = zone.desc.clone();
                    workspace.is_sync_enabled = zone.is_sync_enabled;
                    txn.upsert(workspace)?;
                    Ok(())
                })?;
                debug!(workspace = %workspace_id, "workspace discovered");
            }

            match self.pull_zone(&workspace_id) {
                Ok(zone_report) => report.merge(zone_report),
                Err(SyncError::ZoneMissing { zone }) => {
                    warn!(zone = %zone, "zone listed but missing");
                }
                Err(e) => return Err(e),
            }
        }
        Ok(report)
    }

    /// Deletes a workspace everywhere: its zone goes away, its zone
    /// tombstone is disabled so other devices purge it, and the local copy
    /// is removed. Returns the number of local entities removed.
    ///
    /// # Errors
    ///
    /// Fails if the workspace is unknown locally or on store errors.
    pub fn delete_workspace_remote(&self, workspace_id: &TypedId) -> SyncResult<usize> {
        let workspace = self
            .local
            .read(|g| g.get::<Workspace>(workspace_id).cloned())
            .ok_or_else(|| CoreError::not_found(workspace_id))?;
        let zone = zone_of(workspace_id)?;
        self.with_retry(|| self.remote.delete_zone(&zone))?;

        let mut tombstone = ZoneRecord::for_workspace(&workspace);
        tombstone.is_disabled = true;
        tombstone.modified = tombstone.modified.max(Timestamp::now());
        self.write_zone_tombstone(&tombstone)?;

        let removed =
            self.transact(|txn| Ok(delete(txn, workspace_id, DeleteMode::Direct)?.len()))?;
        self.stats.write().entities_purged += removed as u64;
        info!(workspace = %workspace_id, removed, "workspace deleted");
        Ok(removed)
    }

    /// Pulls the zone of a workspace, then pushes the workspace.
    ///
    /// # Errors
    ///
    /// See [`SyncOrchestrator::pull_zone`] and
    /// [`SyncOrchestrator::push_aggregate`]. A missing zone is not an error
    /// here; the push creates it.
    pub fn sync_workspace(&self, workspace_id: &TypedId) -> SyncResult<(PullReport, PushReport)> {
        let outcome = match self.pull_zone(workspace_id) {
            Ok(pulled) => Ok(pulled),
            Err(SyncError::ZoneMissing { .. }) => Ok(PullReport::default()),
            Err(e) => Err(e),
        }
        .and_then(|pulled| Ok((pulled, self.push_aggregate(workspace_id)?)));
        if let Err(e) = &outcome {
            self.stats.write().last_error = Some(e.to_string());
        }
        outcome
    }

    fn ingest(&self, txn: &mut Transaction<'_>, records: &[Record]) -> SyncResult<PullReport> {
        let mut report = PullReport::default();
        let mut tombstoned = Vec::new();
        for record in records {
            let id = record.entity_id()?;
            let local_stamp = txn
                .get_any(&id)
                .filter(|e| !e.meta().is_synced)
                .map(|e| RecordStamp {
                    version: e.meta().version,
                    modified: e.meta().modified(),
                });
            if let Some(local) = local_stamp.filter(|s| *s != record.stamp()) {
                let mut conflict =
                    Conflict::new(record.key.clone(), local, record.stamp(), record.change_tag);
                match self.config.conflict_policy.resolve(&mut conflict) {
                    ConflictResolution::KeepLocal => {
                        report.kept_local += 1;
                        continue;
                    }
                    ConflictResolution::Skip => {
                        report.conflicts.push(conflict);
                        continue;
                    }
                    ConflictResolution::AcceptRemote => {}
                }
            }
            self.codec.from_record(record, txn)?;
            report.ingested += 1;
            if record.bool_or("markForDelete", false) {
                tombstoned.push(id);
            }
        }
        report.purged = purge(txn, &tombstoned);
        Ok(report)
    }

    fn write(&self, entity: &AnyEntity, parent: Option<&Record>, workspace: &Workspace) -> SyncResult<Written> {
        let record = self.codec.to_record(entity, parent)?;
        let existing = self.fetch_existing(&record.key)?;
        if let Some(existing) = &existing {
            self.codec.assets().discard_record(existing);
        }
        let expected = existing.as_ref().and_then(|r| r.change_tag);

        let result = match existing.filter(|e| e.stamp() > record.stamp()) {
            Some(newer) => self.on_remote_conflict(
                Conflict::new(record.key.clone(), record.stamp(), newer.stamp(), newer.change_tag),
                &record,
            ),
            None => match self.save(&record, expected, workspace) {
                Err(SyncError::RecordConflict(conflict)) => self.on_remote_conflict(*conflict, &record),
                other => other.map(Written::Saved),
            },
        };
        self.codec.assets().discard_record(&record);
        result
    }

    fn materialize(
        &self,
        entity: &AnyEntity,
        parent: Option<&Record>,
        workspace: &Workspace,
        written: &mut Vec<AnyEntity>,
    ) -> SyncResult<Record> {
        let zone = zone_of(entity.meta().workspace_id())?;
        let key = record_name(entity.id(), &zone);
        if let Some(existing) = self.fetch_existing(&key)? {
            self.codec.assets().discard_record(&existing);
            return Ok(existing);
        }
        let record = self.codec.to_record(entity, parent)?;
        let result = self.save(&record, None, workspace);
        self.codec.assets().discard_record(&record);
        let saved = result?;
        written.push(entity.clone());
        debug!(record = %key, "record materialized");
        Ok(saved)
    }

    fn save(&self, record: &Record, expected: Option<u64>, workspace: &Workspace) -> SyncResult<Record> {
        let mut zone_attempts = 0;
        loop {
            match self.with_retry(|| self.remote.save_record(record, expected)) {
                Ok(saved) => {
                    self.stats.write().records_pushed += 1;
                    return Ok(saved);
                }
                Err(SyncError::ZoneMissing { zone }) if zone_attempts < self.config.zone_retry_attempts => {
                    zone_attempts += 1;
                    debug!(zone = %zone, record = %record.key, "zone missing, retrying after creation");
                    self.on_zone_missing(workspace)?;
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn write_zone_tombstone(&self, zone: &ZoneRecord) -> SyncResult<Record> {
        let record = zone.to_record()?;
        let expected = self.fetch_tag(&record.key)?;
        self.with_retry(|| self.remote.save_record(&record, expected))
    }

    fn fetch_existing(&self, key: &RecordKey) -> SyncResult<Option<Record>> {
        match self.with_retry(|| self.remote.fetch_record(key)) {
            Err(SyncError::ZoneMissing { .. }) => Ok(None),
            other => other,
        }
    }

    fn fetch_tag(&self, key: &RecordKey) -> SyncResult<Option<u64>> {
        let existing = self.fetch_existing(key)?;
        if let Some(record) = &existing {
            self.codec.assets().discard_record(record);
        }
        Ok(existing.and_then(|r| r.change_tag))
    }

    fn with_retry<T>(&self, op: impl Fn() -> SyncResult<T>) -> SyncResult<T> {
        let retry = &self.config.retry;
        let mut attempt = 0;
        loop {
            match op() {
                Err(e) if e.is_retryable() && attempt + 1 < retry.max_attempts => {
                    attempt += 1;
                    self.stats.write().retries += 1;
                    let delay = retry.delay_for_attempt(attempt);
                    debug!(attempt, ?delay, error = %e, "retrying after transient error");
                    std::thread::sleep(delay);
                }
                other => return other,
            }
        }
    }

    /// Runs `f` in a local transaction. Errors of `f` discard the
    /// transaction and are returned as is; a rejected commit is a
    /// [`SyncError::SaveFailure`].
    fn transact<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> SyncResult<T>) -> SyncResult<T> {
        let mut failure = None;
        let outcome = self.local.transaction(|txn| {
            f(txn).map_err(|e| {
                failure = Some(e);
                CoreError::invalid_operation("sync step aborted")
            })
        });
        match failure {
            Some(e) => Err(e),
            None => outcome.map_err(|e| SyncError::save_failure(e.to_string())),
        }
    }
}

/// Marks written entities synced unless they changed since the push read
/// them, and purges tombstones whose deletion was written. Returns the number
/// purged.
///
/// An entity counts as unchanged only if its whole state still equals the
/// copy that was written; `modified` alone has millisecond resolution.
fn finalize(txn: &mut Transaction<'_>, written: &[AnyEntity]) -> usize {
    let mut tombstoned = Vec::new();
    for pushed in written {
        let id = pushed.id();
        if txn.get_any(id) != Some(pushed) {
            continue;
        }
        if pushed.is_deleted() {
            tombstoned.push(id.clone());
        } else {
            txn.mark_synced(id);
        }
    }
    purge(txn, &tombstoned)
}
