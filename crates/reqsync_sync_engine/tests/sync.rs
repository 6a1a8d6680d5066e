//! Integration tests for pushing, pulling and conflict handling.

use proptest::prelude::*;
use reqsync_core::{
    record_name, zone_of, zone_tombstone_key, EntityKind, EntityView, Env, EnvVar, File, Request,
    RequestData, RequestMethod, Store, Timestamp, TypedId, Workspace, ZoneHandle,
};
use reqsync_record::ConflictPolicy;
use reqsync_sync_engine::{RecordStore, RetryConfig, SyncConfig, SyncError};
use reqsync_testkit::prelude::*;
use reqsync_testkit::{scenarios, FILE_BYTES};
use std::time::Duration;

/// Renames a request and moves its `modified` `ahead_ms` into the future,
/// so competing edits order deterministically.
fn rename(store: &Store, id: &TypedId, name: &str, ahead_ms: i64) {
    let name = name.to_string();
    store
        .transaction(|txn| {
            txn.edit::<Request>(id, |r| r.name = name)?;
            if let Some(r) = txn.get_mut::<Request>(id) {
                r.meta
                    .touch(Timestamp::from_millis(Timestamp::now().as_millis() + ahead_ms));
            }
            Ok(())
        })
        .unwrap();
}

fn request_name(store: &Store, id: &TypedId) -> String {
    store.read(|g| g.get::<Request>(id).unwrap().name.clone())
}

fn is_synced(store: &Store, id: &TypedId) -> bool {
    store.read(|g| g.get_any(id).unwrap().meta().is_synced)
}

fn harness_with(policy: ConflictPolicy) -> (SyncHarness, Aggregate) {
    let harness = SyncHarness::with_config(
        SyncConfig::default()
            .with_conflict_policy(policy)
            .with_retry(RetryConfig::no_retry()),
    );
    let agg = aggregate(&harness.local);
    harness.sync.push_aggregate(&agg.request).unwrap();
    harness.sync.push_aggregate(&agg.env).unwrap();
    (harness, agg)
}

#[test]
fn push_creates_zone_and_tombstone() {
    let (harness, agg) = scenarios::populated();
    let zone = zone_of(&agg.workspace).unwrap();
    assert_eq!(harness.remote.record_count(&zone), None);

    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    assert!(!report.skipped);
    assert_eq!(harness.sync.stats().zones_created, 1);
    assert!(harness.remote.zone_exists(&zone).unwrap());
    assert_eq!(harness.remote.record_count(&ZoneHandle::default_zone()), Some(1));
    let tombstone = harness
        .remote
        .fetch_record(&zone_tombstone_key(&agg.workspace).unwrap())
        .unwrap()
        .unwrap();
    assert!(!tombstone.bool_or("isDisabled", true));

    harness.sync.push_aggregate(&agg.env).unwrap();
    assert_eq!(harness.remote.record_count(&zone), Some(agg.ids().len()));
    assert_eq!(harness.sync.stats().zones_created, 1);
}

#[test]
fn push_marks_written_entities_synced() {
    let (harness, agg) = scenarios::pushed();
    for id in agg.ids() {
        assert!(is_synced(&harness.local, &id), "{id} not synced");
    }
    // Default methods nobody selected stay local until the project is pushed.
    let get = RequestMethod::default_id(&agg.project, "GET");
    assert!(!is_synced(&harness.local, &get));
}

#[test]
fn repeated_push_writes_nothing() {
    let (harness, agg) = scenarios::pushed();
    let saves = harness.remote.save_count();
    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    assert!(report.written.is_empty());
    assert_eq!(harness.remote.save_count(), saves);
}

#[test]
fn push_skips_disabled_and_inactive_workspaces() {
    let harness = SyncHarness::new();
    let ws = TypedId::mint(EntityKind::Workspace);
    let env = TypedId::mint(EntityKind::Env);
    harness
        .local
        .transaction(|txn| {
            let w = txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "Draft"))?;
            w.is_sync_enabled = true;
            txn.create_or_get(&env, &ws, |m| Env::new(m, "dev"))?;
            Ok(())
        })
        .unwrap();

    let report = harness.sync.push_aggregate(&env).unwrap();
    assert!(report.skipped);
    assert_eq!(harness.remote.save_count(), 0);

    harness
        .local
        .transaction(|txn| {
            txn.edit::<Env>(&env, |e| e.name = "prod".into())?;
            txn.edit::<Workspace>(&ws, |w| w.is_sync_enabled = false)?;
            Ok(())
        })
        .unwrap();
    assert!(harness.sync.push_aggregate(&env).unwrap().skipped);
    assert_eq!(harness.remote.save_count(), 0);
}

#[test]
fn owners_are_written_before_children() {
    let (harness, agg) = scenarios::populated();
    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    let pos = |id: &TypedId| report.written.iter().position(|w| w == id).unwrap();
    assert!(pos(&agg.request) < pos(&agg.header));
    assert!(pos(&agg.request) < pos(&agg.body));
    assert!(pos(&agg.body) < pos(&agg.form_file));
    assert!(pos(&agg.form_file) < pos(&agg.file));
}

#[test]
fn env_values_are_sealed_and_blobs_uploaded() {
    let (harness, agg) = scenarios::pushed();
    let zone = zone_of(&agg.workspace).unwrap();
    let var = harness
        .remote
        .fetch_record(&record_name(&agg.var, &zone))
        .unwrap()
        .unwrap();
    let sealed = var.bytes("value").unwrap();
    assert!(!sealed.windows(6).any(|w| w == b"s3cr3t"));

    assert_eq!(
        harness.remote.blob(&record_name(&agg.file, &zone), "data"),
        Some(FILE_BYTES.to_vec())
    );
    assert_eq!(harness.staged_assets(), 0);
}

#[test]
fn tombstones_are_pushed_then_purged() {
    let (harness, agg) = scenarios::pushed();
    harness
        .local
        .transaction(|txn| {
            txn.tombstone(&agg.header);
            Ok(())
        })
        .unwrap();

    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    assert_eq!(report.purged, 1);
    assert!(harness.local.read(|g| g.get_any(&agg.header).is_none()));

    let zone = zone_of(&agg.workspace).unwrap();
    let remote = harness
        .remote
        .fetch_record(&record_name(&agg.header, &zone))
        .unwrap()
        .unwrap();
    assert!(remote.bool_or("markForDelete", false));

    let other = harness.second_device();
    other.pull_workspaces().unwrap();
    other.local().read(|g| {
        assert!(g.get_any(&agg.header).is_none());
        assert!(g.exists(&agg.param));
    });
}

#[test]
fn fresh_device_pulls_everything() {
    let (harness, agg) = scenarios::pushed();
    let other = harness.second_device();

    let report = other.pull_workspaces().unwrap();
    assert_eq!(report.ingested, agg.ids().len());
    assert!(report.conflicts.is_empty());

    other.local().read(|g| {
        for id in agg.ids() {
            let entity = g.get_any(&id).unwrap_or_else(|| panic!("{id} missing"));
            assert!(entity.meta().is_synced);
        }
        assert_eq!(g.get::<EnvVar>(&agg.var).unwrap().value, "s3cr3t");
        assert_eq!(g.get::<File>(&agg.file).unwrap().data, FILE_BYTES);
        let request = g.get::<Request>(&agg.request).unwrap();
        assert_eq!(request.url, "https://api.example.com/users");
        assert_eq!(request.method_id.as_ref(), Some(&agg.method));
        assert!(g.get::<Workspace>(&agg.workspace).unwrap().is_sync_enabled);
    });
    assert_eq!(harness.staged_assets(), 0);
}

#[test]
fn disabled_zone_removes_workspace_on_other_devices() {
    let (harness, agg) = scenarios::pushed();
    let other = harness.second_device();
    other.pull_workspaces().unwrap();
    assert!(!other.local().is_empty());

    let removed = harness.sync.delete_workspace_remote(&agg.workspace).unwrap();
    assert!(removed >= agg.ids().len());
    assert!(harness.local.is_empty());
    let zone = zone_of(&agg.workspace).unwrap();
    assert_eq!(harness.remote.record_count(&zone), None);

    let report = other.pull_workspaces().unwrap();
    assert_eq!(report.workspaces_removed, vec![agg.workspace.clone()]);
    assert!(other.local().is_empty());
}

#[test]
fn sync_workspace_tolerates_missing_zone() {
    let (harness, agg) = scenarios::populated();
    let (pulled, pushed) = harness.sync.sync_workspace(&agg.workspace).unwrap();
    assert_eq!(pulled.ingested, 0);
    assert!(pushed.written.contains(&agg.var));

    // The whole workspace went out, default methods included.
    let zone = zone_of(&agg.workspace).unwrap();
    assert_eq!(harness.remote.record_count(&zone), Some(agg.ids().len() + 4));
}

#[test]
fn push_conflict_accepts_newer_remote() {
    let (harness, agg) = scenarios::pushed();
    let other = harness.second_device();
    other.pull_workspaces().unwrap();

    rename(other.local(), &agg.request, "from other", 20_000);
    other.push_aggregate(&agg.request).unwrap();

    rename(&harness.local, &agg.request, "from here", 10_000);
    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    assert_eq!(report.accepted_remote, vec![agg.request.clone()]);
    assert_eq!(request_name(&harness.local, &agg.request), "from other");
    assert!(is_synced(&harness.local, &agg.request));

    let stats = harness.sync.stats();
    assert_eq!(stats.conflicts_encountered, 1);
    assert_eq!(stats.conflicts_resolved, 1);
}

#[test]
fn push_conflict_client_wins_overwrites_remote() {
    let (harness, agg) = harness_with(ConflictPolicy::ClientWins);
    let other = harness.second_device();
    other.pull_workspaces().unwrap();

    rename(other.local(), &agg.request, "from other", 20_000);
    other.push_aggregate(&agg.request).unwrap();

    rename(&harness.local, &agg.request, "from here", 10_000);
    let report = harness.sync.push_aggregate(&agg.request).unwrap();
    assert!(report.written.contains(&agg.request));

    let zone = zone_of(&agg.workspace).unwrap();
    let remote = harness
        .remote
        .fetch_record(&record_name(&agg.request, &zone))
        .unwrap()
        .unwrap();
    assert_eq!(remote.text("name"), "from here");
}

#[test]
fn push_conflict_manual_surfaces_error() {
    let (harness, agg) = harness_with(ConflictPolicy::Manual);
    let other = harness.second_device();
    other.pull_workspaces().unwrap();

    rename(other.local(), &agg.request, "from other", 20_000);
    other.push_aggregate(&agg.request).unwrap();

    rename(&harness.local, &agg.request, "from here", 10_000);
    let err = harness.sync.push_aggregate(&agg.request).unwrap_err();
    assert!(matches!(err, SyncError::RecordConflict(_)));
    assert_eq!(request_name(&harness.local, &agg.request), "from here");
    assert!(!is_synced(&harness.local, &agg.request));
}

#[test]
fn pull_conflict_follows_policy() {
    for (policy, expected) in [
        (ConflictPolicy::VersionThenModified, "from other"),
        (ConflictPolicy::ClientWins, "from here"),
        (ConflictPolicy::Manual, "from here"),
    ] {
        let (harness, agg) = harness_with(policy);
        let other = harness.second_device();
        other.pull_workspaces().unwrap();
        rename(other.local(), &agg.request, "from other", 20_000);
        other.push_aggregate(&agg.request).unwrap();

        rename(&harness.local, &agg.request, "from here", 10_000);
        let report = harness.sync.pull_zone(&agg.workspace).unwrap();
        assert_eq!(request_name(&harness.local, &agg.request), expected, "{policy:?}");
        match policy {
            ConflictPolicy::ClientWins => assert_eq!(report.kept_local, 1),
            ConflictPolicy::Manual => assert_eq!(report.conflicts.len(), 1),
            _ => assert!(is_synced(&harness.local, &agg.request)),
        }
    }
}

#[test]
fn missing_zone_without_retry_fails() {
    let harness = SyncHarness::with_config(
        SyncConfig::default()
            .with_zone_retry_attempts(0)
            .with_retry(RetryConfig::no_retry()),
    );
    let agg = aggregate(&harness.local);
    let err = harness.sync.push_aggregate(&agg.env).unwrap_err();
    assert!(matches!(err, SyncError::ZoneMissing { .. }));
    assert!(!is_synced(&harness.local, &agg.env));
}

#[test]
fn transient_errors_are_retried() {
    let retry = RetryConfig::new(3)
        .with_initial_delay(Duration::from_millis(1))
        .without_jitter();
    let harness = SyncHarness::with_config(SyncConfig::default().with_retry(retry));
    let agg = aggregate(&harness.local);

    harness.remote.set_connected(false);
    let err = harness.sync.push_aggregate(&agg.env).unwrap_err();
    assert!(err.is_retryable());
    assert_eq!(harness.sync.stats().retries, 2);

    harness.remote.set_connected(true);
    harness.sync.push_aggregate(&agg.env).unwrap();
    assert!(is_synced(&harness.local, &agg.var));
}

#[test]
fn failed_save_leaves_entities_dirty() {
    let (harness, agg) = scenarios::populated();
    harness.sync.push_aggregate(&agg.env).unwrap();
    rename(&harness.local, &agg.request, "renamed", 0);

    harness.remote.fail_next_saves(1);
    let err = harness.sync.push_aggregate(&agg.request).unwrap_err();
    assert!(matches!(err, SyncError::SaveFailure { .. }));
    assert!(!is_synced(&harness.local, &agg.request));

    harness.sync.push_aggregate(&agg.request).unwrap();
    assert!(is_synced(&harness.local, &agg.request));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(8))]

    #[test]
    fn generated_workspaces_round_trip(shape in workspace_shape_strategy()) {
        let harness = SyncHarness::new();
        let (_ws, roots) = build_workspace(&harness.local, &shape);
        for root in &roots {
            harness.sync.push_aggregate(root).unwrap();
        }

        let other = harness.second_device();
        other.pull_workspaces().unwrap();
        let local = harness.local.read(|g| {
            let mut vars: Vec<(String, String)> = g
                .all::<EnvVar>(false)
                .into_iter()
                .map(|v| (v.name.clone(), v.value.clone()))
                .collect();
            vars.sort();
            (g.all::<RequestData>(false).len(), vars)
        });
        let pulled = other.local().read(|g| {
            let mut vars: Vec<(String, String)> = g
                .all::<EnvVar>(false)
                .into_iter()
                .map(|v| (v.name.clone(), v.value.clone()))
                .collect();
            vars.sort();
            (g.all::<RequestData>(false).len(), vars)
        });
        prop_assert_eq!(local, pulled);
    }
}
