//! Test fixtures for stores, aggregates and sync harnesses.

use reqsync_core::crypto::{EncryptionKey, FieldCipher};
use reqsync_core::{
    Backend, BodyKind, Config, DataKind, EntityKind, Env, EnvVar, FieldFormat, Request,
    RequestBodyData, RequestData, RequestMethod, Store, TypedId, Workspace,
};
use reqsync_sync_engine::{
    AssetStager, MemoryRecordStore, RecordCodec, RetryConfig, SyncConfig, SyncOrchestrator,
};
use std::sync::Arc;
use tempfile::TempDir;

/// Creates an empty store on the synced back-end.
pub fn synced_store() -> Arc<Store> {
    Arc::new(Store::new(Backend::Synced, Config::default()))
}

/// Creates a sync-enabled, active workspace named `name`.
pub fn workspace(store: &Store, name: &str) -> TypedId {
    let id = TypedId::mint(EntityKind::Workspace);
    store
        .transaction(|txn| {
            let ws = txn.create_or_get(&id, &id, |m| Workspace::new(m, name))?;
            ws.is_sync_enabled = true;
            ws.is_active = true;
            Ok(())
        })
        .expect("Failed to create workspace");
    id
}

/// Ids of a populated workspace aggregate.
#[derive(Debug, Clone)]
pub struct Aggregate {
    /// The workspace.
    pub workspace: TypedId,
    /// A project with the default methods.
    pub project: TypedId,
    /// A POST request in the project.
    pub request: TypedId,
    /// The request's selected method.
    pub method: TypedId,
    /// An `Accept` header.
    pub header: TypedId,
    /// A `page` query param.
    pub param: TypedId,
    /// The request body, set to form.
    pub body: TypedId,
    /// A text form field.
    pub form_text: TypedId,
    /// A file form field.
    pub form_file: TypedId,
    /// The file attached to `form_file`.
    pub file: TypedId,
    /// An environment.
    pub env: TypedId,
    /// A variable of `env`.
    pub var: TypedId,
}

impl Aggregate {
    /// Every id of the aggregate, owners first. Default methods other than
    /// `method` are not included.
    pub fn ids(&self) -> Vec<TypedId> {
        vec![
            self.workspace.clone(),
            self.project.clone(),
            self.method.clone(),
            self.request.clone(),
            self.header.clone(),
            self.param.clone(),
            self.body.clone(),
            self.form_text.clone(),
            self.form_file.clone(),
            self.file.clone(),
            self.env.clone(),
            self.var.clone(),
        ]
    }
}

/// Bytes attached to the aggregate's file.
pub const FILE_BYTES: &[u8] = b"\x89PNG fixture";

/// Populates a new sync-enabled workspace in `store`.
pub fn aggregate(store: &Store) -> Aggregate {
    let ws = workspace(store, "Team");
    let request = TypedId::mint(EntityKind::Request);
    let header = TypedId::mint(EntityKind::RequestData);
    let param = TypedId::mint(EntityKind::RequestData);
    let body = TypedId::mint(EntityKind::RequestBodyData);
    let form_text = TypedId::mint(EntityKind::RequestData);
    let form_file = TypedId::mint(EntityKind::RequestData);
    let env = TypedId::mint(EntityKind::Env);
    let var = TypedId::mint(EntityKind::EnvVar);

    let (project, method, file) = store
        .transaction(|txn| {
            let project = txn.create_project(&ws, "API")?;
            let method = RequestMethod::default_id(&project, "POST");

            let owner = project.clone();
            let rq = txn.create_or_get(&request, &ws, |m| Request::new(m, owner))?;
            rq.name = "Create user".into();
            rq.url = "https://api.example.com/users".into();
            rq.method_id = Some(method.clone());
            rq.selected_method_index = 1;

            let owner = request.clone();
            txn.create_or_get(&header, &ws, |m| {
                RequestData::new(m, owner, DataKind::Header, "Accept", "application/json")
            })?;
            let owner = request.clone();
            txn.create_or_get(&param, &ws, |m| {
                RequestData::new(m, owner, DataKind::Param, "page", "1")
            })?;
            let owner = request.clone();
            let b = txn.create_or_get(&body, &ws, |m| RequestBodyData::new(m, owner))?;
            b.selected = BodyKind::Form;

            let owner = body.clone();
            txn.create_or_get(&form_text, &ws, |m| {
                RequestData::new(m, owner, DataKind::Form, "name", "ada")
            })?;
            let owner = body.clone();
            let f = txn.create_or_get(&form_file, &ws, |m| {
                RequestData::new(m, owner, DataKind::Form, "avatar", "")
            })?;
            f.format = FieldFormat::File;
            let file = txn.attach_file(&form_file, &ws, "avatar.png", FILE_BYTES.to_vec())?;

            txn.create_or_get(&env, &ws, |m| Env::new(m, "dev"))?;
            let owner = env.clone();
            txn.create_or_get(&var, &ws, |m| EnvVar::new(m, owner, "token", "s3cr3t"))?;
            Ok((project, method, file))
        })
        .expect("Failed to populate aggregate");

    Aggregate {
        workspace: ws,
        project,
        request,
        method,
        header,
        param,
        body,
        form_text,
        form_file,
        file,
        env,
        var,
    }
}

/// A local store wired to an in-memory record store.
///
/// Asset files live in a temp dir that is removed on drop.
pub struct SyncHarness {
    /// The local store.
    pub local: Arc<Store>,
    /// The remote store.
    pub remote: Arc<MemoryRecordStore>,
    /// The orchestrator between them.
    pub sync: SyncOrchestrator<MemoryRecordStore>,
    key: EncryptionKey,
    assets: TempDir,
}

impl SyncHarness {
    /// Creates a harness with default config and no transport retries.
    pub fn new() -> Self {
        Self::with_config(SyncConfig::default().with_retry(RetryConfig::no_retry()))
    }

    /// Creates a harness with `config`. The asset dir is always the
    /// harness's own temp dir.
    pub fn with_config(config: SyncConfig) -> Self {
        let assets = TempDir::new().expect("Failed to create asset dir");
        let remote = Arc::new(MemoryRecordStore::with_stager(AssetStager::new(Some(
            assets.path().to_path_buf(),
        ))));
        let key = EncryptionKey::generate();
        let sync = Self::orchestrator(synced_store(), &remote, &key, &assets, config);
        Self {
            local: Arc::clone(sync.local()),
            remote,
            sync,
            key,
            assets,
        }
    }

    /// Creates a second device sharing this harness's remote store and key,
    /// with an empty local store.
    pub fn second_device(&self) -> SyncOrchestrator<MemoryRecordStore> {
        Self::orchestrator(
            synced_store(),
            &self.remote,
            &self.key,
            &self.assets,
            self.sync.config().clone(),
        )
    }

    /// Number of files currently in the asset dir.
    pub fn staged_assets(&self) -> usize {
        std::fs::read_dir(self.assets.path())
            .map(|entries| entries.count())
            .unwrap_or(0)
    }

    fn orchestrator(
        local: Arc<Store>,
        remote: &Arc<MemoryRecordStore>,
        key: &EncryptionKey,
        assets: &TempDir,
        config: SyncConfig,
    ) -> SyncOrchestrator<MemoryRecordStore> {
        let config = config.with_asset_dir(assets.path());
        let stager = AssetStager::new(config.asset_dir.clone());
        let codec = RecordCodec::new(FieldCipher::new(key), stager);
        SyncOrchestrator::new(local, Arc::clone(remote), codec, config)
    }
}

impl Default for SyncHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Common scenarios.
pub mod scenarios {
    use super::*;

    /// A harness whose local store holds one populated aggregate.
    pub fn populated() -> (SyncHarness, Aggregate) {
        let harness = SyncHarness::new();
        let agg = aggregate(&harness.local);
        (harness, agg)
    }

    /// A populated aggregate already pushed to the remote store.
    pub fn pushed() -> (SyncHarness, Aggregate) {
        let (harness, agg) = populated();
        harness
            .sync
            .push_aggregate(&agg.request)
            .expect("Failed to push request");
        harness
            .sync
            .push_aggregate(&agg.env)
            .expect("Failed to push env");
        (harness, agg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::{EntityView, File};

    #[test]
    fn aggregate_is_complete() {
        let store = synced_store();
        let agg = aggregate(&store);
        store.read(|g| {
            for id in agg.ids() {
                assert!(g.exists(&id), "{id} missing");
            }
            assert_eq!(g.get::<File>(&agg.file).unwrap().data, FILE_BYTES);
        });
    }

    #[test]
    fn harness_devices_share_remote() {
        let harness = SyncHarness::new();
        let other = harness.second_device();
        assert!(Arc::ptr_eq(harness.sync.remote(), other.remote()));
        assert!(other.local().is_empty());
    }
}
