//! Conversion between local entities and remote records.
//!
//! Scalar fields follow the dictionary projection, so a record carries the
//! same keys as a backup entry. On top of that a record gets a cascading
//! `parent` reference, the `ancestors` chain (ids from the workspace down
//! to the parent) that lets ingestion stub missing owners, sealed values
//! for fields that must leave the device encrypted, and asset fields for
//! blobs.

use crate::asset::AssetStager;
use crate::error::{SyncError, SyncResult};
use reqsync_codec::Value;
use reqsync_core::crypto::FieldCipher;
use reqsync_core::{
    record_name, zone_of, AnyEntity, CoreError, CoreResult, DataKind, Dictionary, Entity,
    EntityKind, EntityView, Env, EnvVar, File, History, Image, Project, Request,
    RequestBodyData, RequestData, RequestMethod, Transaction, TypedId, Workspace,
};
use reqsync_record::{Field, Record, ReferenceAction};
use tracing::trace;

/// Reference to the owning record.
pub const PARENT_FIELD: &str = "parent";
/// Ids of all owners, outermost first.
pub const ANCESTORS_FIELD: &str = "ancestors";
/// Non-owning reference from a request to its selected method.
pub const METHOD_FIELD: &str = "method";

const SEALED_ENV_VALUE: &str = "value";
const SEALED_COOKIES: &str = "cookies";
const ASSET_DATA: &str = "data";
const ASSET_RESPONSE: &str = "response";

/// Converts entities to records and back.
#[derive(Debug)]
pub struct RecordCodec {
    cipher: FieldCipher,
    assets: AssetStager,
}

impl RecordCodec {
    /// Creates a codec sealing fields with `cipher` and staging blobs
    /// through `assets`.
    pub fn new(cipher: FieldCipher, assets: AssetStager) -> Self {
        Self { cipher, assets }
    }

    /// The stager holding this codec's asset files.
    pub fn assets(&self) -> &AssetStager {
        &self.assets
    }

    /// Builds the record of `entity`.
    ///
    /// `parent` must be the already resolved record of the entity's owner;
    /// workspaces take none. Blob staging failures are logged and leave the
    /// field out.
    ///
    /// # Errors
    ///
    /// Fails if the parent record is missing or belongs to another entity,
    /// or if sealing a field fails.
    pub fn to_record(&self, entity: &AnyEntity, parent: Option<&Record>) -> SyncResult<Record> {
        let meta = entity.meta();
        let zone = zone_of(meta.workspace_id())?;
        let mut record = Record::for_kind(entity.kind(), record_name(meta.id(), &zone));

        if let Some(fields) = scalar_fields(entity).as_map() {
            for (name, value) in fields {
                record.set(name.clone(), value.clone());
            }
        }

        match (entity.parent_id(), parent) {
            (None, _) => record.set(ANCESTORS_FIELD, Value::Array(Vec::new())),
            (Some(parent_id), Some(parent)) if parent.key.name == parent_id.as_str() => {
                let mut chain = parent
                    .value(ANCESTORS_FIELD)
                    .and_then(Value::as_array)
                    .map(<[Value]>::to_vec)
                    .unwrap_or_default();
                chain.push(Value::from(parent_id.as_str()));
                record.set(ANCESTORS_FIELD, chain);
                record.set_reference(PARENT_FIELD, parent.key.clone(), ReferenceAction::Cascade);
            }
            (Some(parent_id), _) => {
                return Err(CoreError::invalid_operation(format!(
                    "record of {parent_id} must be resolved before {}",
                    meta.id()
                ))
                .into());
            }
        }

        match entity {
            AnyEntity::Request(e) => {
                if let Some(method_id) = &e.method_id {
                    record.set_reference(
                        METHOD_FIELD,
                        record_name(method_id, &zone),
                        ReferenceAction::None,
                    );
                }
            }
            AnyEntity::EnvVar(e) => {
                let sealed = self.cipher.seal_text(SEALED_ENV_VALUE, &e.value)?;
                record.set(SEALED_ENV_VALUE, Value::Bytes(sealed));
            }
            AnyEntity::History(e) => {
                if !e.cookies.is_empty() {
                    let sealed = self.cipher.seal(SEALED_COOKIES, &e.cookies)?;
                    record.set(SEALED_COOKIES, Value::Bytes(sealed));
                }
                self.assets.attach(&mut record, ASSET_RESPONSE, &e.response);
            }
            AnyEntity::File(e) => self.assets.attach(&mut record, ASSET_DATA, &e.data),
            AnyEntity::Image(e) => self.assets.attach(&mut record, ASSET_DATA, &e.data),
            _ => {}
        }

        trace!(record = %record.key, kind = %entity.kind(), "entity encoded");
        Ok(record)
    }

    /// Ingests `record` into `txn` and returns the entity id.
    ///
    /// The entity is stored as synced, replacing any local copy with the
    /// same id. Owners that have not arrived yet are created as empty stubs
    /// along the record's ancestor chain; the real records fill them in
    /// later. Asset files referenced by the record are consumed.
    ///
    /// # Errors
    ///
    /// Fails on malformed ids, zone tombstones, foreign record types,
    /// missing required fields, and sealed values that do not open.
    pub fn from_record(&self, record: &Record, txn: &mut Transaction<'_>) -> SyncResult<TypedId> {
        let kind = record.kind()?;
        let id = record.entity_id()?;
        id.expect_kind(kind)?;
        let mut dict = record_dict(record);
        let workspace_id = match dict.opt_text("wsId") {
            Some(raw) => TypedId::parse(&raw)?,
            None => {
                let ws = record.key.zone.workspace_id().ok_or_else(|| {
                    CoreError::invalid_operation(format!("{} names no workspace", record.key))
                })?;
                dict.insert("wsId", ws.as_str());
                ws
            }
        };

        if let Some(owner) = owner_of(record, kind, &workspace_id)? {
            ensure_owners(txn, record, &workspace_id, &owner)?;
        }

        match kind {
            EntityKind::Workspace => ingest::<Workspace>(txn, &dict, |_| Ok(()))?,
            EntityKind::Project => ingest::<Project>(txn, &dict, |_| Ok(()))?,
            EntityKind::RequestMethod => ingest::<RequestMethod>(txn, &dict, |_| Ok(()))?,
            EntityKind::Request => ingest::<Request>(txn, &dict, |e| {
                if e.method_id.is_none() {
                    e.method_id = record
                        .reference(METHOD_FIELD)
                        .map(|r| r.key.entity_id())
                        .transpose()?;
                }
                Ok(())
            })?,
            EntityKind::RequestBodyData => ingest::<RequestBodyData>(txn, &dict, |_| Ok(()))?,
            EntityKind::RequestData => ingest::<RequestData>(txn, &dict, |_| Ok(()))?,
            EntityKind::File => ingest::<File>(txn, &dict, |e| {
                e.data = self.assets.detach(record, ASSET_DATA);
                Ok(())
            })?,
            EntityKind::Image => ingest::<Image>(txn, &dict, |e| {
                e.data = self.assets.detach(record, ASSET_DATA);
                Ok(())
            })?,
            EntityKind::History => ingest::<History>(txn, &dict, |e| {
                if let Some(sealed) = record.bytes(SEALED_COOKIES) {
                    e.cookies = self.cipher.open(SEALED_COOKIES, sealed)?;
                }
                e.response = self.assets.detach(record, ASSET_RESPONSE);
                Ok(())
            })?,
            EntityKind::Env => ingest::<Env>(txn, &dict, |_| Ok(()))?,
            EntityKind::EnvVar => ingest::<EnvVar>(txn, &dict, |e| {
                e.value = match record.bytes(SEALED_ENV_VALUE) {
                    Some(sealed) => self.cipher.open_text(SEALED_ENV_VALUE, sealed)?,
                    None => String::new(),
                };
                Ok(())
            })?,
            EntityKind::Zone => {
                return Err(reqsync_record::RecordError::UnknownRecordType {
                    name: record.record_type.clone(),
                }
                .into());
            }
        }

        trace!(record = %record.key, %kind, "record ingested");
        Ok(id)
    }
}

/// Ids of the record's owners, outermost first, as recorded at encoding.
pub fn ancestors(record: &Record) -> Vec<TypedId> {
    record
        .value(ANCESTORS_FIELD)
        .and_then(Value::as_array)
        .unwrap_or(&[])
        .iter()
        .filter_map(Value::as_text)
        .filter_map(|raw| TypedId::parse(raw).ok())
        .collect()
}

/// Ids of `root`'s owners, outermost first.
pub fn owner_chain<V: EntityView>(view: &V, root: &TypedId) -> Vec<TypedId> {
    let mut chain = Vec::new();
    let mut cursor = view.get_any(root).and_then(|e| e.parent_id().cloned());
    while let Some(id) = cursor {
        cursor = view.get_any(&id).and_then(|e| e.parent_id().cloned());
        chain.push(id);
    }
    chain.reverse();
    chain
}

fn scalar_fields(entity: &AnyEntity) -> Value {
    match entity {
        AnyEntity::Workspace(e) => e.to_dict(),
        AnyEntity::Project(e) => e.to_dict(),
        AnyEntity::RequestMethod(e) => e.to_dict(),
        AnyEntity::Request(e) => e.to_dict(),
        AnyEntity::RequestBodyData(e) => e.to_dict(),
        AnyEntity::RequestData(e) => e.to_dict(),
        AnyEntity::File(e) => e.to_dict(),
        AnyEntity::Image(e) => e.to_dict(),
        AnyEntity::History(e) => e.to_dict(),
        AnyEntity::Env(e) => e.to_dict(),
        AnyEntity::EnvVar(e) => e.to_dict(),
    }
}

fn record_dict(record: &Record) -> Value {
    record
        .fields
        .iter()
        .filter_map(|(name, field)| match field {
            Field::Value(v) => Some((name.clone(), v.clone())),
            _ => None,
        })
        .collect()
}

/// The id of the record's direct owner, read from the type's owner field
/// and falling back to the parent reference.
fn owner_of(record: &Record, kind: EntityKind, workspace_id: &TypedId) -> SyncResult<Option<TypedId>> {
    let field = match kind {
        EntityKind::Workspace | EntityKind::Zone => return Ok(None),
        EntityKind::Project | EntityKind::Env => return Ok(Some(workspace_id.clone())),
        EntityKind::RequestMethod | EntityKind::Request => "projectId",
        EntityKind::RequestBodyData | EntityKind::History => "requestId",
        EntityKind::RequestData => "ownerId",
        EntityKind::File | EntityKind::Image => "dataId",
        EntityKind::EnvVar => "envId",
    };
    if let Some(raw) = record.opt_text(field) {
        return Ok(Some(TypedId::parse(raw)?));
    }
    let reference = record.require_reference(PARENT_FIELD)?;
    Ok(Some(reference.key.entity_id()?))
}

fn ensure_owners(
    txn: &mut Transaction<'_>,
    record: &Record,
    workspace_id: &TypedId,
    owner: &TypedId,
) -> SyncResult<()> {
    if txn.exists(owner) {
        return Ok(());
    }
    let mut chain = ancestors(record);
    if chain.last() != Some(owner) {
        chain.push(owner.clone());
    }
    let mut parent: Option<TypedId> = None;
    for id in chain {
        if !txn.exists(&id) {
            create_stub(txn, &id, workspace_id, parent.as_ref())?;
        }
        parent = Some(id);
    }
    Ok(())
}

fn create_stub(
    txn: &mut Transaction<'_>,
    id: &TypedId,
    workspace_id: &TypedId,
    parent: Option<&TypedId>,
) -> SyncResult<()> {
    let owner = || {
        parent.cloned().ok_or_else(|| {
            SyncError::from(CoreError::invalid_operation(format!("no owner known for stub {id}")))
        })
    };
    trace!(%id, "creating stub owner");
    match id.kind() {
        EntityKind::Workspace => {
            txn.create_or_get(id, workspace_id, |meta| Workspace::new(meta, ""))?;
        }
        EntityKind::Project => {
            txn.create_or_get(id, workspace_id, |meta| Project::new(meta, ""))?;
        }
        EntityKind::Env => {
            txn.create_or_get(id, workspace_id, |meta| Env::new(meta, ""))?;
        }
        EntityKind::RequestMethod => {
            let owner = owner()?;
            txn.create_or_get(id, workspace_id, |meta| RequestMethod::new(meta, owner, ""))?;
        }
        EntityKind::Request => {
            let owner = owner()?;
            txn.create_or_get(id, workspace_id, |meta| Request::new(meta, owner))?;
        }
        EntityKind::RequestBodyData => {
            let owner = owner()?;
            txn.create_or_get(id, workspace_id, |meta| RequestBodyData::new(meta, owner))?;
        }
        EntityKind::RequestData => {
            let owner = owner()?;
            let kind = if owner.kind() == EntityKind::RequestBodyData {
                DataKind::Form
            } else {
                DataKind::Header
            };
            txn.create_or_get(id, workspace_id, |meta| RequestData::new(meta, owner, kind, "", ""))?;
        }
        EntityKind::File
        | EntityKind::Image
        | EntityKind::History
        | EntityKind::EnvVar
        | EntityKind::Zone => {
            return Err(CoreError::invalid_operation(format!("{id} cannot own other entities")).into());
        }
    }
    Ok(())
}

fn ingest<E: Dictionary>(
    txn: &mut Transaction<'_>,
    dict: &Value,
    fill: impl FnOnce(&mut E) -> SyncResult<()>,
) -> SyncResult<()> {
    let mut entity = E::from_dict(dict)?;
    fill(&mut entity)?;
    entity.meta_mut().is_synced = true;
    replace(txn, entity)?;
    Ok(())
}

/// Stores `entity` as is, remote timestamps included.
fn replace<E: Entity>(txn: &mut Transaction<'_>, entity: E) -> CoreResult<()> {
    let id = entity.id().clone();
    match txn.get_mut::<E>(&id) {
        Some(slot) => *slot = entity,
        None => {
            txn.upsert(entity)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::crypto::EncryptionKey;
    use reqsync_core::{Backend, Config, Meta, Store, Timestamp};

    fn codec() -> RecordCodec {
        RecordCodec::new(FieldCipher::new(&EncryptionKey::generate()), AssetStager::default())
    }

    fn meta(kind: EntityKind, ws: &TypedId) -> Meta {
        Meta::new(TypedId::mint(kind), ws.clone(), Timestamp::from_millis(1_000), 2)
    }

    fn workspace_record(codec: &RecordCodec, ws: &TypedId) -> Record {
        let workspace = Workspace::new(Meta::new(ws.clone(), ws.clone(), Timestamp::from_millis(1), 1), "Team");
        codec.to_record(&workspace.into_any(), None).unwrap()
    }

    #[test]
    fn request_roundtrip_keeps_scalars() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let project = Project::new(meta(EntityKind::Project, &ws), "API");
        let mut request = Request::new(meta(EntityKind::Request, &ws), project.meta.id().clone());
        request.name = "List users".into();
        request.desc = "paged".into();
        request.url = "https://example.com/users".into();
        request.selected_method_index = 3;
        request.method_id = Some(RequestMethod::default_id(project.meta.id(), "PUT"));
        request.validate_ssl = false;
        request.meta.mark_for_delete = true;

        let ws_record = workspace_record(&codec, &ws);
        let pj_record = codec.to_record(&project.clone().into_any(), Some(&ws_record)).unwrap();
        let rq_record = codec.to_record(&request.clone().into_any(), Some(&pj_record)).unwrap();
        assert_eq!(ancestors(&rq_record), vec![ws.clone(), project.meta.id().clone()]);
        assert_eq!(rq_record.reference(METHOD_FIELD).unwrap().action, ReferenceAction::None);
        assert_eq!(rq_record.reference(PARENT_FIELD).unwrap().action, ReferenceAction::Cascade);

        let store = Store::new(Backend::Synced, Config::default());
        let decoded = store
            .transaction(|txn| {
                let id = codec.from_record(&rq_record, txn).map_err(|e| CoreError::invalid_operation(e.to_string()))?;
                Ok(txn.get::<Request>(&id).cloned().unwrap())
            })
            .unwrap();

        let mut expected = request;
        expected.meta.is_synced = true;
        assert_eq!(decoded, expected);
    }

    #[test]
    fn out_of_order_delivery_creates_stubs() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let project = Project::new(meta(EntityKind::Project, &ws), "API");
        let request = Request::new(meta(EntityKind::Request, &ws), project.meta.id().clone());
        let body = RequestBodyData::new(meta(EntityKind::RequestBodyData, &ws), request.meta.id().clone());
        let field = RequestData::new(meta(EntityKind::RequestData, &ws), body.meta.id().clone(), DataKind::Form, "k", "v");

        let ws_record = workspace_record(&codec, &ws);
        let pj_record = codec.to_record(&project.clone().into_any(), Some(&ws_record)).unwrap();
        let rq_record = codec.to_record(&request.clone().into_any(), Some(&pj_record)).unwrap();
        let rb_record = codec.to_record(&body.clone().into_any(), Some(&rq_record)).unwrap();
        let rd_record = codec.to_record(&field.clone().into_any(), Some(&rb_record)).unwrap();

        let store = Store::new(Backend::Synced, Config::default());
        store
            .transaction(|txn| {
                codec.from_record(&rd_record, txn).map_err(|e| CoreError::invalid_operation(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        assert_eq!(store.len(), 5);
        store.read(|g| {
            assert_eq!(g.get::<Project>(project.meta.id()).unwrap().name, "");
            assert!(!g.get::<Project>(project.meta.id()).unwrap().is_synced());
            assert_eq!(g.get::<RequestData>(field.meta.id()).unwrap().key, "k");
        });

        // The real project fills in its stub.
        store
            .transaction(|txn| {
                codec.from_record(&pj_record, txn).map_err(|e| CoreError::invalid_operation(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        store.read(|g| {
            let stored = g.get::<Project>(project.meta.id()).unwrap();
            assert_eq!(stored.name, "API");
            assert_eq!(stored.created(), project.created());
            assert!(stored.is_synced());
        });
    }

    #[test]
    fn env_values_leave_encrypted() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let env = Env::new(meta(EntityKind::Env, &ws), "prod");
        let var = EnvVar::new(meta(EntityKind::EnvVar, &ws), env.meta.id().clone(), "TOKEN", "s3cret");

        let ws_record = workspace_record(&codec, &ws);
        let en_record = codec.to_record(&env.into_any(), Some(&ws_record)).unwrap();
        let ev_record = codec.to_record(&var.clone().into_any(), Some(&en_record)).unwrap();

        let sealed = ev_record.bytes("value").unwrap();
        assert!(!sealed.windows(6).any(|w| w == b"s3cret"));
        assert_eq!(ev_record.text("name"), "TOKEN");

        let store = Store::new(Backend::Synced, Config::default());
        store
            .transaction(|txn| {
                codec.from_record(&ev_record, txn).map_err(|e| CoreError::invalid_operation(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        store.read(|g| assert_eq!(g.get::<EnvVar>(var.meta.id()).unwrap().value, "s3cret"));
    }

    #[test]
    fn wrong_key_fails_ingestion() {
        let ws = TypedId::mint(EntityKind::Workspace);
        let env_id = TypedId::mint(EntityKind::Env);
        let sender = codec();
        let receiver = codec();
        let env = Env::new(Meta::new(env_id.clone(), ws.clone(), Timestamp::from_millis(1), 1), "e");
        let var = EnvVar::new(meta(EntityKind::EnvVar, &ws), env_id, "K", "V");
        let en_record = sender.to_record(&env.into_any(), Some(&workspace_record(&sender, &ws))).unwrap();
        let ev_record = sender.to_record(&var.into_any(), Some(&en_record)).unwrap();

        let store = Store::new(Backend::Synced, Config::default());
        let mut outcome = None;
        let _ = store.transaction(|txn| {
            outcome = Some(receiver.from_record(&ev_record, txn));
            Ok(())
        });
        assert!(matches!(outcome, Some(Err(SyncError::Core(CoreError::DecryptionFailed { .. })))));
    }

    #[test]
    fn blobs_travel_as_assets() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let rq = TypedId::mint(EntityKind::Request);
        let mut history = History::new(meta(EntityKind::History, &ws), rq.clone());
        history.cookies = b"sid=1".to_vec();
        history.response = b"{\"ok\":true}".to_vec();
        let request = Request::new(Meta::new(rq, ws.clone(), Timestamp::from_millis(1), 1), TypedId::mint(EntityKind::Project));
        let pj = Project::new(Meta::new(request.project_id.clone(), ws.clone(), Timestamp::from_millis(1), 1), "p");

        let ws_record = workspace_record(&codec, &ws);
        let pj_record = codec.to_record(&pj.into_any(), Some(&ws_record)).unwrap();
        let rq_record = codec.to_record(&request.into_any(), Some(&pj_record)).unwrap();
        let hs_record = codec.to_record(&history.clone().into_any(), Some(&rq_record)).unwrap();
        assert!(hs_record.asset("response").is_some());
        assert!(hs_record.value("response").is_none());

        let store = Store::new(Backend::Synced, Config::default());
        store
            .transaction(|txn| {
                codec.from_record(&hs_record, txn).map_err(|e| CoreError::invalid_operation(e.to_string()))?;
                Ok(())
            })
            .unwrap();
        store.read(|g| {
            let stored = g.get::<History>(history.meta.id()).unwrap();
            assert_eq!(stored.cookies, history.cookies);
            assert_eq!(stored.response, history.response);
        });
        assert!(!hs_record.asset("response").unwrap().path.exists());
    }

    #[test]
    fn unresolved_parent_is_rejected() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let project = Project::new(meta(EntityKind::Project, &ws), "API");
        assert!(codec.to_record(&project.into_any(), None).is_err());
    }

    #[test]
    fn zone_records_are_not_entities() {
        let codec = codec();
        let ws = TypedId::mint(EntityKind::Workspace);
        let workspace = Workspace::new(Meta::new(ws.clone(), ws.clone(), Timestamp::from_millis(1), 1), "W");
        let zone = reqsync_record::ZoneRecord::for_workspace(&workspace).to_record().unwrap();
        let store = Store::new(Backend::Synced, Config::default());
        let mut outcome = None;
        let _ = store.transaction(|txn| {
            outcome = Some(codec.from_record(&zone, txn));
            Ok(())
        });
        assert!(matches!(outcome, Some(Err(SyncError::Record(_)))));
    }

    #[test]
    fn owner_chain_walks_to_workspace() {
        let store = Store::new(Backend::Local, Config::default());
        let ws = TypedId::mint(EntityKind::Workspace);
        let (project, request) = store
            .transaction(|txn| {
                txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "W"))?;
                let project = txn.create_project(&ws, "P")?;
                let rq = TypedId::mint(EntityKind::Request);
                let owner = project.clone();
                txn.create_or_get(&rq, &ws, |m| Request::new(m, owner))?;
                Ok((project, rq))
            })
            .unwrap();
        let chain = store.read(|g| owner_chain(g, &request));
        assert_eq!(chain, vec![ws.clone(), project]);
        assert!(store.read(|g| owner_chain(g, &ws)).is_empty());
    }
}
