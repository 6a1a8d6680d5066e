//! Dictionary projection of entities.
//!
//! Each entity maps to a flat map of its scalar fields; exports nest the
//! owned children under array or object keys. Binary payloads (file and
//! image bytes, history cookies and responses) are never projected. The same
//! projection backs backup files and edit-session snapshots.

use crate::error::CoreResult;
use crate::id::TypedId;
use crate::model::{
    BodyKind, DataKind, Entity, Env, EnvVar, FieldFormat, File, History, Image, Meta, Project,
    Request, RequestBodyData, RequestData, RequestMethod, Workspace,
};
use crate::store::{EntityView, Transaction};
use crate::time::Timestamp;
use reqsync_codec::{CodecError, Value};

/// Conversion between an entity and its dictionary projection.
pub trait Dictionary: Entity + Sized {
    /// Projects the entity's scalar fields.
    fn to_dict(&self) -> Value;

    /// Rebuilds an entity from its projection. The result is never marked
    /// synced.
    ///
    /// # Errors
    ///
    /// Fails on missing required keys or malformed ids.
    fn from_dict(dict: &Value) -> CoreResult<Self>;
}

fn meta_dict(meta: &Meta) -> Value {
    Value::empty_map()
        .with("id", meta.id().as_str())
        .with("wsId", meta.workspace_id().as_str())
        .with("created", meta.created().as_millis())
        .with("modified", meta.modified().as_millis())
        .with("version", meta.version)
        .with("markForDelete", meta.mark_for_delete)
}

fn meta_from_dict(dict: &Value) -> CoreResult<Meta> {
    let id = id_field(dict, "id")?;
    let workspace_id = id_field(dict, "wsId")?;
    let version = u32::try_from(dict.integer_or("version", 1)).map_err(|_| CodecError::IntegerOverflow)?;
    let mut meta = Meta::restore(
        id,
        workspace_id,
        Timestamp::from_millis(dict.require_integer("created")?),
        Timestamp::from_millis(dict.require_integer("modified")?),
        version,
    );
    meta.mark_for_delete = dict.bool_or("markForDelete", false);
    Ok(meta)
}

fn id_field(dict: &Value, key: &str) -> CoreResult<TypedId> {
    TypedId::parse(dict.require_text(key)?)
}

fn opt_id_field(dict: &Value, key: &str) -> CoreResult<Option<TypedId>> {
    dict.opt_text(key).map(|raw| TypedId::parse(&raw)).transpose()
}

impl Dictionary for Workspace {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("name", &self.name)
            .with("desc", &self.desc)
            .with("isSyncEnabled", self.is_sync_enabled)
            .with("isActive", self.is_active)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            name: dict.text_or_default("name"),
            desc: dict.text_or_default("desc"),
            is_sync_enabled: dict.bool_or("isSyncEnabled", false),
            is_active: dict.bool_or("isActive", false),
        })
    }
}

impl Dictionary for Project {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("name", &self.name)
            .with("desc", &self.desc)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            name: dict.text_or_default("name"),
            desc: dict.text_or_default("desc"),
        })
    }
}

impl Dictionary for RequestMethod {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("projectId", self.project_id.as_str())
            .with("name", &self.name)
            .with("isCustom", self.is_custom)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            project_id: id_field(dict, "projectId")?,
            name: dict.text_or_default("name"),
            is_custom: dict.bool_or("isCustom", true),
        })
    }
}

impl Dictionary for Request {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("projectId", self.project_id.as_str())
            .with("name", &self.name)
            .with("desc", &self.desc)
            .with("url", &self.url)
            .with("selectedMethodIndex", self.selected_method_index)
            .with("methodId", self.method_id.as_ref().map(TypedId::as_str))
            .with("validateSSL", self.validate_ssl)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            project_id: id_field(dict, "projectId")?,
            name: dict.text_or_default("name"),
            desc: dict.text_or_default("desc"),
            url: dict.text_or_default("url"),
            selected_method_index: dict.integer_or("selectedMethodIndex", 0),
            method_id: opt_id_field(dict, "methodId")?,
            validate_ssl: dict.bool_or("validateSSL", true),
        })
    }
}

impl Dictionary for RequestBodyData {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("requestId", self.request_id.as_str())
            .with("selectedIndex", self.selected.index())
            .with("json", &self.json)
            .with("xml", &self.xml)
            .with("raw", &self.raw)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            request_id: id_field(dict, "requestId")?,
            selected: BodyKind::from_index(dict.integer_or("selectedIndex", 0)),
            json: dict.text_or_default("json"),
            xml: dict.text_or_default("xml"),
            raw: dict.text_or_default("raw"),
        })
    }
}

impl Dictionary for RequestData {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("ownerId", self.owner_id.as_str())
            .with("kind", self.kind.as_str())
            .with("key", &self.key)
            .with("value", &self.value)
            .with("desc", &self.desc)
            .with("format", self.format.index())
            .with("disabled", self.disabled)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        let kind_name = dict.require_text("kind")?;
        let kind = DataKind::parse(kind_name)
            .ok_or_else(|| CodecError::invalid_structure(format!("unknown data kind {kind_name:?}")))?;
        Ok(Self {
            meta: meta_from_dict(dict)?,
            owner_id: id_field(dict, "ownerId")?,
            kind,
            key: dict.text_or_default("key"),
            value: dict.text_or_default("value"),
            desc: dict.text_or_default("desc"),
            format: FieldFormat::from_index(dict.integer_or("format", 0)),
            disabled: dict.bool_or("disabled", false),
        })
    }
}

impl Dictionary for File {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("dataId", self.data_id.as_str())
            .with("name", &self.name)
            .with("path", &self.path)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            data_id: id_field(dict, "dataId")?,
            name: dict.text_or_default("name"),
            path: dict.text_or_default("path"),
            data: Vec::new(),
        })
    }
}

impl Dictionary for Image {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("dataId", self.data_id.as_str())
            .with("name", &self.name)
            .with("isCameraPhoto", self.is_camera_photo)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            data_id: id_field(dict, "dataId")?,
            name: dict.text_or_default("name"),
            is_camera_photo: dict.bool_or("isCameraPhoto", false),
            data: Vec::new(),
        })
    }
}

impl Dictionary for History {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("requestId", self.request_id.as_str())
            .with("url", &self.url)
            .with("method", &self.method)
            .with("statusCode", self.status_code)
            .with("elapsedMs", self.elapsed_ms)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            request_id: id_field(dict, "requestId")?,
            url: dict.text_or_default("url"),
            method: dict.text_or_default("method"),
            status_code: dict.integer_or("statusCode", 0),
            elapsed_ms: dict.integer_or("elapsedMs", 0),
            cookies: Vec::new(),
            response: Vec::new(),
        })
    }
}

impl Dictionary for Env {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta).with("name", &self.name)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            name: dict.text_or_default("name"),
        })
    }
}

impl Dictionary for EnvVar {
    fn to_dict(&self) -> Value {
        meta_dict(&self.meta)
            .with("envId", self.env_id.as_str())
            .with("name", &self.name)
            .with("value", &self.value)
    }

    fn from_dict(dict: &Value) -> CoreResult<Self> {
        Ok(Self {
            meta: meta_from_dict(dict)?,
            env_id: id_field(dict, "envId")?,
            name: dict.text_or_default("name"),
            value: dict.text_or_default("value"),
        })
    }
}

fn dicts<E: Dictionary>(items: &[&E]) -> Value {
    Value::Array(items.iter().map(|e| e.to_dict()).collect())
}

/// Exports a request data item with its attachments under `files` and
/// `image`.
pub fn export_data<V: EntityView>(view: &V, data: &RequestData) -> Value {
    let id = data.meta.id();
    let image = view.children::<Image>(id, false).first().map(|i| i.to_dict());
    data.to_dict()
        .with("files", dicts(&view.children::<File>(id, false)))
        .with("image", image)
}

fn export_data_list<V: EntityView>(view: &V, owner: &TypedId, kind: DataKind) -> Value {
    Value::Array(
        view.data_items(owner, kind, false)
            .into_iter()
            .map(|d| export_data(view, d))
            .collect(),
    )
}

/// Exports a request body with its `form`, `multipart` and `binary` items.
pub fn export_body<V: EntityView>(view: &V, body: &RequestBodyData) -> Value {
    let id = body.meta.id();
    let binary = view
        .data_items(id, DataKind::Binary, false)
        .first()
        .map(|d| export_data(view, d));
    body.to_dict()
        .with("form", export_data_list(view, id, DataKind::Form))
        .with("multipart", export_data_list(view, id, DataKind::Multipart))
        .with("binary", binary)
}

/// Exports a request aggregate: headers, params, body, selected method and
/// history metadata.
///
/// Returns `None` if the request does not exist.
pub fn export_request<V: EntityView>(view: &V, request_id: &TypedId) -> Option<Value> {
    let request = view.get::<Request>(request_id)?;
    let method = request
        .method_id
        .as_ref()
        .and_then(|id| view.get::<RequestMethod>(id))
        .map(Dictionary::to_dict);
    let body = view.body_of(request_id).map(|b| export_body(view, b));
    Some(
        request
            .to_dict()
            .with("headers", export_data_list(view, request_id, DataKind::Header))
            .with("params", export_data_list(view, request_id, DataKind::Param))
            .with("body", body)
            .with("method", method)
            .with("history", dicts(&view.children::<History>(request_id, false))),
    )
}

/// Exports the live custom methods of a project.
pub fn export_custom_methods<V: EntityView>(view: &V, project_id: &TypedId) -> Vec<Value> {
    view.children::<RequestMethod>(project_id, false)
        .into_iter()
        .filter(|m| m.is_custom)
        .map(Dictionary::to_dict)
        .collect()
}

/// Exports a project with all methods and requests.
pub fn export_project<V: EntityView>(view: &V, project_id: &TypedId) -> Option<Value> {
    let project = view.get::<Project>(project_id)?;
    let requests: Vec<Value> = view
        .children::<Request>(project_id, false)
        .into_iter()
        .filter_map(|r| export_request(view, r.meta.id()))
        .collect();
    Some(
        project
            .to_dict()
            .with("methods", dicts(&view.children::<RequestMethod>(project_id, false)))
            .with("requests", requests),
    )
}

/// Exports a workspace with its projects and environments.
pub fn export_workspace<V: EntityView>(view: &V, workspace_id: &TypedId) -> Option<Value> {
    let workspace = view.get::<Workspace>(workspace_id)?;
    let projects: Vec<Value> = view
        .children::<Project>(workspace_id, false)
        .into_iter()
        .filter_map(|p| export_project(view, p.meta.id()))
        .collect();
    let envs: Vec<Value> = view
        .children::<Env>(workspace_id, false)
        .into_iter()
        .map(|env| {
            env.to_dict()
                .with("vars", dicts(&view.children::<EnvVar>(env.meta.id(), false)))
        })
        .collect();
    Some(
        workspace
            .to_dict()
            .with("projects", projects)
            .with("envs", envs),
    )
}

fn import_one<E: Dictionary>(txn: &mut Transaction<'_>, dict: &Value) -> CoreResult<TypedId> {
    let entity = E::from_dict(dict)?;
    let id = entity.id().clone();
    txn.upsert(entity)?;
    Ok(id)
}

fn import_data(txn: &mut Transaction<'_>, dict: &Value) -> CoreResult<()> {
    import_one::<RequestData>(txn, dict)?;
    for file in dict.array_or_empty("files") {
        import_one::<File>(txn, file)?;
    }
    if let Some(image) = dict.get("image").filter(|v| !v.is_null()) {
        import_one::<Image>(txn, image)?;
    }
    Ok(())
}

/// Imports a request exported with [`export_request`].
///
/// # Errors
///
/// Fails on malformed dictionaries.
pub fn import_request(txn: &mut Transaction<'_>, dict: &Value) -> CoreResult<TypedId> {
    let id = import_one::<Request>(txn, dict)?;
    for key in ["headers", "params"] {
        for item in dict.array_or_empty(key) {
            import_data(txn, item)?;
        }
    }
    if let Some(body) = dict.get("body").filter(|v| !v.is_null()) {
        import_one::<RequestBodyData>(txn, body)?;
        for key in ["form", "multipart"] {
            for item in body.array_or_empty(key) {
                import_data(txn, item)?;
            }
        }
        if let Some(binary) = body.get("binary").filter(|v| !v.is_null()) {
            import_data(txn, binary)?;
        }
    }
    for entry in dict.array_or_empty("history") {
        import_one::<History>(txn, entry)?;
    }
    Ok(id)
}

/// Imports a workspace exported with [`export_workspace`]. Every imported
/// entity is unsynced.
///
/// # Errors
///
/// Fails on malformed dictionaries or if the result would contain orphans.
pub fn import_workspace(txn: &mut Transaction<'_>, dict: &Value) -> CoreResult<TypedId> {
    let id = import_one::<Workspace>(txn, dict)?;
    for project in dict.array_or_empty("projects") {
        import_one::<Project>(txn, project)?;
        for method in project.array_or_empty("methods") {
            import_one::<RequestMethod>(txn, method)?;
        }
        for request in project.array_or_empty("requests") {
            import_request(txn, request)?;
        }
    }
    for env in dict.array_or_empty("envs") {
        import_one::<Env>(txn, env)?;
        for var in env.array_or_empty("vars") {
            import_one::<EnvVar>(txn, var)?;
        }
    }
    Ok(id)
}
