//! CLI command implementations.

pub mod cascade;
pub mod ids;
pub mod inspect;

use reqsync_core::backup::{read_backup, restore};
use reqsync_core::{AnyEntity, Backend, Config, Store};
use std::path::Path;
use tracing::debug;

/// Restores the backup at `path` into a fresh local store.
pub fn load_store(path: &Path) -> Result<Store, Box<dyn std::error::Error>> {
    let backup = read_backup(path)?;
    let store = Store::new(Backend::Local, Config::default());
    let workspaces = restore(&store, &backup)?;
    debug!(path = %path.display(), workspaces, entities = store.len(), "backup loaded");
    Ok(store)
}

/// Short human-readable description of an entity.
pub fn label(entity: &AnyEntity) -> String {
    match entity {
        AnyEntity::Workspace(ws) => ws.name.clone(),
        AnyEntity::Project(p) => p.name.clone(),
        AnyEntity::RequestMethod(m) if m.is_custom => format!("{} (custom)", m.name),
        AnyEntity::RequestMethod(m) => m.name.clone(),
        AnyEntity::Request(r) if r.url.is_empty() => r.name.clone(),
        AnyEntity::Request(r) => format!("{} {}", r.name, r.url),
        AnyEntity::RequestBodyData(b) => format!("{:?}", b.selected),
        AnyEntity::RequestData(d) => format!("{:?} {}", d.kind, d.key),
        AnyEntity::File(f) => format!("{} ({} bytes)", f.name, f.data.len()),
        AnyEntity::Image(i) => format!("{} ({} bytes)", i.name, i.data.len()),
        AnyEntity::History(h) => format!("{} {} -> {}", h.method, h.url, h.status_code),
        AnyEntity::Env(e) => e.name.clone(),
        AnyEntity::EnvVar(v) => v.name.clone(),
    }
}
