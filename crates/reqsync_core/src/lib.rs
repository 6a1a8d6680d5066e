//! # reqsync core
//!
//! Local entity graph of the REST client's sync engine.
//!
//! This crate provides:
//! - Typed ids whose two-letter tag names the entity type
//! - Zone addressing (one remote partition per workspace)
//! - The entity model and a store with overlay transactions
//! - Child contexts for edit sessions
//! - Cascade delete resolution (direct and tombstone)
//! - Dictionary projection, backup and restore
//! - Field encryption for values that leave the device
//!
//! ## Usage
//!
//! ```
//! use reqsync_core::{Backend, Config, EntityKind, Store, TypedId, Workspace};
//!
//! let store = Store::new(Backend::Local, Config::default());
//! let ws = TypedId::mint(EntityKind::Workspace);
//! store
//!     .transaction(|txn| {
//!         txn.create_or_get(&ws, &ws, |meta| Workspace::new(meta, "Default"))?;
//!         txn.create_project(&ws, "API")?;
//!         Ok(())
//!     })
//!     .unwrap();
//! assert_eq!(store.len(), 7);
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod backup;
pub mod cascade;
mod config;
pub mod crypto;
pub mod dict;
mod error;
mod events;
mod id;
mod model;
mod store;
mod time;
mod zone;

pub use cascade::{cascade, delete, purge, purge_tombstones, DeleteMode};
pub use config::{Config, MODEL_VERSION};
pub use dict::{
    export_custom_methods, export_request, export_workspace, import_workspace, Dictionary,
};
pub use error::{CoreError, CoreResult};
pub use events::{EditEvent, EventBus};
pub use id::{type_of, EntityKind, TypedId};
pub use model::{
    sort_by_created, AnyEntity, BodyKind, DataKind, Entity, Env, EnvVar, FieldFormat, File,
    History, Image, Meta, Project, Request, RequestBodyData, RequestData, RequestMethod,
    Workspace, DEFAULT_METHODS,
};
pub use store::{save_joined, Backend, Changes, ChildContext, EntityView, Graph, Store, Transaction};
pub use time::Timestamp;
pub use zone::{record_name, zone_of, zone_tombstone_key, RecordKey, ZoneHandle, DEFAULT_ZONE_NAME};
