//! # reqsync sync engine
//!
//! Moves the synced back-end's entities to and from a partitioned remote
//! record store.
//!
//! This crate provides:
//! - The entity ↔ record codec, with sealed fields and blob assets
//! - A record store abstraction and an in-memory implementation
//! - The orchestrator: aggregate push, zone pull, workspace discovery and
//!   remote workspace deletion
//! - Conflict handling through a configurable policy
//!
//! ## Addressing
//!
//! Each workspace owns one zone holding all of its records. The default
//! zone holds one zone tombstone per workspace; a disabled tombstone tells
//! other devices that the workspace is gone.
//!
//! ## Key Invariants
//!
//! - Owner records are written before the records they own
//! - Ingestion tolerates any delivery order
//! - Environment values and cookie jars never leave the device in clear
//! - A missing zone is created and the write retried once

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod asset;
mod codec;
mod config;
mod error;
mod orchestrator;
mod record_store;

pub use asset::AssetStager;
pub use codec::{ancestors, owner_chain, RecordCodec, ANCESTORS_FIELD, METHOD_FIELD, PARENT_FIELD};
pub use config::{RetryConfig, SyncConfig};
pub use error::{SyncError, SyncResult};
pub use orchestrator::{PullReport, PushReport, SyncOrchestrator, SyncStats};
pub use record_store::{MemoryRecordStore, RecordStore};
