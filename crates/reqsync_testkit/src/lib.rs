//! # reqsync testkit
//!
//! Shared fixtures and property-test generators for the reqsync crates.
//!
//! This crate provides:
//! - A fully populated workspace aggregate to sync and diff against
//! - A sync harness pairing a local store with an in-memory record store
//! - Proptest strategies for entity fields and workspace shapes

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

pub use fixtures::*;
pub use generators::*;

/// Re-exports for convenient test setup.
pub mod prelude {
    pub use crate::fixtures::{aggregate, synced_store, workspace, Aggregate, SyncHarness};
    pub use crate::generators::*;
    pub use reqsync_core::{Backend, Config, EntityKind, Store, TypedId};
    pub use reqsync_sync_engine::{MemoryRecordStore, RecordStore, SyncConfig, SyncOrchestrator};
}
