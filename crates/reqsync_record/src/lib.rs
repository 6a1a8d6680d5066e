//! # reqsync record
//!
//! Remote record schema for reqsync.
//!
//! This crate provides:
//! - `Record` with inline values, references and asset fields
//! - `ZoneRecord` for the per-workspace zone tombstones
//! - `Conflict` and `ConflictPolicy` for rejected writes
//! - CBOR encoding/decoding of records
//!
//! This is a pure schema crate with no I/O operations.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod conflict;
mod error;
mod record;
mod zone_record;

pub use conflict::{Conflict, ConflictPolicy, ConflictResolution};
pub use error::{RecordError, RecordResult};
pub use record::{AssetRef, Field, Record, RecordStamp, Reference, ReferenceAction};
pub use zone_record::ZoneRecord;
