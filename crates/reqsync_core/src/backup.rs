//! Backup and restore.
//!
//! A backup is one canonical CBOR map:
//!
//! ```text
//! { "magic": "RQSB", "format": 1, "createdAt": <millis>,
//!   "modelVersion": <u32>, "workspaces": [<workspace export>...] }
//! ```
//!
//! Workspaces are stored in their dictionary projection, so attachment
//! bytes are not part of a backup.

use crate::dict::{export_workspace, import_workspace};
use crate::error::{CoreError, CoreResult};
use crate::model::Workspace;
use crate::store::{EntityView, Store};
use crate::time::Timestamp;
use reqsync_codec::{from_cbor, to_canonical_cbor, Value};
use std::fs;
use std::path::Path;
use tracing::info;

const BACKUP_MAGIC: &str = "RQSB";
const BACKUP_FORMAT: i64 = 1;

/// Metadata about a backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupMetadata {
    /// When the backup was created.
    pub created_at: Timestamp,
    /// Model version of the store that wrote it.
    pub model_version: u32,
    /// Number of workspaces.
    pub workspace_count: usize,
}

/// A decoded backup.
#[derive(Debug, Clone, PartialEq)]
pub struct Backup {
    /// Backup metadata.
    pub metadata: BackupMetadata,
    /// Workspace exports.
    pub workspaces: Vec<Value>,
}

/// Encodes every workspace of `store`. Tombstoned workspaces are skipped.
///
/// # Errors
///
/// Fails if encoding fails.
pub fn create_backup(store: &Store) -> CoreResult<Vec<u8>> {
    let workspaces: Vec<Value> = store.read(|g| {
        g.all::<Workspace>(false)
            .into_iter()
            .filter_map(|ws| export_workspace(g, ws.meta.id()))
            .collect()
    });
    let document = Value::empty_map()
        .with("magic", BACKUP_MAGIC)
        .with("format", BACKUP_FORMAT)
        .with("createdAt", Timestamp::now().as_millis())
        .with("modelVersion", store.config().version)
        .with("workspaces", workspaces);
    Ok(to_canonical_cbor(&document)?)
}

/// Decodes a backup produced by [`create_backup`].
///
/// # Errors
///
/// Fails on malformed CBOR, a wrong magic or an unknown format version.
pub fn decode_backup(bytes: &[u8]) -> CoreResult<Backup> {
    let document = from_cbor(bytes)?;
    if document.opt_text("magic").as_deref() != Some(BACKUP_MAGIC) {
        return Err(CoreError::invalid_operation("not a reqsync backup"));
    }
    let format = document.require_integer("format")?;
    if format != BACKUP_FORMAT {
        return Err(CoreError::invalid_operation(format!(
            "unsupported backup format {format}"
        )));
    }
    let workspaces = document.array_or_empty("workspaces").to_vec();
    Ok(Backup {
        metadata: BackupMetadata {
            created_at: Timestamp::from_millis(document.require_integer("createdAt")?),
            model_version: u32::try_from(document.integer_or("modelVersion", 1)).unwrap_or(1),
            workspace_count: workspaces.len(),
        },
        workspaces,
    })
}

/// Writes a backup of `store` to `path`.
///
/// # Errors
///
/// Fails on encoding or I/O errors.
pub fn write_backup(store: &Store, path: &Path) -> CoreResult<BackupMetadata> {
    let bytes = create_backup(store)?;
    fs::write(path, &bytes)?;
    let backup = decode_backup(&bytes)?;
    info!(path = %path.display(), workspaces = backup.metadata.workspace_count, "backup written");
    Ok(backup.metadata)
}

/// Reads a backup file.
///
/// # Errors
///
/// Fails on I/O or decoding errors.
pub fn read_backup(path: &Path) -> CoreResult<Backup> {
    decode_backup(&fs::read(path)?)
}

/// Imports every workspace of `backup` into `store` in one transaction.
/// Returns the number of workspaces restored.
///
/// # Errors
///
/// Fails, restoring nothing, if any workspace cannot be imported.
pub fn restore(store: &Store, backup: &Backup) -> CoreResult<usize> {
    let count = store.transaction(|txn| {
        for workspace in &backup.workspaces {
            import_workspace(txn, workspace)?;
        }
        Ok(backup.workspaces.len())
    })?;
    info!(workspaces = count, "backup restored");
    Ok(count)
}
