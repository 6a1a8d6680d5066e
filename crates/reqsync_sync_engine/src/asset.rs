//! Temporary files backing external record assets.
//!
//! Blobs do not travel inline. They are written to a temp file whose path
//! goes into the record; on ingestion the file is read back and removed.

use crate::error::{SyncError, SyncResult};
use reqsync_record::Record;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

const ASSET_PREFIX: &str = "reqsync-asset-";

/// Writes and reads asset files.
#[derive(Debug, Clone, Default)]
pub struct AssetStager {
    dir: Option<PathBuf>,
}

impl AssetStager {
    /// Creates a stager using the system temp dir, or `dir` if given.
    pub fn new(dir: Option<PathBuf>) -> Self {
        Self { dir }
    }

    /// Writes `bytes` to a new temp file and returns its path. The file
    /// outlives the stager until [`AssetStager::load`] or
    /// [`AssetStager::discard`] removes it.
    pub fn stage(&self, bytes: &[u8]) -> SyncResult<PathBuf> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(ASSET_PREFIX);
        let mut file = match &self.dir {
            Some(dir) => builder.tempfile_in(dir),
            None => builder.tempfile(),
        }
        .map_err(SyncError::asset_io)?;
        file.write_all(bytes).map_err(SyncError::asset_io)?;
        file.flush().map_err(SyncError::asset_io)?;
        let (_, path) = file.keep().map_err(|e| SyncError::asset_io(e.error))?;
        debug!(path = %path.display(), len = bytes.len(), "asset staged");
        Ok(path)
    }

    /// Reads an asset file into memory and removes it.
    pub fn load(&self, path: &Path) -> SyncResult<Vec<u8>> {
        let bytes = fs::read(path).map_err(SyncError::asset_io)?;
        self.discard(path);
        Ok(bytes)
    }

    /// Removes an asset file, logging failures.
    pub fn discard(&self, path: &Path) {
        if let Err(e) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "asset already gone");
        }
    }

    /// Removes every asset file referenced by `record`.
    pub fn discard_record(&self, record: &Record) {
        for (_, asset) in record.assets() {
            self.discard(&asset.path);
        }
    }

    /// Stages `bytes` as asset field `name` of `record`. Empty blobs are
    /// skipped. A failure is logged and leaves the field absent.
    pub fn attach(&self, record: &mut Record, name: &str, bytes: &[u8]) {
        if bytes.is_empty() {
            return;
        }
        match self.stage(bytes) {
            Ok(path) => record.set_asset(name, path),
            Err(e) => warn!(record = %record.key, field = name, error = %e, "asset not attached"),
        }
    }

    /// Loads asset field `name` of `record`. A missing field yields an
    /// empty blob; a read failure is logged and also yields an empty blob.
    pub fn detach(&self, record: &Record, name: &str) -> Vec<u8> {
        let Some(asset) = record.asset(name) else {
            return Vec::new();
        };
        self.load(&asset.path).unwrap_or_else(|e| {
            warn!(record = %record.key, field = name, error = %e, "asset not readable");
            Vec::new()
        })
    }
}
