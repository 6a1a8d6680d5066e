//! Zone tombstone records.
//!
//! One per workspace, kept in the default zone. Listing the default zone is
//! how a device discovers every workspace, and a tombstone with
//! `isDisabled` set is how it learns that a workspace was deleted elsewhere.

use crate::error::{RecordError, RecordResult};
use crate::record::Record;
use reqsync_core::{zone_tombstone_key, EntityKind, Timestamp, TypedId, Workspace};

/// Decoded zone tombstone.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZoneRecord {
    /// Workspace the zone belongs to.
    pub workspace_id: TypedId,
    /// Workspace name.
    pub name: String,
    /// Workspace description.
    pub desc: String,
    /// Whether the workspace is synced.
    pub is_sync_enabled: bool,
    /// Set once the workspace zone has been deleted.
    pub is_disabled: bool,
    /// Workspace creation time.
    pub created: Timestamp,
    /// Last modification time.
    pub modified: Timestamp,
    /// Model version.
    pub version: u32,
}

impl ZoneRecord {
    /// Describes an existing workspace.
    #[must_use]
    pub fn for_workspace(workspace: &Workspace) -> Self {
        Self {
            workspace_id: workspace.meta.id().clone(),
            name: workspace.name.clone(),
            desc: workspace.desc.clone(),
            is_sync_enabled: workspace.is_sync_enabled,
            is_disabled: false,
            created: workspace.meta.created(),
            modified: workspace.meta.modified(),
            version: workspace.meta.version,
        }
    }

    /// Builds the record stored in the default zone.
    ///
    /// # Errors
    ///
    /// Fails if `workspace_id` is not a workspace id.
    pub fn to_record(&self) -> RecordResult<Record> {
        let key = zone_tombstone_key(&self.workspace_id)?;
        let zone_id = key.entity_id()?;
        Ok(Record::for_kind(EntityKind::Zone, key)
            .with("id", zone_id.as_str())
            .with("wsId", self.workspace_id.as_str())
            .with("name", &self.name)
            .with("desc", &self.desc)
            .with("isSyncEnabled", self.is_sync_enabled)
            .with("isDisabled", self.is_disabled)
            .with("created", self.created.as_millis())
            .with("modified", self.modified.as_millis())
            .with("version", self.version))
    }

    /// Reads a zone tombstone.
    ///
    /// # Errors
    ///
    /// Fails if the record is not a zone tombstone or names no workspace.
    pub fn from_record(record: &Record) -> RecordResult<Self> {
        if record.kind()? != EntityKind::Zone {
            return Err(RecordError::UnknownRecordType {
                name: record.record_type.clone(),
            });
        }
        let zone_id = record.entity_id()?;
        let workspace_id = match record.opt_text("wsId") {
            Some(raw) => TypedId::parse(raw)?,
            None => TypedId::with_suffix_of(EntityKind::Workspace, &zone_id),
        };
        workspace_id.expect_kind(EntityKind::Workspace)?;
        Ok(Self {
            workspace_id,
            name: record.text("name"),
            desc: record.text("desc"),
            is_sync_enabled: record.bool_or("isSyncEnabled", false),
            is_disabled: record.bool_or("isDisabled", false),
            created: Timestamp::from_millis(record.integer_or("created", 0)),
            modified: Timestamp::from_millis(record.integer_or("modified", 0)),
            version: u32::try_from(record.integer_or("version", 1)).unwrap_or(1),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::Meta;

    #[test]
    fn tombstone_roundtrip() {
        let id = TypedId::mint(EntityKind::Workspace);
        let mut ws = Workspace::new(Meta::new(id.clone(), id.clone(), Timestamp::from_millis(5), 1), "Team");
        ws.is_sync_enabled = true;
        let mut zone = ZoneRecord::for_workspace(&ws);
        zone.is_disabled = true;

        let record = zone.to_record().unwrap();
        assert!(record.key.zone.is_default());
        assert_eq!(ZoneRecord::from_record(&record).unwrap(), zone);
    }

    #[test]
    fn rejects_other_record_types() {
        let id = TypedId::mint(EntityKind::Workspace);
        let key = zone_tombstone_key(&id).unwrap();
        let record = Record::for_kind(EntityKind::Project, key);
        assert!(ZoneRecord::from_record(&record).is_err());
    }
}
