//! Zone addressing.
//!
//! Every workspace owns one remote partition ("zone") holding all of its
//! entities. A shared default zone holds one lightweight zone tombstone
//! record per workspace so that all workspaces can be listed from a single
//! partition.

use crate::error::CoreResult;
use crate::id::{EntityKind, TypedId};
use std::fmt;

/// Name of the shared default zone.
pub const DEFAULT_ZONE_NAME: &str = "_defaultZone";

/// Handle to a remote partition.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ZoneHandle {
    name: String,
}

impl ZoneHandle {
    /// The shared default zone.
    #[must_use]
    pub fn default_zone() -> Self {
        Self {
            name: DEFAULT_ZONE_NAME.to_string(),
        }
    }

    /// The zone of a workspace.
    ///
    /// # Errors
    ///
    /// Fails with an addressing error if `workspace_id` is not a workspace id.
    pub fn for_workspace(workspace_id: &TypedId) -> CoreResult<Self> {
        workspace_id.expect_kind(EntityKind::Workspace)?;
        Ok(Self {
            name: workspace_id.as_str().to_string(),
        })
    }

    /// Reconstructs a handle from a zone name.
    #[must_use]
    pub fn from_name(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }

    /// Returns the zone name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns true for the shared default zone.
    #[must_use]
    pub fn is_default(&self) -> bool {
        self.name == DEFAULT_ZONE_NAME
    }

    /// Returns the workspace this zone belongs to, if any.
    #[must_use]
    pub fn workspace_id(&self) -> Option<TypedId> {
        TypedId::parse(&self.name)
            .ok()
            .filter(|id| id.kind() == EntityKind::Workspace)
    }
}

impl fmt::Debug for ZoneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Zone({})", self.name)
    }
}

impl fmt::Display for ZoneHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

/// Fully qualified remote record key: zone plus record name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordKey {
    /// Zone holding the record.
    pub zone: ZoneHandle,
    /// Record name inside the zone.
    pub name: String,
}

impl RecordKey {
    /// Creates a record key.
    #[must_use]
    pub fn new(zone: ZoneHandle, name: impl Into<String>) -> Self {
        Self {
            zone,
            name: name.into(),
        }
    }

    /// Parses the record name back into an entity id.
    ///
    /// # Errors
    ///
    /// Returns an addressing error if the name is not a typed id.
    pub fn entity_id(&self) -> CoreResult<TypedId> {
        TypedId::parse(&self.name)
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.zone, self.name)
    }
}

/// Maps a workspace to its zone.
///
/// # Errors
///
/// Fails with an addressing error if `workspace_id` is not a workspace id.
pub fn zone_of(workspace_id: &TypedId) -> CoreResult<ZoneHandle> {
    ZoneHandle::for_workspace(workspace_id)
}

/// Returns the remote key of an entity inside `zone`.
#[must_use]
pub fn record_name(entity_id: &TypedId, zone: &ZoneHandle) -> RecordKey {
    RecordKey::new(zone.clone(), entity_id.as_str())
}

/// Returns the key of a workspace's zone tombstone in the default zone.
///
/// # Errors
///
/// Fails with an addressing error if `workspace_id` is not a workspace id.
pub fn zone_tombstone_key(workspace_id: &TypedId) -> CoreResult<RecordKey> {
    workspace_id.expect_kind(EntityKind::Workspace)?;
    let zone_id = TypedId::with_suffix_of(EntityKind::Zone, workspace_id);
    Ok(record_name(&zone_id, &ZoneHandle::default_zone()))
}
