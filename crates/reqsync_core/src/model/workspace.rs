//! Workspace entity.

use super::Meta;

/// Top-level container; owns projects and environments.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    /// Shared bookkeeping. `workspace_id` equals `id`.
    pub meta: Meta,
    /// Display name.
    pub name: String,
    /// Description.
    pub desc: String,
    /// Whether this workspace is pushed to the remote store.
    pub is_sync_enabled: bool,
    /// Flipped on the first real mutation. An untouched default workspace
    /// never needs a remote zone.
    pub is_active: bool,
}

impl Workspace {
    /// Creates an inactive, sync-disabled workspace.
    #[must_use]
    pub fn new(meta: Meta, name: impl Into<String>) -> Self {
        Self {
            meta,
            name: name.into(),
            desc: String::new(),
            is_sync_enabled: false,
            is_active: false,
        }
    }
}
