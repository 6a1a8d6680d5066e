//! Write conflicts and their resolution.

use crate::record::RecordStamp;
use reqsync_core::RecordKey;
use serde::{Deserialize, Serialize};

/// A save rejected because the remote record changed since it was read.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Conflict {
    /// The contested record.
    pub key: RecordKey,
    /// Stamp of the local copy.
    pub local: RecordStamp,
    /// Stamp of the remote copy.
    pub remote: RecordStamp,
    /// Change tag the remote copy currently carries.
    pub remote_tag: Option<u64>,
    /// Resolution, once decided.
    pub resolution: Option<ConflictResolution>,
}

impl Conflict {
    /// Creates an unresolved conflict.
    #[must_use]
    pub fn new(key: RecordKey, local: RecordStamp, remote: RecordStamp, remote_tag: Option<u64>) -> Self {
        Self {
            key,
            local,
            remote,
            remote_tag,
            resolution: None,
        }
    }

    /// Records a resolution.
    pub fn resolve(&mut self, resolution: ConflictResolution) {
        self.resolution = Some(resolution);
    }

    /// Returns true once a resolution has been recorded.
    #[must_use]
    pub fn is_resolved(&self) -> bool {
        self.resolution.is_some()
    }
}

/// Outcome of conflict resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConflictResolution {
    /// Overwrite the remote copy with the local one.
    KeepLocal,
    /// Replace the local copy with the remote one.
    AcceptRemote,
    /// Leave both untouched and report the conflict.
    Skip,
}

/// Policy applied when a remote write conflicts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ConflictPolicy {
    /// Remote copy always wins.
    ServerWins,
    /// Local copy always wins.
    ClientWins,
    /// Later `modified` wins; ties keep the remote copy.
    LastWriteWins,
    /// Higher model `version` wins, then later `modified`; ties keep the
    /// remote copy.
    #[default]
    VersionThenModified,
    /// Nothing is resolved automatically.
    Manual,
}

impl ConflictPolicy {
    /// Returns true if this policy resolves conflicts on its own.
    #[must_use]
    pub fn auto_resolves(&self) -> bool {
        !matches!(self, ConflictPolicy::Manual)
    }

    /// Decides `conflict` and records the decision on it.
    pub fn resolve(&self, conflict: &mut Conflict) -> ConflictResolution {
        let (local, remote) = (conflict.local, conflict.remote);
        let resolution = match self {
            ConflictPolicy::ServerWins => ConflictResolution::AcceptRemote,
            ConflictPolicy::ClientWins => ConflictResolution::KeepLocal,
            ConflictPolicy::LastWriteWins => {
                if local.modified > remote.modified {
                    ConflictResolution::KeepLocal
                } else {
                    ConflictResolution::AcceptRemote
                }
            }
            ConflictPolicy::VersionThenModified => {
                if (local.version, local.modified) > (remote.version, remote.modified) {
                    ConflictResolution::KeepLocal
                } else {
                    ConflictResolution::AcceptRemote
                }
            }
            ConflictPolicy::Manual => ConflictResolution::Skip,
        };
        conflict.resolve(resolution);
        resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqsync_core::{record_name, zone_of, EntityKind, Timestamp, TypedId};

    fn conflict(local: (u32, i64), remote: (u32, i64)) -> Conflict {
        let ws = TypedId::mint(EntityKind::Workspace);
        let key = record_name(&TypedId::mint(EntityKind::Request), &zone_of(&ws).unwrap());
        let stamp = |(version, ms): (u32, i64)| RecordStamp {
            version,
            modified: Timestamp::from_millis(ms),
        };
        Conflict::new(key, stamp(local), stamp(remote), Some(3))
    }

    #[test]
    fn version_then_modified() {
        let policy = ConflictPolicy::VersionThenModified;
        assert_eq!(policy.resolve(&mut conflict((2, 0), (1, 99))), ConflictResolution::KeepLocal);
        assert_eq!(policy.resolve(&mut conflict((1, 99), (2, 0))), ConflictResolution::AcceptRemote);
        assert_eq!(policy.resolve(&mut conflict((1, 50), (1, 40))), ConflictResolution::KeepLocal);
        assert_eq!(policy.resolve(&mut conflict((1, 40), (1, 40))), ConflictResolution::AcceptRemote);
    }

    #[test]
    fn fixed_policies() {
        let mut c = conflict((1, 1), (1, 2));
        assert_eq!(ConflictPolicy::ClientWins.resolve(&mut c), ConflictResolution::KeepLocal);
        assert_eq!(ConflictPolicy::ServerWins.resolve(&mut c), ConflictResolution::AcceptRemote);
        assert_eq!(ConflictPolicy::LastWriteWins.resolve(&mut c), ConflictResolution::AcceptRemote);
        assert_eq!(ConflictPolicy::Manual.resolve(&mut c), ConflictResolution::Skip);
        assert!(c.is_resolved());
        assert!(!ConflictPolicy::Manual.auto_resolves());
    }

    #[test]
    fn policy_deserializes_from_config() {
        let policy: ConflictPolicy = serde_json::from_str("\"lastWriteWins\"").unwrap();
        assert_eq!(policy, ConflictPolicy::LastWriteWins);
        assert_eq!(ConflictPolicy::default(), ConflictPolicy::VersionThenModified);
    }
}
