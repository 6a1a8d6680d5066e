//! Environments and environment variables.

use super::Meta;
use crate::id::TypedId;

/// A named set of variables inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Env {
    /// Shared bookkeeping; the owner is the workspace.
    pub meta: Meta,
    /// Display name.
    pub name: String,
}

impl Env {
    /// Creates an environment.
    #[must_use]
    pub fn new(meta: Meta, name: impl Into<String>) -> Self {
        Self {
            meta,
            name: name.into(),
        }
    }
}

/// A variable of an environment. The value is encrypted before leaving
/// the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvVar {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning environment.
    pub env_id: TypedId,
    /// Variable name.
    pub name: String,
    /// Variable value.
    pub value: String,
}

impl EnvVar {
    /// Creates a variable.
    #[must_use]
    pub fn new(
        meta: Meta,
        env_id: TypedId,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            meta,
            env_id,
            name: name.into(),
            value: value.into(),
        }
    }
}
