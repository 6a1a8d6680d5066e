//! Project and request method definitions.

use super::Meta;
use crate::id::{EntityKind, TypedId};
use crate::time::Timestamp;

/// Method names generated for every new project.
pub const DEFAULT_METHODS: [&str; 5] = ["GET", "POST", "PUT", "PATCH", "DELETE"];

/// A collection of requests and method definitions inside a workspace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Project {
    /// Shared bookkeeping; the owner is the workspace.
    pub meta: Meta,
    /// Display name.
    pub name: String,
    /// Description.
    pub desc: String,
}

impl Project {
    /// Creates a project.
    #[must_use]
    pub fn new(meta: Meta, name: impl Into<String>) -> Self {
        Self {
            meta,
            name: name.into(),
            desc: String::new(),
        }
    }
}

/// An HTTP method a request can select. Requests reference methods; they
/// do not own them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestMethod {
    /// Shared bookkeeping.
    pub meta: Meta,
    /// Owning project.
    pub project_id: TypedId,
    /// Method name, e.g. `GET` or a custom verb.
    pub name: String,
    /// False for the generated defaults.
    pub is_custom: bool,
}

impl RequestMethod {
    /// Creates a custom method.
    #[must_use]
    pub fn new(meta: Meta, project_id: TypedId, name: impl Into<String>) -> Self {
        Self {
            meta,
            project_id,
            name: name.into(),
            is_custom: true,
        }
    }

    /// Id of a default method of `project_id`. Content-derived, so every
    /// device mints the same ids for the same project.
    #[must_use]
    pub fn default_id(project_id: &TypedId, name: &str) -> TypedId {
        TypedId::derive(EntityKind::RequestMethod, &format!("{project_id}:{name}"))
    }

    /// Builds the five generated default methods of a project.
    #[must_use]
    pub fn defaults(project: &Project, now: Timestamp, version: u32) -> Vec<Self> {
        DEFAULT_METHODS
            .iter()
            .map(|name| Self {
                meta: Meta::new(
                    Self::default_id(project.meta.id(), name),
                    project.meta.workspace_id().clone(),
                    now,
                    version,
                ),
                project_id: project.meta.id().clone(),
                name: (*name).to_string(),
                is_custom: false,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_stable_and_not_custom() {
        let ws = TypedId::mint(EntityKind::Workspace);
        let project = Project::new(
            Meta::new(TypedId::mint(EntityKind::Project), ws, Timestamp::now(), 1),
            "API",
        );
        let a = RequestMethod::defaults(&project, Timestamp::now(), 1);
        let b = RequestMethod::defaults(&project, Timestamp::now(), 1);
        assert_eq!(a.len(), 5);
        assert!(a.iter().all(|m| !m.is_custom));
        let ids_a: Vec<_> = a.iter().map(|m| m.meta.id().clone()).collect();
        let ids_b: Vec<_> = b.iter().map(|m| m.meta.id().clone()).collect();
        assert_eq!(ids_a, ids_b);
    }
}
