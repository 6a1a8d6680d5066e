//! Local entity graph.
//!
//! Every domain object is an independent struct carrying a [`Meta`] block
//! and implementing [`Entity`]. Ownership is expressed by each entity's
//! `parent_id`; the store indexes those edges so cascades and child queries
//! never need to know concrete types.

mod attachment;
mod data;
mod env;
mod project;
mod request;
mod workspace;

pub use attachment::{File, Image};
pub use data::{BodyKind, DataKind, FieldFormat, RequestBodyData, RequestData};
pub use env::{Env, EnvVar};
pub use project::{Project, RequestMethod, DEFAULT_METHODS};
pub use request::{History, Request};
pub use workspace::Workspace;

use crate::id::{EntityKind, TypedId};
use crate::time::Timestamp;
use std::fmt;

/// Bookkeeping shared by every entity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Meta {
    id: TypedId,
    workspace_id: TypedId,
    created: Timestamp,
    modified: Timestamp,
    /// Local model version the entity was written with.
    pub version: u32,
    /// Tombstone flag. Tombstoned entities are hidden from normal queries.
    pub mark_for_delete: bool,
    /// True only after a confirmed remote write.
    pub is_synced: bool,
}

impl Meta {
    /// Creates metadata for a brand-new entity.
    #[must_use]
    pub fn new(id: TypedId, workspace_id: TypedId, now: Timestamp, version: u32) -> Self {
        Self {
            id,
            workspace_id,
            created: now,
            modified: now,
            version,
            mark_for_delete: false,
            is_synced: false,
        }
    }

    /// Rebuilds metadata from persisted or remote values.
    #[must_use]
    pub fn restore(
        id: TypedId,
        workspace_id: TypedId,
        created: Timestamp,
        modified: Timestamp,
        version: u32,
    ) -> Self {
        Self {
            id,
            workspace_id,
            created,
            modified: modified.max(created),
            version,
            mark_for_delete: false,
            is_synced: false,
        }
    }

    /// Entity id.
    #[must_use]
    pub fn id(&self) -> &TypedId {
        &self.id
    }

    /// Id of the owning workspace.
    #[must_use]
    pub fn workspace_id(&self) -> &TypedId {
        &self.workspace_id
    }

    /// Creation time (UTC).
    #[must_use]
    pub fn created(&self) -> Timestamp {
        self.created
    }

    /// Last modification time (UTC).
    #[must_use]
    pub fn modified(&self) -> Timestamp {
        self.modified
    }

    /// Advances `modified` to `at`. Never moves it backwards.
    pub fn touch(&mut self, at: Timestamp) {
        self.modified = self.modified.max(at);
    }

    /// Marks the entity as locally changed at `at`.
    pub fn mark_dirty(&mut self, at: Timestamp) {
        self.is_synced = false;
        self.touch(at);
    }

    /// Keeps identity and creation time of `existing` when an upsert
    /// replaces it.
    pub(crate) fn inherit(&mut self, existing: &Meta) {
        self.created = existing.created;
        self.modified = self.modified.max(existing.modified);
    }
}

/// Common interface of all entity types.
pub trait Entity: Clone + fmt::Debug + PartialEq + Send + Sync + 'static {
    /// The kind encoded in this type's ids.
    const KIND: EntityKind;

    /// Shared bookkeeping.
    fn meta(&self) -> &Meta;

    /// Mutable shared bookkeeping.
    fn meta_mut(&mut self) -> &mut Meta;

    /// The owning entity, or `None` for workspaces.
    fn parent_id(&self) -> Option<&TypedId>;

    /// Wraps the entity.
    fn into_any(self) -> AnyEntity;

    /// Borrows the entity out of an [`AnyEntity`] of the right variant.
    fn from_any(any: &AnyEntity) -> Option<&Self>;

    /// Mutably borrows the entity out of an [`AnyEntity`].
    fn from_any_mut(any: &mut AnyEntity) -> Option<&mut Self>;

    /// Entity id.
    fn id(&self) -> &TypedId {
        self.meta().id()
    }

    /// Owning workspace id.
    fn workspace_id(&self) -> &TypedId {
        self.meta().workspace_id()
    }

    /// Creation time.
    fn created(&self) -> Timestamp {
        self.meta().created()
    }

    /// Last modification time.
    fn modified(&self) -> Timestamp {
        self.meta().modified()
    }

    /// Local model version.
    fn version(&self) -> u32 {
        self.meta().version
    }

    /// Tombstone accessor.
    fn is_deleted(&self) -> bool {
        self.meta().mark_for_delete
    }

    /// Whether the latest local state was confirmed remotely.
    fn is_synced(&self) -> bool {
        self.meta().is_synced
    }
}

/// Any entity, used where the concrete type is not known statically.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum AnyEntity {
    Workspace(Workspace),
    Project(Project),
    RequestMethod(RequestMethod),
    Request(Request),
    RequestBodyData(RequestBodyData),
    RequestData(RequestData),
    File(File),
    Image(Image),
    History(History),
    Env(Env),
    EnvVar(EnvVar),
}

macro_rules! entity_impls {
    ($($ty:ident => $parent:expr),* $(,)?) => {
        $(
            impl Entity for $ty {
                const KIND: EntityKind = EntityKind::$ty;

                fn meta(&self) -> &Meta {
                    &self.meta
                }

                fn meta_mut(&mut self) -> &mut Meta {
                    &mut self.meta
                }

                fn parent_id(&self) -> Option<&TypedId> {
                    let parent: fn(&$ty) -> Option<&TypedId> = $parent;
                    parent(self)
                }

                fn into_any(self) -> AnyEntity {
                    AnyEntity::$ty(self)
                }

                fn from_any(any: &AnyEntity) -> Option<&Self> {
                    match any {
                        AnyEntity::$ty(e) => Some(e),
                        _ => None,
                    }
                }

                fn from_any_mut(any: &mut AnyEntity) -> Option<&mut Self> {
                    match any {
                        AnyEntity::$ty(e) => Some(e),
                        _ => None,
                    }
                }
            }
        )*

        impl AnyEntity {
            /// Entity kind.
            #[must_use]
            pub fn kind(&self) -> EntityKind {
                match self {
                    $(AnyEntity::$ty(_) => EntityKind::$ty,)*
                }
            }

            /// Shared bookkeeping.
            #[must_use]
            pub fn meta(&self) -> &Meta {
                match self {
                    $(AnyEntity::$ty(e) => &e.meta,)*
                }
            }

            /// Mutable shared bookkeeping.
            pub fn meta_mut(&mut self) -> &mut Meta {
                match self {
                    $(AnyEntity::$ty(e) => &mut e.meta,)*
                }
            }

            /// Owning entity id.
            #[must_use]
            pub fn parent_id(&self) -> Option<&TypedId> {
                match self {
                    $(AnyEntity::$ty(e) => e.parent_id(),)*
                }
            }
        }
    };
}

entity_impls! {
    Workspace => |_| None,
    Project => |e| Some(e.meta.workspace_id()),
    RequestMethod => |e| Some(&e.project_id),
    Request => |e| Some(&e.project_id),
    RequestBodyData => |e| Some(&e.request_id),
    RequestData => |e| Some(&e.owner_id),
    File => |e| Some(&e.data_id),
    Image => |e| Some(&e.data_id),
    History => |e| Some(&e.request_id),
    Env => |e| Some(e.meta.workspace_id()),
    EnvVar => |e| Some(&e.env_id),
}

impl AnyEntity {
    /// Entity id.
    #[must_use]
    pub fn id(&self) -> &TypedId {
        self.meta().id()
    }

    /// Tombstone accessor.
    #[must_use]
    pub fn is_deleted(&self) -> bool {
        self.meta().mark_for_delete
    }
}

/// Sorts entities by creation time, ties broken by id.
pub fn sort_by_created<E: Entity>(items: &mut [&E]) {
    items.sort_by(|a, b| a.created().cmp(&b.created()).then_with(|| a.id().cmp(b.id())));
}
