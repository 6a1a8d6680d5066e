//! Overlay transactions.

use super::graph::{Changes, EntityView, Graph};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::id::{EntityKind, TypedId};
use crate::model::{AnyEntity, Entity, File, Image, Meta, Project, RequestMethod, Workspace};
use crate::time::Timestamp;
use tracing::debug;

/// A set of staged mutations on top of a committed graph.
///
/// Reads see the staged state. Nothing reaches the graph until the owning
/// store or child context commits the transaction.
pub struct Transaction<'a> {
    base: &'a Graph,
    changes: Changes,
    now: Timestamp,
    config: &'a Config,
}

impl<'a> Transaction<'a> {
    pub(crate) fn new(base: &'a Graph, config: &'a Config) -> Self {
        Self::resume(base, Changes::default(), Timestamp::now(), config)
    }

    pub(crate) fn resume(
        base: &'a Graph,
        changes: Changes,
        now: Timestamp,
        config: &'a Config,
    ) -> Self {
        Self {
            base,
            changes,
            now,
            config,
        }
    }

    /// Timestamp stamped on everything this transaction modifies.
    #[must_use]
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.config
    }

    /// Returns true if anything is staged.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Fresh metadata for a new entity.
    #[must_use]
    pub fn new_meta(&self, id: TypedId, workspace_id: TypedId) -> Meta {
        Meta::new(id, workspace_id, self.now, self.config.version)
    }

    pub(crate) fn into_changes(self) -> Changes {
        self.changes
    }

    fn put(&mut self, entity: AnyEntity) {
        self.changes
            .staged
            .insert(entity.id().clone(), Some(entity));
    }

    /// Returns the entity with `id`, creating it with `init` if it does not
    /// exist. Ingestion and local edits both create entities through here.
    ///
    /// # Errors
    ///
    /// Fails if `id` is not of kind `E`, or if `init` builds an entity with
    /// a different id.
    pub fn create_or_get<E: Entity>(
        &mut self,
        id: &TypedId,
        workspace_id: &TypedId,
        init: impl FnOnce(Meta) -> E,
    ) -> CoreResult<&mut E> {
        id.expect_kind(E::KIND)?;
        if !self.exists(id) {
            let entity = init(self.new_meta(id.clone(), workspace_id.clone()));
            if entity.id() != id {
                return Err(CoreError::invalid_operation(format!(
                    "factory for {id} produced {}",
                    entity.id()
                )));
            }
            self.put(entity.into_any());
        }
        self.get_mut::<E>(id)
            .ok_or_else(|| CoreError::not_found(id))
    }

    /// Stores `entity`, replacing any entity with the same id. The creation
    /// time of a replaced entity is kept.
    pub fn upsert<E: Entity>(&mut self, mut entity: E) -> CoreResult<&mut E> {
        let id = entity.id().clone();
        id.expect_kind(E::KIND)?;
        if let Some(existing) = self.get_any(&id) {
            entity.meta_mut().inherit(existing.meta());
        }
        self.put(entity.into_any());
        self.get_mut::<E>(&id).ok_or_else(|| CoreError::not_found(&id))
    }

    /// Mutable access without any bookkeeping. The entity is copied into the
    /// overlay on first access.
    pub fn get_mut<E: Entity>(&mut self, id: &TypedId) -> Option<&mut E> {
        if !self.changes.staged.contains_key(id) {
            let current = self.base.get_any(id)?.clone();
            self.put(current);
        }
        self.changes
            .staged
            .get_mut(id)?
            .as_mut()
            .and_then(E::from_any_mut)
    }

    /// Applies a user edit to `id`.
    ///
    /// If `f` actually changed the entity, it is marked unsynced, its
    /// `modified` advances and its workspace becomes active. Returns whether
    /// anything changed.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::EntityNotFound`] if there is no `E` with `id`.
    pub fn edit<E: Entity>(&mut self, id: &TypedId, f: impl FnOnce(&mut E)) -> CoreResult<bool> {
        let before = self
            .get::<E>(id)
            .cloned()
            .ok_or_else(|| CoreError::not_found(id))?;
        let mut after = before.clone();
        f(&mut after);
        if after == before {
            return Ok(false);
        }
        after.meta_mut().mark_dirty(self.now);
        let workspace_id = after.workspace_id().clone();
        self.put(after.into_any());
        self.activate_workspace(&workspace_id);
        Ok(true)
    }

    /// Flips the `active` flag of a workspace on its first real mutation.
    pub fn activate_workspace(&mut self, workspace_id: &TypedId) {
        let inactive = self
            .get::<Workspace>(workspace_id)
            .is_some_and(|ws| !ws.is_active);
        if inactive {
            if let Some(ws) = self.get_mut::<Workspace>(workspace_id) {
                debug!(workspace = %workspace_id, "activating workspace");
                ws.is_active = true;
            }
        }
    }

    /// Sets the tombstone flag on `id`. Returns false if the entity is absent
    /// or already tombstoned.
    pub fn tombstone(&mut self, id: &TypedId) -> bool {
        let Some(entity) = self.get_any(id) else {
            return false;
        };
        if entity.is_deleted() {
            return false;
        }
        let workspace_id = entity.meta().workspace_id().clone();
        let now = self.now;
        let Some(slot) = self.slot_mut(id) else {
            return false;
        };
        let meta = slot.meta_mut();
        meta.mark_for_delete = true;
        meta.mark_dirty(now);
        self.activate_workspace(&workspace_id);
        true
    }

    /// Marks `id` as confirmed by the remote store.
    pub fn mark_synced(&mut self, id: &TypedId) {
        if self.get_any(id).is_some_and(|e| !e.meta().is_synced) {
            if let Some(slot) = self.slot_mut(id) {
                slot.meta_mut().is_synced = true;
            }
        }
    }

    /// Marks `id` as locally changed at `at` without editing a field.
    /// Returns false if `id` does not resolve.
    pub fn mark_dirty(&mut self, id: &TypedId, at: Timestamp) -> bool {
        match self.slot_mut(id) {
            Some(slot) => {
                slot.meta_mut().mark_dirty(at);
                true
            }
            None => false,
        }
    }

    /// Stages a permanent removal. Returns the removed entity.
    pub fn remove(&mut self, id: &TypedId) -> Option<AnyEntity> {
        let previous = self.get_any(id)?.clone();
        self.changes.staged.insert(id.clone(), None);
        Some(previous)
    }

    fn slot_mut(&mut self, id: &TypedId) -> Option<&mut AnyEntity> {
        if !self.changes.staged.contains_key(id) {
            let current = self.base.get_any(id)?.clone();
            self.put(current);
        }
        self.changes.staged.get_mut(id)?.as_mut()
    }

    /// Creates a project and, if configured, its default methods.
    ///
    /// # Errors
    ///
    /// Fails if `workspace_id` is not a workspace id.
    pub fn create_project(
        &mut self,
        workspace_id: &TypedId,
        name: &str,
    ) -> CoreResult<TypedId> {
        workspace_id.expect_kind(EntityKind::Workspace)?;
        let id = TypedId::mint(EntityKind::Project);
        let project = self
            .create_or_get(&id, workspace_id, |meta| Project::new(meta, name))?
            .clone();
        if self.config.create_default_methods {
            for method in RequestMethod::defaults(&project, self.now, self.config.version) {
                let method_id = method.meta.id().clone();
                self.create_or_get(&method_id, workspace_id, |_| method)?;
            }
        }
        self.activate_workspace(workspace_id);
        Ok(id)
    }

    /// Attaches a file to a request data field, removing any image: a field
    /// carries files or one image, never both.
    ///
    /// # Errors
    ///
    /// Fails if `data_id` is not a request data id.
    pub fn attach_file(
        &mut self,
        data_id: &TypedId,
        workspace_id: &TypedId,
        name: &str,
        data: Vec<u8>,
    ) -> CoreResult<TypedId> {
        data_id.expect_kind(EntityKind::RequestData)?;
        for image in self.child_ids(data_id) {
            if image.kind() == EntityKind::Image {
                self.remove(&image);
            }
        }
        let id = TypedId::mint(EntityKind::File);
        let owner = data_id.clone();
        self.create_or_get(&id, workspace_id, |meta| File::new(meta, owner, name, data))?;
        self.activate_workspace(workspace_id);
        Ok(id)
    }

    /// Attaches an image to a request data field, replacing any files or
    /// previous image.
    ///
    /// # Errors
    ///
    /// Fails if `data_id` is not a request data id.
    pub fn attach_image(
        &mut self,
        data_id: &TypedId,
        workspace_id: &TypedId,
        name: &str,
        data: Vec<u8>,
    ) -> CoreResult<TypedId> {
        data_id.expect_kind(EntityKind::RequestData)?;
        for child in self.child_ids(data_id) {
            if matches!(child.kind(), EntityKind::File | EntityKind::Image) {
                self.remove(&child);
            }
        }
        let id = TypedId::mint(EntityKind::Image);
        let owner = data_id.clone();
        self.create_or_get(&id, workspace_id, |meta| Image::new(meta, owner, name, data))?;
        self.activate_workspace(workspace_id);
        Ok(id)
    }
}

impl EntityView for Transaction<'_> {
    fn get_any(&self, id: &TypedId) -> Option<&AnyEntity> {
        match self.changes.staged.get(id) {
            Some(slot) => slot.as_ref(),
            None => self.base.get_any(id),
        }
    }

    fn child_ids(&self, parent: &TypedId) -> Vec<TypedId> {
        let mut ids: Vec<TypedId> = self
            .base
            .child_ids(parent)
            .into_iter()
            .filter(|id| !self.changes.staged.contains_key(id))
            .collect();
        ids.extend(
            self.changes
                .staged
                .iter()
                .filter(|(_, slot)| {
                    slot.as_ref()
                        .is_some_and(|e| e.parent_id() == Some(parent))
                })
                .map(|(id, _)| id.clone()),
        );
        ids.sort();
        ids
    }

    fn ids_of_kind(&self, kind: EntityKind) -> Vec<TypedId> {
        let mut ids: Vec<TypedId> = self
            .base
            .ids_of_kind(kind)
            .into_iter()
            .filter(|id| !self.changes.staged.contains_key(id))
            .collect();
        ids.extend(
            self.changes
                .staged
                .iter()
                .filter(|(id, slot)| id.kind() == kind && slot.is_some())
                .map(|(id, _)| id.clone()),
        );
        ids.sort();
        ids
    }
}
