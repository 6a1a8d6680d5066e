//! Committed entity graph and the read interface shared by all views.

use crate::error::{CoreError, CoreResult};
use crate::id::{EntityKind, TypedId};
use crate::model::{sort_by_created, AnyEntity, DataKind, Entity, RequestBodyData, RequestData};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::Bound;

/// Read access to a set of entities.
///
/// Implemented by the committed [`Graph`] and by transactions, which overlay
/// their staged changes on top of it. Normal queries exclude tombstones
/// unless `include_deleted` is set; lookups by id always resolve them.
pub trait EntityView {
    /// Looks up any entity by id, tombstones included.
    fn get_any(&self, id: &TypedId) -> Option<&AnyEntity>;

    /// Ids of the entities owned by `parent`, tombstones included.
    fn child_ids(&self, parent: &TypedId) -> Vec<TypedId>;

    /// Ids of every entity of `kind`, in id order.
    fn ids_of_kind(&self, kind: EntityKind) -> Vec<TypedId>;

    /// Looks up an entity of a known type by id.
    fn get<E: Entity>(&self, id: &TypedId) -> Option<&E>
    where
        Self: Sized,
    {
        self.get_any(id).and_then(E::from_any)
    }

    /// Like [`EntityView::get`] but hides tombstones.
    fn get_live<E: Entity>(&self, id: &TypedId) -> Option<&E>
    where
        Self: Sized,
    {
        self.get::<E>(id).filter(|e| !e.is_deleted())
    }

    /// Returns true if the id resolves, tombstoned or not.
    fn exists(&self, id: &TypedId) -> bool {
        self.get_any(id).is_some()
    }

    /// Children of type `E` owned by `parent`, oldest first.
    fn children<E: Entity>(&self, parent: &TypedId, include_deleted: bool) -> Vec<&E>
    where
        Self: Sized,
    {
        let mut out: Vec<&E> = self
            .child_ids(parent)
            .iter()
            .filter(|id| id.kind() == E::KIND)
            .filter_map(|id| self.get::<E>(id))
            .filter(|e| include_deleted || !e.is_deleted())
            .collect();
        sort_by_created(&mut out);
        out
    }

    /// All entities of type `E`, oldest first.
    fn all<E: Entity>(&self, include_deleted: bool) -> Vec<&E>
    where
        Self: Sized,
    {
        self.query(include_deleted, |_: &E| true)
    }

    /// Entities of type `E` matching `pred`, oldest first.
    fn query<E: Entity>(&self, include_deleted: bool, pred: impl Fn(&E) -> bool) -> Vec<&E>
    where
        Self: Sized,
    {
        let mut out: Vec<&E> = self
            .ids_of_kind(E::KIND)
            .iter()
            .filter_map(|id| self.get::<E>(id))
            .filter(|e| include_deleted || !e.is_deleted())
            .filter(|e| pred(e))
            .collect();
        sort_by_created(&mut out);
        out
    }

    /// The live body of a request, if any.
    fn body_of(&self, request_id: &TypedId) -> Option<&RequestBodyData>
    where
        Self: Sized,
    {
        self.children::<RequestBodyData>(request_id, false)
            .into_iter()
            .next()
    }

    /// Request data items of one list owned by `owner`, oldest first.
    fn data_items(&self, owner: &TypedId, kind: DataKind, include_deleted: bool) -> Vec<&RequestData>
    where
        Self: Sized,
    {
        self.children::<RequestData>(owner, include_deleted)
            .into_iter()
            .filter(|d| d.kind == kind)
            .collect()
    }
}

/// Staged mutations: `Some` is a put, `None` a permanent removal.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Changes {
    pub(crate) staged: BTreeMap<TypedId, Option<AnyEntity>>,
}

impl Changes {
    /// Returns true if nothing is staged.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.staged.is_empty()
    }

    /// Number of staged entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.staged.len()
    }

    /// Ids touched by these changes.
    pub fn ids(&self) -> impl Iterator<Item = &TypedId> {
        self.staged.keys()
    }

    /// Ids removed by these changes.
    pub fn removed(&self) -> impl Iterator<Item = &TypedId> {
        self.staged
            .iter()
            .filter(|(_, slot)| slot.is_none())
            .map(|(id, _)| id)
    }
}

/// The committed entities of one store plus an ownership index.
#[derive(Debug, Default)]
pub struct Graph {
    entities: BTreeMap<TypedId, AnyEntity>,
    children: HashMap<TypedId, BTreeSet<TypedId>>,
}

impl Graph {
    /// Creates an empty graph.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entities, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// Returns true if the graph holds no entities.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates all entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &AnyEntity> {
        self.entities.values()
    }

    fn insert(&mut self, entity: AnyEntity) {
        let id = entity.id().clone();
        if let Some(parent) = entity.parent_id() {
            self.children
                .entry(parent.clone())
                .or_default()
                .insert(id.clone());
        }
        if let Some(old) = self.entities.insert(id.clone(), entity) {
            self.unlink(&old, &id);
        }
    }

    fn remove(&mut self, id: &TypedId) -> Option<AnyEntity> {
        let old = self.entities.remove(id)?;
        if let Some(parent) = old.parent_id() {
            if let Some(set) = self.children.get_mut(parent) {
                set.remove(id);
                if set.is_empty() {
                    self.children.remove(parent);
                }
            }
        }
        Some(old)
    }

    /// Drops the index edge of a replaced entity if its owner changed.
    fn unlink(&mut self, old: &AnyEntity, id: &TypedId) {
        let Some(old_parent) = old.parent_id() else {
            return;
        };
        let current = self.entities.get(id).and_then(AnyEntity::parent_id);
        if current == Some(old_parent) {
            return;
        }
        if let Some(set) = self.children.get_mut(old_parent) {
            set.remove(id);
        }
    }

    /// Checks that applying `changes` leaves no entity without its owner.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] naming the orphan.
    pub fn validate(&self, changes: &Changes) -> CoreResult<()> {
        let present = |id: &TypedId| match changes.staged.get(id) {
            Some(slot) => slot.is_some(),
            None => self.entities.contains_key(id),
        };
        for (id, slot) in &changes.staged {
            match slot {
                Some(entity) => {
                    if entity.id() != id {
                        return Err(CoreError::invalid_operation(format!(
                            "entity {} staged under {id}",
                            entity.id()
                        )));
                    }
                    if let Some(parent) = entity.parent_id() {
                        if !present(parent) {
                            return Err(CoreError::invalid_operation(format!(
                                "{id} would be orphaned: owner {parent} is absent"
                            )));
                        }
                    }
                }
                None => {
                    for child in self.children.get(id).into_iter().flatten() {
                        let detached = match changes.staged.get(child) {
                            Some(None) => true,
                            Some(Some(e)) => e.parent_id() != Some(id),
                            None => false,
                        };
                        if !detached {
                            return Err(CoreError::invalid_operation(format!(
                                "removing {id} would orphan {child}"
                            )));
                        }
                    }
                }
            }
        }
        Ok(())
    }

    /// Validates and applies `changes`. Returns the number of entries applied.
    ///
    /// # Errors
    ///
    /// Fails without modifying the graph if validation fails.
    pub fn apply(&mut self, changes: &Changes) -> CoreResult<usize> {
        self.validate(changes)?;
        for (id, slot) in &changes.staged {
            match slot {
                Some(entity) => self.insert(entity.clone()),
                None => {
                    self.remove(id);
                }
            }
        }
        Ok(changes.len())
    }
}

impl EntityView for Graph {
    fn get_any(&self, id: &TypedId) -> Option<&AnyEntity> {
        self.entities.get(id)
    }

    fn child_ids(&self, parent: &TypedId) -> Vec<TypedId> {
        self.children
            .get(parent)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    fn ids_of_kind(&self, kind: EntityKind) -> Vec<TypedId> {
        let tag = kind.tag();
        self.entities
            .range::<str, _>((Bound::Included(tag), Bound::Unbounded))
            .take_while(|(id, _)| id.as_str().starts_with(tag))
            .map(|(id, _)| id.clone())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Env, EnvVar, Meta, Project, Workspace};
    use crate::time::Timestamp;

    fn meta(kind: EntityKind, ws: &TypedId, at: i64) -> Meta {
        Meta::new(TypedId::mint(kind), ws.clone(), Timestamp::from_millis(at), 1)
    }

    fn stage(changes: &mut Changes, entity: AnyEntity) {
        changes.staged.insert(entity.id().clone(), Some(entity));
    }

    #[test]
    fn ids_of_kind_scans_one_tag_range() {
        let ws = TypedId::mint(EntityKind::Workspace);
        let ws_meta = Meta::new(ws.clone(), ws.clone(), Timestamp::from_millis(1), 1);
        let mut changes = Changes::default();
        stage(&mut changes, Workspace::new(ws_meta, "Default").into_any());
        let env = Env::new(meta(EntityKind::Env, &ws, 2), "dev");
        let env_id = env.meta.id().clone();
        stage(&mut changes, env.into_any());
        for at in 3..6 {
            let var = EnvVar::new(meta(EntityKind::EnvVar, &ws, at), env_id.clone(), "k", "v");
            stage(&mut changes, var.into_any());
        }
        let project = Project::new(meta(EntityKind::Project, &ws, 6), "API");
        stage(&mut changes, project.into_any());

        let mut graph = Graph::new();
        graph.apply(&changes).unwrap();

        assert_eq!(graph.ids_of_kind(EntityKind::Workspace), vec![ws.clone()]);
        assert_eq!(graph.ids_of_kind(EntityKind::Env), vec![env_id.clone()]);
        let vars = graph.ids_of_kind(EntityKind::EnvVar);
        assert_eq!(vars.len(), 3);
        assert!(vars.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(graph.ids_of_kind(EntityKind::Project).len(), 1);
        assert!(graph.ids_of_kind(EntityKind::Request).is_empty());
        assert_eq!(graph.all::<EnvVar>(false).len(), 3);
    }
}
