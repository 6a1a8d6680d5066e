//! Cascade delete resolution.
//!
//! The cascade set of an entity is everything it transitively owns. The
//! walk follows ownership edges only; a request's selected method is a
//! shared reference and is never part of a request's cascade.

use crate::error::{CoreError, CoreResult};
use crate::id::{EntityKind, TypedId};
use crate::model::Request;
use crate::store::{EntityView, Transaction};
use std::collections::BTreeSet;
use tracing::debug;

/// How a delete is applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteMode {
    /// Permanently remove the root and its cascade set.
    Direct,
    /// Tombstone the root and its cascade set; a later purge removes them.
    Tombstone,
}

/// Returns every entity that must disappear with `root`, excluding `root`
/// itself. Tombstoned descendants are included.
pub fn cascade<V: EntityView>(view: &V, root: &TypedId) -> BTreeSet<TypedId> {
    let mut out = BTreeSet::new();
    let mut stack = view.child_ids(root);
    while let Some(id) = stack.pop() {
        if out.insert(id.clone()) {
            stack.extend(view.child_ids(&id));
        }
    }
    out
}

/// Deletes `root` and its cascade set. Returns the ids affected, root first.
///
/// Deleting a method also clears the selection of requests that pointed at
/// it, since the reference is not owning.
///
/// # Errors
///
/// Fails with [`CoreError::EntityNotFound`] if `root` does not exist.
pub fn delete(txn: &mut Transaction<'_>, root: &TypedId, mode: DeleteMode) -> CoreResult<Vec<TypedId>> {
    if !txn.exists(root) {
        return Err(CoreError::not_found(root));
    }
    let dependents = cascade(&*txn, root);
    let mut affected = Vec::with_capacity(dependents.len() + 1);
    affected.push(root.clone());
    affected.extend(dependents);

    if root.kind() == EntityKind::RequestMethod {
        release_method(txn, root)?;
    }

    match mode {
        DeleteMode::Direct => {
            for id in &affected {
                txn.remove(id);
            }
        }
        DeleteMode::Tombstone => {
            for id in &affected {
                txn.tombstone(id);
            }
        }
    }
    debug!(root = %root, ?mode, count = affected.len(), "cascade delete");
    Ok(affected)
}

/// Permanently removes tombstoned entities among `ids` together with their
/// cascade sets. Returns the number of entities removed.
pub fn purge(txn: &mut Transaction<'_>, ids: &[TypedId]) -> usize {
    let mut removed = BTreeSet::new();
    for id in ids {
        if !txn.get_any(id).is_some_and(|e| e.is_deleted()) {
            continue;
        }
        removed.extend(cascade(&*txn, id));
        removed.insert(id.clone());
    }
    for id in &removed {
        txn.remove(id);
    }
    removed.len()
}

/// Permanently removes every tombstoned entity of a workspace.
pub fn purge_tombstones(txn: &mut Transaction<'_>, workspace_id: &TypedId) -> usize {
    let mut tombstoned = Vec::new();
    for kind in EntityKind::ALL {
        for id in txn.ids_of_kind(kind) {
            let hit = txn
                .get_any(&id)
                .is_some_and(|e| e.is_deleted() && e.meta().workspace_id() == workspace_id);
            if hit {
                tombstoned.push(id);
            }
        }
    }
    purge(txn, &tombstoned)
}

fn release_method(txn: &mut Transaction<'_>, method_id: &TypedId) -> CoreResult<()> {
    let selecting: Vec<TypedId> = txn
        .query::<Request>(true, |r| r.method_id.as_ref() == Some(method_id))
        .into_iter()
        .map(|r| r.meta.id().clone())
        .collect();
    for request in selecting {
        txn.edit::<Request>(&request, |r| {
            r.method_id = None;
            r.selected_method_index = 0;
        })?;
    }
    Ok(())
}
