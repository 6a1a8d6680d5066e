//! Stores, transactions and child contexts.
//!
//! A [`Store`] owns one committed [`Graph`]. All mutation happens inside
//! [`Store::transaction`] or a [`ChildContext`]; the store's lock is the
//! only serialization mechanism.

mod context;
mod graph;
mod transaction;

pub use context::{save_joined, ChildContext};
pub use graph::{Changes, EntityView, Graph};
pub use transaction::Transaction;

use crate::config::Config;
use crate::error::CoreResult;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::{debug, warn};

/// Which storage back-end a store stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Backend {
    /// Device-only data.
    Local,
    /// Data mirrored to the remote record store.
    Synced,
}

/// One logical entity store.
pub struct Store {
    backend: Backend,
    config: Config,
    graph: RwLock<Graph>,
}

impl Store {
    /// Creates an empty store.
    #[must_use]
    pub fn new(backend: Backend, config: Config) -> Self {
        Self {
            backend,
            config,
            graph: RwLock::new(Graph::new()),
        }
    }

    /// The back-end this store stands for.
    #[must_use]
    pub fn backend(&self) -> Backend {
        self.backend
    }

    /// Store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of entities, tombstones included.
    #[must_use]
    pub fn len(&self) -> usize {
        self.graph.read().len()
    }

    /// Returns true if the store is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.graph.read().is_empty()
    }

    /// Runs a read-only closure against the committed graph.
    pub fn read<T>(&self, f: impl FnOnce(&Graph) -> T) -> T {
        f(&self.graph.read())
    }

    /// Executes `f` within a transaction.
    ///
    /// If `f` returns `Ok`, its staged changes are validated and applied
    /// atomically. If it returns `Err`, nothing is applied.
    ///
    /// # Errors
    ///
    /// Propagates the error of `f`, or the validation error of the commit.
    pub fn transaction<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut graph = self.graph.write();
        let mut txn = Transaction::new(&graph, &self.config);
        let value = f(&mut txn)?;
        let changes = txn.into_changes();
        if !changes.is_empty() {
            let applied = graph.apply(&changes).inspect_err(|e| {
                warn!(backend = ?self.backend, error = %e, "transaction rejected");
            })?;
            debug!(backend = ?self.backend, applied, "transaction committed");
        }
        Ok(value)
    }

    /// Applies changes staged elsewhere, e.g. by a child context.
    ///
    /// # Errors
    ///
    /// Returns the validation error; the graph is unchanged in that case.
    pub fn commit(&self, changes: &Changes) -> CoreResult<usize> {
        let applied = self.graph.write().apply(changes).inspect_err(|e| {
            warn!(backend = ?self.backend, error = %e, "commit rejected");
        })?;
        debug!(backend = ?self.backend, applied, "changes committed");
        Ok(applied)
    }

    /// Opens a child context on this store.
    #[must_use]
    pub fn child(self: &Arc<Self>) -> ChildContext {
        ChildContext::new(Arc::clone(self))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::id::{EntityKind, TypedId};
    use crate::model::{
        DataKind, Entity, Env, EnvVar, Project, Request, RequestData, RequestMethod, Workspace,
    };

    fn store() -> Arc<Store> {
        Arc::new(Store::new(Backend::Synced, Config::default()))
    }

    fn workspace(store: &Store) -> TypedId {
        let id = TypedId::mint(EntityKind::Workspace);
        store
            .transaction(|txn| {
                txn.create_or_get(&id, &id, |meta| Workspace::new(meta, "Default"))?;
                Ok(())
            })
            .unwrap();
        id
    }

    #[test]
    fn create_or_get_is_idempotent() {
        let store = store();
        let ws = workspace(&store);
        let env = TypedId::mint(EntityKind::Env);
        store
            .transaction(|txn| {
                txn.create_or_get(&env, &ws, |meta| Env::new(meta, "dev"))?;
                let again = txn.create_or_get(&env, &ws, |meta| Env::new(meta, "other"))?;
                assert_eq!(again.name, "dev");
                Ok(())
            })
            .unwrap();
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn create_or_get_rejects_wrong_kind() {
        let store = store();
        let ws = workspace(&store);
        let err = store
            .transaction(|txn| {
                txn.create_or_get(&ws, &ws, |meta| Env::new(meta, "dev"))?;
                Ok(())
            })
            .unwrap_err();
        assert!(err.is_addressing());
    }

    #[test]
    fn failed_transaction_applies_nothing() {
        let store = store();
        let ws = workspace(&store);
        let result: CoreResult<()> = store.transaction(|txn| {
            let env = TypedId::mint(EntityKind::Env);
            txn.create_or_get(&env, &ws, |meta| Env::new(meta, "dev"))?;
            Err(CoreError::invalid_operation("abort"))
        });
        assert!(result.is_err());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn orphans_are_rejected() {
        let store = store();
        let ws = workspace(&store);
        let missing_env = TypedId::mint(EntityKind::Env);
        let err = store
            .transaction(|txn| {
                let var = TypedId::mint(EntityKind::EnvVar);
                let owner = missing_env.clone();
                txn.create_or_get(&var, &ws, |meta| EnvVar::new(meta, owner, "k", "v"))?;
                Ok(())
            })
            .unwrap_err();
        assert!(matches!(err, CoreError::InvalidOperation { .. }));

        let err = store
            .transaction(|txn| {
                txn.remove(&ws);
                Ok(())
            })
            .map(|_| ());
        assert!(err.is_ok(), "workspace without children can be removed");
    }

    #[test]
    fn edit_marks_dirty_and_activates_workspace() {
        let store = store();
        let ws = workspace(&store);
        let project = store
            .transaction(|txn| txn.create_project(&ws, "API"))
            .unwrap();
        store.transaction(|txn| {
            txn.mark_synced(&project);
            Ok(())
        })
        .unwrap();

        let unchanged = store
            .transaction(|txn| txn.edit::<Project>(&project, |p| p.name = "API".into()))
            .unwrap();
        assert!(!unchanged);

        let changed = store
            .transaction(|txn| txn.edit::<Project>(&project, |p| p.name = "Billing".into()))
            .unwrap();
        assert!(changed);
        store.read(|g| {
            let p = g.get::<Project>(&project).unwrap();
            assert!(!p.is_synced());
            assert!(g.get::<Workspace>(&ws).unwrap().is_active);
        });
    }

    #[test]
    fn new_project_gets_default_methods() {
        let store = store();
        let ws = workspace(&store);
        let project = store
            .transaction(|txn| txn.create_project(&ws, "API"))
            .unwrap();
        store.read(|g| {
            let methods = g.children::<RequestMethod>(&project, false);
            let names: Vec<_> = methods.iter().map(|m| m.name.as_str()).collect();
            assert_eq!(names.len(), 5);
            for name in ["GET", "POST", "PUT", "PATCH", "DELETE"] {
                assert!(names.contains(&name));
            }
        });
    }

    #[test]
    fn tombstones_are_hidden_from_queries() {
        let store = store();
        let ws = workspace(&store);
        let env = TypedId::mint(EntityKind::Env);
        store
            .transaction(|txn| {
                txn.create_or_get(&env, &ws, |meta| Env::new(meta, "dev"))?;
                Ok(())
            })
            .unwrap();
        store
            .transaction(|txn| {
                assert!(txn.tombstone(&env));
                assert!(!txn.tombstone(&env));
                Ok(())
            })
            .unwrap();
        store.read(|g| {
            assert!(g.children::<Env>(&ws, false).is_empty());
            assert_eq!(g.children::<Env>(&ws, true).len(), 1);
            assert!(g.get_live::<Env>(&env).is_none());
            assert!(g.exists(&env));
        });
    }

    #[test]
    fn child_context_rollback_leaves_parent_untouched() {
        let store = store();
        let ws = workspace(&store);
        let child = store.child();
        child
            .perform(|txn| {
                let env = TypedId::mint(EntityKind::Env);
                txn.create_or_get(&env, &ws, |meta| Env::new(meta, "dev"))?;
                Ok(())
            })
            .unwrap();
        assert!(child.has_changes());
        assert_eq!(child.view(|txn| txn.all::<Env>(false).len()), 1);
        assert_eq!(store.read(|g| g.all::<Env>(false).len()), 0);

        child.rollback();
        assert!(!child.has_changes());
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn child_context_save_commits_once() {
        let store = store();
        let ws = workspace(&store);
        let project = store
            .transaction(|txn| txn.create_project(&ws, "API"))
            .unwrap();
        let child = store.child();
        let request = TypedId::mint(EntityKind::Request);
        child
            .perform(|txn| {
                let owner = project.clone();
                txn.create_or_get(&request, &ws, |meta| Request::new(meta, owner))?;
                let header = TypedId::mint(EntityKind::RequestData);
                let owner = request.clone();
                txn.create_or_get(&header, &ws, |meta| {
                    RequestData::new(meta, owner, DataKind::Header, "Accept", "*/*")
                })?;
                Ok(())
            })
            .unwrap();
        assert_eq!(child.save().unwrap(), 2);
        assert!(!child.has_changes());
        store.read(|g| {
            assert_eq!(g.data_items(&request, DataKind::Header, false).len(), 1);
        });
    }

    #[test]
    fn failed_perform_restores_staged_changes() {
        let store = store();
        let ws = workspace(&store);
        let child = store.child();
        child
            .perform(|txn| txn.edit::<Workspace>(&ws, |w| w.name = "Renamed".into()))
            .unwrap();
        let result: CoreResult<()> = child.perform(|txn| {
            txn.edit::<Workspace>(&ws, |w| w.name = "Broken".into())?;
            Err(CoreError::invalid_operation("abort"))
        });
        assert!(result.is_err());
        assert_eq!(
            child.view(|txn| txn.get::<Workspace>(&ws).unwrap().name.clone()),
            "Renamed"
        );
    }

    #[test]
    fn save_joined_reports_failure_of_either_side() {
        let local = Arc::new(Store::new(Backend::Local, Config::default()));
        let synced = store();
        let ws = workspace(&synced);

        let a = local.child();
        let b = synced.child();
        b.perform(|txn| txn.edit::<Workspace>(&ws, |w| w.desc = "x".into()))
            .unwrap();
        let mut outcome = None;
        save_joined(&a, &b, |ok| outcome = Some(ok));
        assert_eq!(outcome, Some(true));

        // An orphan staged in the local context makes that save fail only.
        let c = local.child();
        let d = synced.child();
        c.perform(|txn| {
            let env = TypedId::mint(EntityKind::Env);
            let var = TypedId::mint(EntityKind::EnvVar);
            txn.create_or_get(&var, &ws, |meta| EnvVar::new(meta, env, "k", "v"))?;
            Ok(())
        })
        .unwrap();
        d.perform(|txn| txn.edit::<Workspace>(&ws, |w| w.desc = "y".into()))
            .unwrap();
        let mut outcome = None;
        save_joined(&c, &d, |ok| outcome = Some(ok));
        assert_eq!(outcome, Some(false));
        assert!(c.has_changes());
        assert_eq!(synced.read(|g| g.get::<Workspace>(&ws).unwrap().desc.clone()), "y");
    }
}
