//! Child contexts for edit sessions.

use super::graph::Changes;
use super::transaction::Transaction;
use super::Store;
use crate::error::CoreResult;
use crate::time::Timestamp;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{debug, error};

/// A short-lived overlay chained to a [`Store`].
///
/// Mutations accumulate in the context until [`ChildContext::save`] commits
/// them to the parent in one transaction. [`ChildContext::rollback`]
/// discards them without ever touching the parent.
pub struct ChildContext {
    parent: Arc<Store>,
    changes: Mutex<Changes>,
}

impl ChildContext {
    pub(crate) fn new(parent: Arc<Store>) -> Self {
        Self {
            parent,
            changes: Mutex::new(Changes::default()),
        }
    }

    /// The store this context saves into.
    #[must_use]
    pub fn parent(&self) -> &Arc<Store> {
        &self.parent
    }

    /// Runs `f` inside the context's fenced block. Staged changes made by
    /// `f` are kept if it succeeds and dropped if it fails.
    ///
    /// # Errors
    ///
    /// Propagates the error returned by `f`.
    pub fn perform<T>(
        &self,
        f: impl FnOnce(&mut Transaction<'_>) -> CoreResult<T>,
    ) -> CoreResult<T> {
        let mut staged = self.changes.lock();
        let graph = self.parent.graph.read();
        let prior = staged.clone();
        let mut txn = Transaction::resume(
            &graph,
            std::mem::take(&mut *staged),
            Timestamp::now(),
            self.parent.config(),
        );
        match f(&mut txn) {
            Ok(value) => {
                *staged = txn.into_changes();
                Ok(value)
            }
            Err(e) => {
                *staged = prior;
                Err(e)
            }
        }
    }

    /// Runs a read-only closure against the context's current state.
    pub fn view<T>(&self, f: impl FnOnce(&Transaction<'_>) -> T) -> T {
        let mut staged = self.changes.lock();
        let graph = self.parent.graph.read();
        let txn = Transaction::resume(
            &graph,
            std::mem::take(&mut *staged),
            Timestamp::now(),
            self.parent.config(),
        );
        let out = f(&txn);
        *staged = txn.into_changes();
        out
    }

    /// Returns true if unsaved changes are staged.
    #[must_use]
    pub fn has_changes(&self) -> bool {
        !self.changes.lock().is_empty()
    }

    /// Commits the staged changes to the parent store. On failure the
    /// changes stay staged.
    ///
    /// # Errors
    ///
    /// Returns the parent's validation error.
    pub fn save(&self) -> CoreResult<usize> {
        let mut staged = self.changes.lock();
        if staged.is_empty() {
            return Ok(0);
        }
        let applied = self.parent.commit(&staged)?;
        staged.staged.clear();
        Ok(applied)
    }

    /// Drops everything staged.
    pub fn rollback(&self) {
        let mut staged = self.changes.lock();
        if !staged.is_empty() {
            debug!(backend = ?self.parent.backend(), discarded = staged.len(), "rolling back child context");
        }
        staged.staged.clear();
    }
}

/// Saves two contexts concurrently and reports the joined outcome.
///
/// Either save may fail without affecting the other; `callback` receives
/// true only if both succeeded.
pub fn save_joined(a: &ChildContext, b: &ChildContext, callback: impl FnOnce(bool)) {
    let (left, right) = std::thread::scope(|s| {
        let left = s.spawn(|| a.save());
        let right = s.spawn(|| b.save());
        (left.join(), right.join())
    });
    let mut ok = true;
    for (side, outcome) in [(a, left), (b, right)] {
        match outcome {
            Ok(Ok(_)) => {}
            Ok(Err(e)) => {
                error!(backend = ?side.parent.backend(), error = %e, "save failed");
                ok = false;
            }
            Err(_) => {
                error!(backend = ?side.parent.backend(), "save panicked");
                ok = false;
            }
        }
    }
    callback(ok);
}
