//! Dirty-state tracking for one request aggregate.

use crate::diff::{diff, snapshot_of, Baseline, Divergence};
use crate::error::{TrackerError, TrackerResult};
use crate::rescheduler::Rescheduler;
use parking_lot::Mutex;
use reqsync_codec::Value;
use reqsync_core::{delete, ChildContext, DeleteMode, Timestamp, TypedId};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, error};

static NEXT_CHECK: AtomicU64 = AtomicU64::new(1);

/// Decides whether a request aggregate changed since its edit session
/// began.
///
/// The snapshot is taken when the tracker is created. Checks go through
/// the shared [`Rescheduler`], so a burst of edits collapses into one diff.
/// A check that finds a divergence marks the divergent entity unsynced and
/// raises its `modified` to the session start.
pub struct EditRequestTracker {
    state: Arc<TrackerState>,
    rescheduler: Arc<Rescheduler>,
}

struct TrackerState {
    context: Arc<ChildContext>,
    request_id: TypedId,
    check_id: String,
    session_start: Timestamp,
    baseline: Mutex<Baseline>,
    deleted: Mutex<Vec<TypedId>>,
}

enum Check {
    Clean,
    Diverged(Divergence),
    Vanished,
}

impl TrackerState {
    fn evaluate(&self) -> bool {
        let baseline = self.baseline.lock().clone();
        let outcome = self.context.perform(|txn| {
            let Some(live) = snapshot_of(&*txn, &self.request_id) else {
                return Ok(Check::Vanished);
            };
            Ok(match diff(&baseline, &live, &*txn) {
                Some(d) => {
                    txn.mark_dirty(&d.entity, self.session_start);
                    Check::Diverged(d)
                }
                None => Check::Clean,
            })
        });
        match outcome {
            Ok(Check::Clean) => false,
            Ok(Check::Diverged(d)) => {
                debug!(request = %self.request_id, entity = %d.entity, field = d.field, "aggregate changed");
                true
            }
            Ok(Check::Vanished) => {
                debug!(request = %self.request_id, "request no longer exists");
                true
            }
            Err(e) => {
                error!(request = %self.request_id, error = %e, "dirty check failed");
                false
            }
        }
    }
}

impl EditRequestTracker {
    /// Snapshots `request_id` as seen by `context`.
    ///
    /// # Errors
    ///
    /// Fails if the request does not exist in the context.
    pub fn new(
        context: Arc<ChildContext>,
        request_id: TypedId,
        rescheduler: Arc<Rescheduler>,
    ) -> TrackerResult<Self> {
        let baseline = context
            .view(|v| Baseline::capture(v, &request_id))
            .ok_or_else(|| TrackerError::RequestNotFound(request_id.clone()))?;
        let check_id = format!("diff:{request_id}:{}", NEXT_CHECK.fetch_add(1, Ordering::Relaxed));
        Ok(Self {
            state: Arc::new(TrackerState {
                context,
                request_id,
                check_id,
                session_start: Timestamp::now(),
                baseline: Mutex::new(baseline),
                deleted: Mutex::new(Vec::new()),
            }),
            rescheduler,
        })
    }

    /// The tracked request.
    pub fn request_id(&self) -> &TypedId {
        &self.state.request_id
    }

    /// When the session began. Divergent entities are stamped with it.
    pub fn session_start(&self) -> Timestamp {
        self.state.session_start
    }

    /// The dictionary projection checks compare against.
    pub fn snapshot(&self) -> Value {
        self.state.baseline.lock().snapshot.clone()
    }

    /// Schedules a debounced check. Only the callback of the last call
    /// within a debounce window is invoked, on the rescheduler's thread.
    pub fn is_changed(&self, callback: impl FnOnce(bool) + Send + 'static) {
        let state = Arc::clone(&self.state);
        self.rescheduler
            .schedule(self.state.check_id.clone(), move || state.evaluate(), callback);
    }

    /// Runs the check immediately on the calling thread.
    pub fn is_changed_now(&self) -> bool {
        self.state.evaluate()
    }

    /// Returns true if a debounced check is pending.
    pub fn is_pending(&self) -> bool {
        self.rescheduler.is_pending(&self.state.check_id)
    }

    /// Drops a pending debounced check.
    pub fn cancel(&self) -> bool {
        self.rescheduler.cancel(&self.state.check_id)
    }

    /// Tombstones `id` and everything it owns in the session context and
    /// remembers it as deleted. Returns the number of entities affected.
    ///
    /// # Errors
    ///
    /// Fails if `id` does not exist.
    pub fn track_deleted_entity(&self, id: &TypedId) -> TrackerResult<usize> {
        let affected = self
            .state
            .context
            .perform(|txn| delete(txn, id, DeleteMode::Tombstone))?;
        self.state.deleted.lock().push(id.clone());
        debug!(request = %self.state.request_id, entity = %id, affected = affected.len(), "deletion tracked");
        Ok(affected.len())
    }

    /// Entities deleted since the last flush.
    pub fn tracked_deletions(&self) -> Vec<TypedId> {
        self.state.deleted.lock().clone()
    }

    /// Makes the session's current state the new baseline: drops a pending
    /// check, re-captures the projection and file digests, and forgets
    /// tracked deletions, which are returned.
    pub fn flush(&self) -> Vec<TypedId> {
        self.cancel();
        let fresh = self
            .state
            .context
            .view(|v| Baseline::capture(v, &self.state.request_id));
        if let Some(baseline) = fresh {
            *self.state.baseline.lock() = baseline;
        }
        std::mem::take(&mut *self.state.deleted.lock())
    }
}

impl Drop for EditRequestTracker {
    fn drop(&mut self) {
        self.cancel();
    }
}
