//! Edit sessions over a request aggregate.
//!
//! A session stages every mutation in a child context. Saving commits the
//! context to its store in one transaction; discarding drops it without
//! touching the store.

use crate::error::TrackerResult;
use crate::rescheduler::Rescheduler;
use crate::tracker::EditRequestTracker;
use reqsync_core::{
    purge, save_joined, Backend, ChildContext, CoreError, CoreResult, EditEvent, Entity,
    EntityView, EventBus, Store, Transaction, TypedId,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::{error, info};

/// An in-progress edit of one request.
pub struct EditSession {
    context: Arc<ChildContext>,
    tracker: EditRequestTracker,
    events: EventBus,
    dirty: Arc<AtomicBool>,
}

impl EditSession {
    /// Opens a session on `request_id` in `store`.
    ///
    /// # Errors
    ///
    /// Fails if the request does not exist.
    pub fn open(
        store: &Arc<Store>,
        request_id: &TypedId,
        rescheduler: Arc<Rescheduler>,
    ) -> TrackerResult<Self> {
        let context = Arc::new(store.child());
        let tracker = EditRequestTracker::new(Arc::clone(&context), request_id.clone(), rescheduler)?;
        info!(request = %request_id, backend = ?store.backend(), "edit session opened");
        Ok(Self {
            context,
            tracker,
            events: EventBus::new(),
            dirty: Arc::new(AtomicBool::new(false)),
        })
    }

    /// The edited request.
    pub fn request_id(&self) -> &TypedId {
        self.tracker.request_id()
    }

    /// The session's child context.
    pub fn context(&self) -> &ChildContext {
        &self.context
    }

    /// The session's tracker.
    pub fn tracker(&self) -> &EditRequestTracker {
        &self.tracker
    }

    /// Subscribes to the session's edit events.
    pub fn subscribe(&self) -> Receiver<EditEvent> {
        self.events.subscribe()
    }

    /// Outcome of the last completed debounced check.
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::SeqCst)
    }

    /// Edits field `field` of `id` through `f`. Returns true if the entity
    /// actually changed, in which case a check is scheduled.
    ///
    /// # Errors
    ///
    /// Fails if `id` is not an `E`.
    pub fn edit<E: Entity>(
        &self,
        id: &TypedId,
        field: &str,
        f: impl FnOnce(&mut E),
    ) -> TrackerResult<bool> {
        let changed = self.context.perform(|txn| txn.edit::<E>(id, f))?;
        if changed {
            self.events.publish(EditEvent::FieldChanged {
                entity: id.clone(),
                field: field.to_string(),
            });
            self.schedule_check();
        }
        Ok(changed)
    }

    /// Runs an arbitrary mutation in the session context and schedules a
    /// check.
    ///
    /// # Errors
    ///
    /// Propagates the error of `f`; its changes are dropped.
    pub fn perform<T>(&self, f: impl FnOnce(&mut Transaction<'_>) -> CoreResult<T>) -> TrackerResult<T> {
        let value = self.context.perform(f)?;
        self.schedule_check();
        Ok(value)
    }

    /// Attaches a file to request data `data_id`.
    ///
    /// # Errors
    ///
    /// Fails if `data_id` is not a live request data id.
    pub fn attach_file(&self, data_id: &TypedId, name: &str, bytes: Vec<u8>) -> TrackerResult<TypedId> {
        let file = self.context.perform(|txn| {
            let ws = workspace_of(txn, data_id)?;
            txn.attach_file(data_id, &ws, name, bytes)
        })?;
        self.attachment_received(data_id, &file);
        Ok(file)
    }

    /// Attaches an image to request data `data_id`, replacing files.
    ///
    /// # Errors
    ///
    /// Fails if `data_id` is not a live request data id.
    pub fn attach_image(&self, data_id: &TypedId, name: &str, bytes: Vec<u8>) -> TrackerResult<TypedId> {
        let image = self.context.perform(|txn| {
            let ws = workspace_of(txn, data_id)?;
            txn.attach_image(data_id, &ws, name, bytes)
        })?;
        self.attachment_received(data_id, &image);
        Ok(image)
    }

    /// Deletes `id` and everything it owns. Deletions are tombstones until
    /// the session is saved; a local-only store then purges them.
    ///
    /// # Errors
    ///
    /// Fails if `id` does not exist.
    pub fn delete(&self, id: &TypedId) -> TrackerResult<usize> {
        let affected = self.tracker.track_deleted_entity(id)?;
        self.events.publish(EditEvent::EntityDeleted { entity: id.clone() });
        self.schedule_check();
        Ok(affected)
    }

    /// Schedules a debounced check and reports its outcome to `callback`.
    pub fn check(&self, callback: impl FnOnce(bool) + Send + 'static) {
        let dirty = Arc::clone(&self.dirty);
        self.tracker.is_changed(move |changed| {
            dirty.store(changed, Ordering::SeqCst);
            callback(changed);
        });
    }

    /// Commits the session. On success the saved state becomes the new
    /// baseline. Failures are logged and reported as false.
    pub fn save(&self) -> bool {
        self.prepare_save();
        match self.context.save() {
            Ok(applied) => {
                self.finish_save();
                info!(request = %self.request_id(), applied, "edit session saved");
                true
            }
            Err(e) => {
                error!(request = %self.request_id(), error = %e, "edit session save failed");
                false
            }
        }
    }

    /// Drops the pending check and every unsaved change.
    pub fn discard(&self) {
        self.tracker.cancel();
        self.context.rollback();
        self.tracker.flush();
        self.dirty.store(false, Ordering::SeqCst);
        info!(request = %self.request_id(), "edit session discarded");
    }

    fn schedule_check(&self) {
        self.check(|_| {});
    }

    fn attachment_received(&self, data: &TypedId, attachment: &TypedId) {
        self.events.publish(EditEvent::AttachmentReceived {
            data: data.clone(),
            attachment: attachment.clone(),
        });
        self.schedule_check();
    }

    fn prepare_save(&self) {
        self.tracker.cancel();
        if self.context.parent().backend() != Backend::Local {
            return;
        }
        let deleted = self.tracker.tracked_deletions();
        if deleted.is_empty() {
            return;
        }
        if let Err(e) = self.context.perform(|txn| Ok(purge(txn, &deleted))) {
            error!(request = %self.request_id(), error = %e, "purging deletions failed");
        }
    }

    fn finish_save(&self) {
        self.tracker.flush();
        self.dirty.store(false, Ordering::SeqCst);
    }
}

/// Saves two sessions, typically one per back-end, concurrently. Either may
/// fail without affecting the other; `callback` receives true only if both
/// were saved.
pub fn save_sessions(a: &EditSession, b: &EditSession, callback: impl FnOnce(bool)) {
    a.prepare_save();
    b.prepare_save();
    save_joined(&a.context, &b.context, |ok| {
        for session in [a, b] {
            if !session.context.has_changes() {
                session.finish_save();
            }
        }
        callback(ok);
    });
}

fn workspace_of(txn: &Transaction<'_>, id: &TypedId) -> CoreResult<TypedId> {
    txn.get_any(id)
        .filter(|e| !e.is_deleted())
        .map(|e| e.meta().workspace_id().clone())
        .ok_or_else(|| CoreError::not_found(id))
}
