//! Scoped event bus for edit sessions.
//!
//! Each edit session owns one bus. UI-originated edits are published here
//! instead of through a process-wide notification center, so only parties
//! holding the session can observe them.

use crate::id::TypedId;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};

/// An event raised while editing an aggregate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EditEvent {
    /// A field of an entity was edited.
    FieldChanged {
        /// Edited entity.
        entity: TypedId,
        /// Name of the edited field.
        field: String,
    },
    /// A file or image was attached to a request data field.
    AttachmentReceived {
        /// The request data field.
        data: TypedId,
        /// The new file or image.
        attachment: TypedId,
    },
    /// An entity was deleted during the session.
    EntityDeleted {
        /// The deleted entity.
        entity: TypedId,
    },
}

impl EditEvent {
    /// The entity the event is about.
    #[must_use]
    pub fn entity(&self) -> &TypedId {
        match self {
            EditEvent::FieldChanged { entity, .. } | EditEvent::EntityDeleted { entity } => entity,
            EditEvent::AttachmentReceived { data, .. } => data,
        }
    }
}

/// Distributes [`EditEvent`]s to subscribers in publish order.
#[derive(Default)]
pub struct EventBus {
    subscribers: RwLock<Vec<Sender<EditEvent>>>,
    published: AtomicU64,
}

impl EventBus {
    /// Creates a bus with no subscribers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to all future events.
    pub fn subscribe(&self) -> Receiver<EditEvent> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Sends `event` to every live subscriber. Disconnected subscribers are
    /// dropped.
    pub fn publish(&self, event: EditEvent) {
        self.published.fetch_add(1, Ordering::Relaxed);
        self.subscribers
            .write()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Number of events published so far.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }
}
