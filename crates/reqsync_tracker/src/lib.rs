//! # reqsync tracker
//!
//! Decides whether an edited request aggregate has diverged from the state
//! it had when editing began.
//!
//! This crate provides:
//! - [`Rescheduler`]: a debounced, id-keyed coalescing timer
//! - [`EditRequestTracker`]: the snapshot diff behind the dirty flag
//! - [`EditSession`]: a child-context edit with events, save and discard
//!
//! ## Example
//!
//! ```
//! use reqsync_core::{Backend, Config, EntityKind, Request, Store, TypedId, Workspace};
//! use reqsync_tracker::{EditSession, Rescheduler, TrackerConfig};
//! use std::sync::Arc;
//!
//! let store = Arc::new(Store::new(Backend::Local, Config::default()));
//! let ws = TypedId::mint(EntityKind::Workspace);
//! let request = TypedId::mint(EntityKind::Request);
//! store
//!     .transaction(|txn| {
//!         txn.create_or_get(&ws, &ws, |m| Workspace::new(m, "Default"))?;
//!         let project = txn.create_project(&ws, "API")?;
//!         let rq = txn.create_or_get(&request, &ws, |m| Request::new(m, project))?;
//!         rq.url = "https://example.test".into();
//!         Ok(())
//!     })
//!     .unwrap();
//!
//! let rescheduler = Arc::new(Rescheduler::new(&TrackerConfig::default()).unwrap());
//! let session = EditSession::open(&store, &request, rescheduler).unwrap();
//! assert!(!session.tracker().is_changed_now());
//! session
//!     .edit::<Request>(&request, "name", |r| r.name = "List users".into())
//!     .unwrap();
//! assert!(session.tracker().is_changed_now());
//! assert!(session.save());
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod config;
pub mod diff;
mod error;
mod rescheduler;
mod session;
mod tracker;

pub use config::TrackerConfig;
pub use diff::{snapshot_of, Baseline, Divergence};
pub use error::{TrackerError, TrackerResult};
pub use rescheduler::Rescheduler;
pub use session::{save_sessions, EditSession};
pub use tracker::EditRequestTracker;
