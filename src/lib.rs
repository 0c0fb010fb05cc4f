//! Local-first list and action orchestration for paginated email summaries.
//!
//! A [`ListController`](app::spawn_list_controller) owns one collection's
//! items, pagination, selection, undo record and sync status. UI code sends
//! commands through a [`ListHandle`] and renders the snapshots it publishes.

pub mod actor;
pub mod app;
pub mod backend;
pub mod config;
pub mod constants;
pub mod error;
pub mod logging;
pub mod mail;

pub use app::state::{ListState, LoadPhase, PendingSyncState, SelectionState, StateError};
pub use app::undo::ActionRecord;
pub use app::{ListHandle, LoadOutcome, spawn_list_controller};
pub use backend::{MailBackend, MemoryBackend, SyncMonitor, SyncOutcome};
pub use config::Config;
pub use error::{CoreError, ErrorKind, Result};
pub use mail::{ActionKind, CollectionKey, EffectClass, EmailFlags, EmailSummary, Folder};
