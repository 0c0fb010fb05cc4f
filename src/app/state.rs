//! Application state types
//!
//! These are the snapshots published to rendering code. They are only ever
//! changed by the list controller; readers get clones through watch channels.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::backend::SyncOutcome;
use crate::error::{CoreError, ErrorKind};
use crate::mail::{CollectionKey, EmailSummary};

use super::undo::ActionRecord;

/// Pagination state machine
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LoadPhase {
    #[default]
    Idle,
    LoadingFirst,
    LoadingMore,
    Refreshing,
    Error,
}

/// Error as stored in a snapshot: the kind tag plus a message
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StateError {
    pub kind: ErrorKind,
    pub message: String,
}

impl From<&CoreError> for StateError {
    fn from(err: &CoreError) -> Self {
        Self {
            kind: err.kind(),
            message: err.message().to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PaginationState {
    /// Index of the last page merged into the list
    pub page: usize,
    pub has_more: bool,
}

/// Multi-select state
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SelectionState {
    pub active: bool,
    pub ids: HashSet<String>,
}

impl SelectionState {
    /// Start multi-select with a single item
    pub fn enter(&mut self, id: &str) {
        self.active = true;
        self.ids.clear();
        self.ids.insert(id.to_string());
    }

    /// Add or remove an item; an emptied selection leaves multi-select
    pub fn toggle(&mut self, id: &str) {
        if !self.ids.remove(id) {
            self.ids.insert(id.to_string());
            self.active = true;
        }
        if self.ids.is_empty() {
            self.exit();
        }
    }

    pub fn exit(&mut self) {
        self.active = false;
        self.ids.clear();
    }

    pub fn select_all<'a>(&mut self, ids: impl IntoIterator<Item = &'a str>) {
        self.ids = ids.into_iter().map(str::to_string).collect();
        self.active = !self.ids.is_empty();
    }

    pub fn deselect_all(&mut self) {
        self.exit();
    }

    /// Drop selected ids that are no longer displayed
    pub fn retain_present(&mut self, items: &[Arc<EmailSummary>]) {
        if self.ids.is_empty() {
            return;
        }
        let present: HashSet<&str> = items.iter().map(|e| e.id.as_str()).collect();
        self.ids.retain(|id| present.contains(id.as_str()));
        if self.ids.is_empty() {
            self.exit();
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// What the list UI renders
#[derive(Debug, Clone, Default)]
pub struct ListState {
    /// Collection currently shown; `None` until the first `initialize`
    pub collection: Option<CollectionKey>,
    /// Items in load order
    pub items: Vec<Arc<EmailSummary>>,
    pub phase: LoadPhase,
    pub error: Option<StateError>,
    pub pagination: PaginationState,
    pub selection: SelectionState,
    pub last_action: Option<ActionRecord>,
    pub undo_banner_visible: bool,
}

impl ListState {
    /// Fresh state for a newly selected collection
    pub fn for_collection(key: CollectionKey) -> Self {
        Self {
            collection: Some(key),
            phase: LoadPhase::LoadingFirst,
            ..Default::default()
        }
    }

    pub fn is_loading(&self) -> bool {
        matches!(self.phase, LoadPhase::LoadingFirst | LoadPhase::LoadingMore)
    }

    pub fn is_refreshing(&self) -> bool {
        self.phase == LoadPhase::Refreshing
    }

    pub fn has_more_pages(&self) -> bool {
        self.pagination.has_more
    }

    pub fn item(&self, id: &str) -> Option<&EmailSummary> {
        self.items.iter().find(|e| e.id == id).map(|e| e.as_ref())
    }

    pub fn set_error(&mut self, err: &CoreError) {
        self.error = Some(StateError::from(err));
        self.phase = LoadPhase::Error;
    }

    pub fn clear_error(&mut self) {
        self.error = None;
        if self.phase == LoadPhase::Error {
            self.phase = LoadPhase::Idle;
        }
    }
}

/// Sync and offline-queue status
#[derive(Debug, Clone, Default)]
pub struct PendingSyncState {
    /// A user-invoked sync (including its retry backoff) is outstanding
    pub is_syncing: bool,
    /// A background sync reported by the monitor is running
    pub background_syncing: bool,
    pub last_result: Option<Result<Vec<SyncOutcome>, StateError>>,
    pub last_synced_at: Option<DateTime<Utc>>,
    pub is_offline: bool,
    pub pending_count: usize,
}
