//! Collaborators the list controller consumes.
//!
//! The controller never touches storage or the network directly; it only
//! sees these use-case shaped calls. Implementations decide how a page is
//! read, how a mutation is persisted and queued, and how sync is performed.

mod memory;

use futures::future::BoxFuture;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::mail::{ActionKind, CollectionKey, EmailSummary};

pub use memory::MemoryBackend;

/// Result of syncing one account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub account: String,
    pub new_count: usize,
    pub total: usize,
}

/// Page reads, mutations and remote sync.
pub trait MailBackend: Send + Sync {
    /// Read at most `page_size` items of `key` starting at `page * page_size`.
    /// A short page means the end of the collection.
    fn fetch_page<'a>(
        &'a self,
        key: &'a CollectionKey,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'a, Result<Vec<EmailSummary>>>;

    /// Apply one action to all `ids`. A single id uses the same contract as a
    /// batch of size one. Either every id is changed or none is.
    fn mutate<'a>(&'a self, ids: &'a [String], action: ActionKind) -> BoxFuture<'a, Result<()>>;

    /// Reconcile local and remote state for every account.
    fn sync_remote(&self) -> BoxFuture<'_, Result<Vec<SyncOutcome>>>;
}

/// Signals about background sync and the offline queue.
pub trait SyncMonitor: Send + Sync {
    /// Emits `true` while a background sync runs; a transition to `false`
    /// means it finished.
    fn background_sync_signal(&self) -> BoxStream<'static, bool>;

    /// Emits `true` while the device is offline.
    fn offline_status(&self) -> BoxStream<'static, bool>;

    /// Number of operations queued for later transmission.
    fn pending_operation_count(&self) -> usize;
}
