use std::sync::Arc;

use chrono::Utc;
use tokio::sync::oneshot;

use crate::actor::with_retry_when;
use crate::app::ListController;
use crate::app::event_loop::Completion;
use crate::backend::SyncOutcome;
use crate::error::{CoreError, Result};

impl ListController {
    /// Start a sync, or join the one already running
    pub(crate) fn sync_now(&mut self, reply: oneshot::Sender<Result<Vec<SyncOutcome>>>) {
        self.sync_waiters.push(reply);
        if self.sync.is_syncing {
            tracing::debug!("Sync already running, joining it");
            return;
        }

        self.sync.is_syncing = true;
        self.sync_dirty = true;

        let backend = Arc::clone(&self.backend);
        let retry = self.config.sync.retry_config();
        let completion_tx = self.completion_tx.clone();
        tokio::spawn(async move {
            let result =
                with_retry_when(&retry, || backend.sync_remote(), CoreError::is_retryable).await;
            completion_tx.send(Completion::Synced { result }).await.ok();
        });
    }

    pub(crate) fn on_synced(&mut self, result: Result<Vec<SyncOutcome>>) {
        self.sync.is_syncing = false;
        match &result {
            Ok(outcomes) => {
                let new: usize = outcomes.iter().map(|o| o.new_count).sum();
                tracing::info!("Sync complete: {} accounts, {} new", outcomes.len(), new);
                self.sync.last_result = Some(Ok(outcomes.clone()));
                self.sync.last_synced_at = Some(Utc::now());
                self.silent_refresh();
            }
            Err(e) => {
                tracing::warn!("Sync failed: {}", e);
                self.sync.last_result = Some(Err(e.into()));
            }
        }
        self.sync_dirty = true;

        for waiter in std::mem::take(&mut self.sync_waiters) {
            self.reply(waiter, result.clone());
        }
    }

    /// A finished background sync reloads a populated list
    pub(crate) fn on_background_sync(&mut self, active: bool) {
        if self.sync.background_syncing != active {
            self.sync.background_syncing = active;
            self.sync_dirty = true;
        }
        if !active && !self.state.items.is_empty() {
            tracing::debug!("Background sync finished, refreshing list");
            self.silent_refresh();
        }
    }

    pub(crate) fn on_offline(&mut self, offline: bool) {
        if self.sync.is_offline != offline {
            tracing::info!("Connectivity changed: offline={}", offline);
            self.sync.is_offline = offline;
            self.sync_dirty = true;
        }
    }

    pub(crate) fn poll_pending_count(&mut self) {
        let count = self.monitor.pending_operation_count();
        if self.sync.pending_count != count {
            self.sync.pending_count = count;
            self.sync_dirty = true;
        }
    }
}
