use std::sync::Arc;

use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;

use crate::app::ListController;
use crate::app::dedup::{self, MergeMode};
use crate::app::event_loop::Completion;
use crate::app::state::{ListState, LoadPhase};
use crate::error::{CoreError, Result};
use crate::mail::{ActionKind, CollectionKey, EmailSummary};

use super::mutation::replay_confirmed;

type LoadReply = oneshot::Sender<Result<LoadOutcome>>;

/// How a page-loading command ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A page was merged into the list
    Loaded { count: usize, has_more: bool },
    /// Nothing to do: same collection, a load already running, or no more pages
    Skipped,
    /// The load was superseded by a collection switch or a refresh
    Stale,
}

/// The single page load allowed at a time
pub(crate) struct InFlightLoad {
    pub(crate) epoch: u64,
    pub(crate) page: usize,
    /// Started by sync rather than by the user
    pub(crate) silent: bool,
    pub(crate) waiters: Vec<LoadReply>,
    /// Mutations confirmed after dispatch; the page may predate them
    pub(crate) confirmed: Vec<(Vec<String>, ActionKind)>,
}

impl ListController {
    pub(crate) fn initialize(&mut self, key: CollectionKey, reply: LoadReply) {
        if self.state.collection.as_ref() == Some(&key) {
            tracing::debug!("Collection {} already shown", key);
            self.reply(reply, Ok(LoadOutcome::Skipped));
            return;
        }

        tracing::info!("Switching list to {}", key);
        self.reset_generation();
        self.state = ListState::for_collection(key);
        self.dirty = true;
        self.dispatch_load(0, false, Some(reply));
    }

    /// Invalidate everything tied to the previous collection
    fn reset_generation(&mut self) {
        self.generation += 1;
        self.generation_token.cancel();
        self.generation_token = CancellationToken::new();
        if let Some(timer) = self.banner.take() {
            timer.cancel();
        }
        self.queued_silent_refresh = false;
        self.abandon_load();
    }

    /// Drop the in-flight load; its waiters learn it went stale
    fn abandon_load(&mut self) {
        if let Some(load) = self.in_flight.take() {
            tracing::debug!("Abandoning load of page {} (epoch {})", load.page, load.epoch);
            for waiter in load.waiters {
                self.reply(waiter, Ok(LoadOutcome::Stale));
            }
        }
    }

    pub(crate) fn load_next_page(&mut self, reply: LoadReply) {
        if self.state.collection.is_none()
            || self.in_flight.is_some()
            || !self.state.has_more_pages()
        {
            self.reply(reply, Ok(LoadOutcome::Skipped));
            return;
        }
        let next = self.state.pagination.page + 1;
        self.state.phase = LoadPhase::LoadingMore;
        self.dirty = true;
        self.dispatch_load(next, false, Some(reply));
    }

    /// Reload from page 0. Supersedes any load already running.
    pub(crate) fn refresh(&mut self, reply: Option<LoadReply>) {
        if self.state.collection.is_none() {
            if let Some(reply) = reply {
                self.reply(reply, Err(CoreError::validation("no collection to refresh")));
            }
            return;
        }
        self.abandon_load();
        self.queued_silent_refresh = false;
        self.state.phase = LoadPhase::Refreshing;
        self.dirty = true;
        self.dispatch_load(0, false, reply);
    }

    /// Reload page 0 without a visible loading transition when items are
    /// already shown. Waits for a running load instead of cancelling it.
    pub(crate) fn silent_refresh(&mut self) {
        if self.state.collection.is_none() {
            return;
        }
        if self.in_flight.is_some() {
            self.queued_silent_refresh = true;
            return;
        }
        if self.state.items.is_empty() {
            self.state.phase = LoadPhase::LoadingFirst;
            self.dirty = true;
        }
        self.dispatch_load(0, true, None);
    }

    fn dispatch_load(&mut self, page: usize, silent: bool, reply: Option<LoadReply>) {
        let Some(key) = self.state.collection.clone() else {
            return;
        };
        self.load_epoch += 1;
        let epoch = self.load_epoch;
        let generation = self.generation;
        let page_size = self.config.list.page_size;
        tracing::debug!("Loading page {} of {} (epoch {})", page, key, epoch);

        self.in_flight = Some(InFlightLoad {
            epoch,
            page,
            silent,
            waiters: reply.into_iter().collect(),
            confirmed: Vec::new(),
        });

        let backend = Arc::clone(&self.backend);
        let completion_tx = self.completion_tx.clone();
        let token = self.generation_token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                result = backend.fetch_page(&key, page, page_size) => {
                    completion_tx
                        .send(Completion::PageLoaded { generation, epoch, page, result })
                        .await
                        .ok();
                }
            }
        });
    }

    pub(crate) fn on_page_loaded(
        &mut self,
        generation: u64,
        epoch: u64,
        page: usize,
        result: Result<Vec<EmailSummary>>,
    ) {
        let current = self
            .in_flight
            .as_ref()
            .is_some_and(|load| load.epoch == epoch);
        if generation != self.generation || !current {
            tracing::debug!("Discarding stale page {} (epoch {})", page, epoch);
            return;
        }
        let Some(load) = self.in_flight.take() else {
            return;
        };

        let outcome = match result {
            Ok(mut emails) => {
                let count = emails.len();
                replay_confirmed(&mut emails, &load.confirmed);
                let has_more = count >= self.config.list.page_size;
                let mode = if page == 0 {
                    MergeMode::Reset
                } else {
                    MergeMode::Append
                };
                let incoming = emails.into_iter().map(Arc::new).collect();
                let (items, _) = dedup::merge(&self.state.items, incoming, mode);

                self.state.items = items;
                self.state.pagination.page = page;
                self.state.pagination.has_more = has_more;
                let items = &self.state.items;
                self.state.selection.retain_present(items);
                if std::mem::take(&mut self.load_error) {
                    self.state.error = None;
                }
                self.state.phase = LoadPhase::Idle;
                tracing::debug!(
                    "Page {} loaded: {} items, {} total, more: {}",
                    page,
                    count,
                    self.state.items.len(),
                    has_more
                );
                Ok(LoadOutcome::Loaded { count, has_more })
            }
            Err(e) => {
                tracing::warn!("Failed to load page {}: {}", page, e);
                if load.silent && !self.state.items.is_empty() {
                    // Keep the list usable; only flag the error
                    self.state.error = Some((&e).into());
                    self.state.phase = LoadPhase::Idle;
                } else {
                    self.state.set_error(&e);
                }
                self.load_error = true;
                Err(e)
            }
        };
        self.dirty = true;

        for waiter in load.waiters {
            self.reply(waiter, outcome.clone());
        }

        if std::mem::take(&mut self.queued_silent_refresh) {
            self.silent_refresh();
        }
    }
}
