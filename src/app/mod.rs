//! List controller - single owner of one collection's list and sync state
//!
//! All state changes run on one task. Page reads, mutations and syncs run
//! elsewhere and report back through the completion channel, so their
//! results are folded in one at a time. Rendering code talks to the
//! controller only through [`ListHandle`].

mod actions;
pub mod dedup;
mod event_loop;
pub mod state;
pub mod undo;

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio_util::sync::CancellationToken;

use crate::backend::{MailBackend, SyncMonitor, SyncOutcome};
use crate::config::Config;
use crate::constants::{COMMAND_CHANNEL_CAPACITY, COMPLETION_CHANNEL_CAPACITY};
use crate::error::{CoreError, Result};
use crate::mail::{ActionKind, CollectionKey};

use actions::{InFlightLoad, MutationJob, mutation_worker};
use event_loop::{Command, Completion, SelectionOp};
use state::{ListState, PendingSyncState};
use undo::BannerTimer;

pub use actions::LoadOutcome;

type Deferred = Box<dyn FnOnce() + Send>;

pub(crate) struct ListController {
    pub(crate) config: Config,
    pub(crate) backend: Arc<dyn MailBackend>,
    pub(crate) monitor: Arc<dyn SyncMonitor>,
    pub(crate) state: ListState,
    pub(crate) sync: PendingSyncState,
    /// Bumped on every collection switch; completions from older generations are dropped
    pub(crate) generation: u64,
    /// Cancelled on every collection switch; parent of all per-collection timers and loads
    pub(crate) generation_token: CancellationToken,
    /// Bumped on every page dispatch; only the newest load may land
    pub(crate) load_epoch: u64,
    pub(crate) in_flight: Option<InFlightLoad>,
    /// A silent refresh requested while another load was running
    pub(crate) queued_silent_refresh: bool,
    pub(crate) undo_in_flight: bool,
    /// `state.error` came from a page load, so the next good load clears it
    pub(crate) load_error: bool,
    pub(crate) action_seq: u64,
    pub(crate) banner: Option<BannerTimer>,
    pub(crate) sync_waiters: Vec<oneshot::Sender<Result<Vec<SyncOutcome>>>>,
    pub(crate) mutation_tx: mpsc::UnboundedSender<MutationJob>,
    pub(crate) completion_tx: mpsc::Sender<Completion>,
    /// Replies held back until the state they describe is published
    deferred: Vec<Deferred>,
    /// Dirty flags: publish only what changed
    pub(crate) dirty: bool,
    pub(crate) sync_dirty: bool,
    state_tx: watch::Sender<ListState>,
    sync_tx: watch::Sender<PendingSyncState>,
}

/// Spawn the controller task and return a handle to control it.
pub fn spawn_list_controller(
    backend: Arc<dyn MailBackend>,
    monitor: Arc<dyn SyncMonitor>,
    config: Config,
) -> ListHandle {
    let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
    let (completion_tx, completion_rx) = mpsc::channel(COMPLETION_CHANNEL_CAPACITY);
    let (mutation_tx, mutation_rx) = mpsc::unbounded_channel();

    let sync = PendingSyncState {
        pending_count: monitor.pending_operation_count(),
        ..Default::default()
    };
    let (state_tx, state_rx) = watch::channel(ListState::default());
    let (sync_tx, sync_rx) = watch::channel(sync.clone());

    let background = monitor.background_sync_signal();
    let offline = monitor.offline_status();

    tokio::spawn(mutation_worker(
        Arc::clone(&backend),
        mutation_rx,
        completion_tx.clone(),
    ));

    let controller = ListController {
        config,
        backend,
        monitor,
        state: ListState::default(),
        sync,
        generation: 0,
        generation_token: CancellationToken::new(),
        load_epoch: 0,
        in_flight: None,
        queued_silent_refresh: false,
        undo_in_flight: false,
        load_error: false,
        action_seq: 0,
        banner: None,
        sync_waiters: Vec::new(),
        mutation_tx,
        completion_tx,
        deferred: Vec::new(),
        dirty: false,
        sync_dirty: false,
        state_tx,
        sync_tx,
    };
    tokio::spawn(controller.run(cmd_rx, completion_rx, background, offline));

    ListHandle {
        cmd_tx,
        state_rx,
        sync_rx,
    }
}

impl ListController {
    /// Queue a reply to be sent after the next publish
    pub(crate) fn reply<T: Send + 'static>(&mut self, tx: oneshot::Sender<T>, value: T) {
        self.deferred.push(Box::new(move || {
            tx.send(value).ok();
        }));
    }

    /// Push changed snapshots to subscribers, then release held replies
    pub(crate) fn publish(&mut self) {
        if self.dirty {
            self.state_tx.send_replace(self.state.clone());
            self.dirty = false;
        }
        if self.sync_dirty {
            self.sync_tx.send_replace(self.sync.clone());
            self.sync_dirty = false;
        }
        for reply in self.deferred.drain(..) {
            reply();
        }
    }

    /// Cancel timers and loads and fail everything still waiting
    pub(crate) fn stop(&mut self) {
        self.generation_token.cancel();
        if let Some(timer) = self.banner.take() {
            timer.cancel();
        }
        if let Some(load) = self.in_flight.take() {
            for waiter in load.waiters {
                self.reply(waiter, Err(CoreError::controller_stopped()));
            }
        }
        for waiter in std::mem::take(&mut self.sync_waiters) {
            self.reply(waiter, Err(CoreError::controller_stopped()));
        }
        self.sync.is_syncing = false;
        self.sync_dirty = true;
    }
}

/// Handle for controlling a list controller. Cheap to clone.
#[derive(Clone)]
pub struct ListHandle {
    cmd_tx: mpsc::Sender<Command>,
    state_rx: watch::Receiver<ListState>,
    sync_rx: watch::Receiver<PendingSyncState>,
}

impl ListHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| CoreError::controller_stopped())?;
        rx.await.map_err(|_| CoreError::controller_stopped())
    }

    /// Latest list snapshot
    pub fn state(&self) -> ListState {
        self.state_rx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListState> {
        self.state_rx.clone()
    }

    /// Latest sync snapshot
    pub fn sync_state(&self) -> PendingSyncState {
        self.sync_rx.borrow().clone()
    }

    pub fn subscribe_sync(&self) -> watch::Receiver<PendingSyncState> {
        self.sync_rx.clone()
    }

    /// Show `key`. A different key resets the list and loads its first page;
    /// the same key is a no-op.
    pub async fn initialize(&self, key: CollectionKey) -> Result<LoadOutcome> {
        self.request(|reply| Command::Initialize { key, reply })
            .await?
    }

    /// Reload from page 0. Resolves when the reload settles.
    pub async fn refresh(&self) -> Result<LoadOutcome> {
        self.request(|reply| Command::Refresh { reply }).await?
    }

    pub async fn load_next_page(&self) -> Result<LoadOutcome> {
        self.request(|reply| Command::LoadNextPage { reply })
            .await?
    }

    /// Apply `kind` to `ids`. Resolves once the backend answered and the
    /// list reflects the outcome.
    pub async fn perform_action(&self, ids: Vec<String>, kind: ActionKind) -> Result<()> {
        self.request(|reply| Command::PerformAction { ids, kind, reply })
            .await?
    }

    /// Apply `kind` to every selected item
    pub async fn perform_on_selection(&self, kind: ActionKind) -> Result<()> {
        self.request(|reply| Command::PerformOnSelection { kind, reply })
            .await?
    }

    /// Reverse the most recent undoable action
    pub async fn undo(&self) -> Result<()> {
        self.request(|reply| Command::Undo { reply }).await?
    }

    pub async fn enter_multi_select(&self, id: impl Into<String>) -> Result<()> {
        self.select(SelectionOp::Enter(id.into())).await
    }

    pub async fn toggle_selection(&self, id: impl Into<String>) -> Result<()> {
        self.select(SelectionOp::Toggle(id.into())).await
    }

    pub async fn exit_multi_select(&self) -> Result<()> {
        self.select(SelectionOp::Exit).await
    }

    pub async fn select_all(&self) -> Result<()> {
        self.select(SelectionOp::SelectAll).await
    }

    pub async fn deselect_all(&self) -> Result<()> {
        self.select(SelectionOp::DeselectAll).await
    }

    async fn select(&self, op: SelectionOp) -> Result<()> {
        self.request(|reply| Command::Select { op, reply }).await
    }

    pub async fn dismiss_error(&self) -> Result<()> {
        self.request(|reply| Command::DismissError { reply })
            .await
    }

    /// Sync with bounded backoff. Joins a sync that is already running.
    pub async fn sync_now(&self) -> Result<Vec<SyncOutcome>> {
        self.request(|reply| Command::SyncNow { reply }).await?
    }

    /// Stop the controller; outstanding requests fail
    pub async fn shutdown(&self) -> Result<()> {
        self.request(|reply| Command::Shutdown { reply }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use tokio::time::Instant;

    use crate::backend::MemoryBackend;
    use crate::error::ErrorKind;
    use crate::mail::{EmailFlags, EmailSummary, Folder};
    use super::state::LoadPhase;

    fn inbox() -> CollectionKey {
        CollectionKey::new("acct1", Folder::Inbox)
    }

    fn spawn_with(backend: &Arc<MemoryBackend>, config: Config) -> ListHandle {
        spawn_list_controller(backend.clone(), backend.clone(), config)
    }

    fn spawn(backend: &Arc<MemoryBackend>) -> ListHandle {
        spawn_with(backend, Config::default())
    }

    fn ids(state: &ListState) -> Vec<String> {
        state.items.iter().map(|e| e.id.clone()).collect()
    }

    fn strings(ids: &[&str]) -> Vec<String> {
        ids.iter().map(|id| id.to_string()).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_example_scenario() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 62));
        let handle = spawn(&backend);

        let first = handle.initialize(inbox()).await.unwrap();
        assert_eq!(first, LoadOutcome::Loaded { count: 50, has_more: true });
        let state = handle.state();
        assert_eq!(state.items.len(), 50);
        assert!(state.has_more_pages());
        assert_eq!(state.phase, LoadPhase::Idle);

        let next = handle.load_next_page().await.unwrap();
        assert_eq!(next, LoadOutcome::Loaded { count: 12, has_more: false });
        assert_eq!(handle.state().items.len(), 62);

        handle
            .perform_action(strings(&["id_7"]), ActionKind::Star)
            .await
            .unwrap();
        let state = handle.state();
        assert!(state.item("id_7").unwrap().is_starred());
        let record = state.last_action.as_ref().unwrap();
        assert_eq!(record.kind, ActionKind::Star);
        assert_eq!(record.ids, strings(&["id_7"]));
        assert!(record.undoable);
        assert!(state.undo_banner_visible);

        handle.undo().await.unwrap();
        assert_eq!(
            backend.mutation_calls().last(),
            Some(&(strings(&["id_7"]), ActionKind::Unstar))
        );
        let state = handle.state();
        assert!(state.last_action.is_none());
        assert!(!state.undo_banner_visible);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.phase == LoadPhase::Idle).await.unwrap();
        let state = handle.state();
        assert!(!state.item("id_7").unwrap().is_starred());
        assert_eq!(state.items.len(), 50);
        assert_eq!(backend.fetch_calls().last().map(|c| c.page), Some(0));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_key_is_noop() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);

        handle.initialize(inbox()).await.unwrap();
        let again = handle.initialize(inbox()).await.unwrap();
        assert_eq!(again, LoadOutcome::Skipped);
        assert_eq!(backend.fetch_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_pagination_terminates_on_short_page() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 25));
        let mut config = Config::default();
        config.list.page_size = 10;
        let handle = spawn_with(&backend, config);

        handle.initialize(inbox()).await.unwrap();
        handle.load_next_page().await.unwrap();
        let last = handle.load_next_page().await.unwrap();
        assert_eq!(last, LoadOutcome::Loaded { count: 5, has_more: false });
        assert_eq!(handle.state().items.len(), 25);

        assert_eq!(handle.load_next_page().await.unwrap(), LoadOutcome::Skipped);
        let pages: Vec<usize> = backend.fetch_calls().iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![0, 1, 2]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_next_page_refused_while_first_page_loads() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 80));
        backend.set_fetch_delay(Folder::Inbox, Duration::from_secs(1));
        let handle = spawn(&backend);

        let (first, next) = tokio::join!(handle.initialize(inbox()), handle.load_next_page());
        assert!(matches!(first.unwrap(), LoadOutcome::Loaded { count: 50, .. }));
        assert_eq!(next.unwrap(), LoadOutcome::Skipped);
        assert_eq!(backend.fetch_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_switching_collection_discards_stale_load() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 5));
        backend.insert(
            "acct1",
            vec![EmailSummary::new("arch_0", 1).with_flags(EmailFlags::ARCHIVED)],
        );
        backend.set_fetch_delay(Folder::Inbox, Duration::from_secs(2));
        let handle = spawn(&backend);
        let archive = CollectionKey::new("acct1", Folder::Archive);

        let (old, new) = tokio::join!(
            handle.initialize(inbox()),
            handle.initialize(archive.clone())
        );
        assert_eq!(old.unwrap(), LoadOutcome::Stale);
        assert_eq!(new.unwrap(), LoadOutcome::Loaded { count: 1, has_more: false });

        tokio::time::sleep(Duration::from_secs(3)).await;
        let state = handle.state();
        assert_eq!(state.collection, Some(archive));
        assert_eq!(ids(&state), strings(&["arch_0"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_flag_covers_whole_reload() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        backend.set_fetch_delay(Folder::Inbox, Duration::from_secs(1));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let refresher = handle.clone();
        let task = tokio::spawn(async move { refresher.refresh().await });

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.is_refreshing()).await.unwrap();
        assert_eq!(handle.state().items.len(), 3);

        let outcome = task.await.unwrap().unwrap();
        assert_eq!(outcome, LoadOutcome::Loaded { count: 3, has_more: false });
        assert_eq!(handle.state().phase, LoadPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_load_failure_keeps_items_until_retry() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 60));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        backend.fail_next_fetch(CoreError::network("timed out"));
        let err = handle.load_next_page().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Network);

        let state = handle.state();
        assert_eq!(state.items.len(), 50);
        assert_eq!(state.phase, LoadPhase::Error);
        assert_eq!(state.error.as_ref().map(|e| e.kind), Some(ErrorKind::Network));

        handle.dismiss_error().await.unwrap();
        let state = handle.state();
        assert!(state.error.is_none());
        assert_eq!(state.phase, LoadPhase::Idle);

        let retry = handle.load_next_page().await.unwrap();
        assert_eq!(retry, LoadOutcome::Loaded { count: 10, has_more: false });
        assert_eq!(handle.state().items.len(), 60);
    }

    #[tokio::test(start_paused = true)]
    async fn test_duplicate_rows_are_dropped() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 5));
        backend.duplicate_next_page();
        let handle = spawn(&backend);

        handle.initialize(inbox()).await.unwrap();
        let state = handle.state();
        assert_eq!(ids(&state), strings(&["id_0", "id_1", "id_2", "id_3", "id_4"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_batch_leaves_list_identical() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 5));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();
        let before = handle.state();

        backend.fail_next_mutation(CoreError::storage("disk full"));
        let err = handle
            .perform_action(strings(&["id_0", "id_1", "id_2"]), ActionKind::Delete)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);

        let after = handle.state();
        assert_eq!(after.items.len(), before.items.len());
        for (a, b) in after.items.iter().zip(&before.items) {
            assert!(Arc::ptr_eq(a, b));
        }
        assert!(after.last_action.is_none());
        assert_eq!(after.error.as_ref().map(|e| e.kind), Some(ErrorKind::Storage));

        // Unknown ids fail the whole batch in the backend
        let err = handle
            .perform_action(strings(&["id_0", "ghost"]), ActionKind::Delete)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Storage);
        assert_eq!(handle.state().items.len(), 5);

        handle
            .perform_action(strings(&["id_0", "id_1", "id_2"]), ActionKind::Delete)
            .await
            .unwrap();
        let state = handle.state();
        assert_eq!(ids(&state), strings(&["id_3", "id_4"]));
        let record = state.last_action.as_ref().unwrap();
        assert_eq!(record.kind, ActionKind::Delete);
        assert_eq!(record.ids.len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_toggle_touches_only_targets_and_is_stable() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();
        let before = handle.state();

        handle
            .perform_action(strings(&["id_1"]), ActionKind::Star)
            .await
            .unwrap();
        let first = handle.state();
        assert!(Arc::ptr_eq(&first.items[0], &before.items[0]));
        assert!(Arc::ptr_eq(&first.items[2], &before.items[2]));
        assert!(first.items[1].is_starred());

        handle
            .perform_action(strings(&["id_1"]), ActionKind::Star)
            .await
            .unwrap();
        let second = handle.state();
        assert_eq!(backend.mutation_calls().len(), 2);
        assert!(Arc::ptr_eq(&second.items[1], &first.items[1]));
        assert_eq!(ids(&second), ids(&first));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_action_is_rejected() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let err = handle
            .perform_action(Vec::new(), ActionKind::Archive)
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(backend.mutation_calls().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_overlapping_mutations_apply_in_order() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        backend.delay_next_mutation(Duration::from_secs(1));
        let (star, unstar) = tokio::join!(
            handle.perform_action(strings(&["id_0"]), ActionKind::Star),
            handle.perform_action(strings(&["id_0"]), ActionKind::Unstar),
        );
        star.unwrap();
        unstar.unwrap();

        let state = handle.state();
        assert!(!state.item("id_0").unwrap().is_starred());
        assert!(!backend.get("id_0").unwrap().is_starred());
        assert_eq!(state.last_action.as_ref().map(|r| r.kind), Some(ActionKind::Unstar));
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_hides_but_record_stays() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        handle
            .perform_action(strings(&["id_0"]), ActionKind::Archive)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(handle.state().undo_banner_visible);

        tokio::time::sleep(Duration::from_millis(200)).await;
        let state = handle.state();
        assert!(!state.undo_banner_visible);
        assert!(state.last_action.is_some());

        // The window only governs the banner
        handle.undo().await.unwrap();
        assert_eq!(
            backend.mutation_calls().last(),
            Some(&(strings(&["id_0"]), ActionKind::Unarchive))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_new_action_restarts_banner() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        handle
            .perform_action(strings(&["id_0"]), ActionKind::Star)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        handle
            .perform_action(strings(&["id_1"]), ActionKind::Archive)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;

        let state = handle.state();
        assert!(state.undo_banner_visible);
        assert_eq!(state.last_action.as_ref().map(|r| r.kind), Some(ActionKind::Archive));

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!handle.state().undo_banner_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_rejected_without_undoable_record() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let err = handle.undo().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        handle
            .perform_action(strings(&["id_0"]), ActionKind::MarkRead)
            .await
            .unwrap();
        let state = handle.state();
        assert!(!state.undo_banner_visible);
        assert!(!state.last_action.as_ref().unwrap().undoable);

        let err = handle.undo().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.mutation_calls().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_undo_keeps_record() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();
        handle
            .perform_action(strings(&["id_2"]), ActionKind::Delete)
            .await
            .unwrap();

        backend.fail_next_mutation(CoreError::network("offline"));
        assert!(handle.undo().await.is_err());
        let state = handle.state();
        assert_eq!(state.last_action.as_ref().map(|r| r.kind), Some(ActionKind::Delete));
        assert!(state.error.is_some());

        handle.undo().await.unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.phase == LoadPhase::Idle).await.unwrap();
        let state = handle.state();
        assert!(state.last_action.is_none());
        assert!(state.item("id_2").is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_batch_flow() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 5));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let err = handle.perform_on_selection(ActionKind::Archive).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);

        handle.enter_multi_select("id_3").await.unwrap();
        handle.toggle_selection("id_1").await.unwrap();
        let selection = handle.state().selection;
        assert!(selection.active);
        assert_eq!(selection.len(), 2);

        handle.perform_on_selection(ActionKind::Archive).await.unwrap();
        let state = handle.state();
        assert_eq!(ids(&state), strings(&["id_0", "id_2", "id_4"]));
        assert!(!state.selection.active);
        assert!(state.selection.is_empty());
        assert_eq!(
            state.last_action.as_ref().map(|r| r.ids.clone()),
            Some(strings(&["id_1", "id_3"]))
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_selection_transitions() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        handle.enter_multi_select("id_0").await.unwrap();
        handle.toggle_selection("id_0").await.unwrap();
        assert!(!handle.state().selection.active);

        handle.toggle_selection("missing").await.unwrap();
        assert!(!handle.state().selection.active);

        handle.select_all().await.unwrap();
        assert_eq!(handle.state().selection.len(), 3);
        handle.deselect_all().await.unwrap();
        assert!(!handle.state().selection.active);

        handle.enter_multi_select("id_1").await.unwrap();
        handle.exit_multi_select().await.unwrap();
        assert!(handle.state().selection.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_removal_prunes_selection() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        handle.enter_multi_select("id_0").await.unwrap();
        handle.toggle_selection("id_1").await.unwrap();
        handle
            .perform_action(strings(&["id_0"]), ActionKind::Delete)
            .await
            .unwrap();

        let selection = handle.state().selection;
        assert!(selection.active);
        assert!(selection.contains("id_1"));
        assert!(!selection.contains("id_0"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_retries_with_backoff() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        backend.fail_next_syncs(2, CoreError::network("unreachable"));
        let handle = spawn(&backend);

        let start = Instant::now();
        let outcomes = handle.sync_now().await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(outcomes.len(), 1);
        assert_eq!(backend.sync_attempts(), 3);
        assert!(elapsed >= Duration::from_millis(3000));
        assert!(elapsed < Duration::from_millis(3100));

        let sync = handle.sync_state();
        assert!(!sync.is_syncing);
        assert!(matches!(sync.last_result, Some(Ok(_))));
        assert!(sync.last_synced_at.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_surfaces_last_failure() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        for attempt in 1..=3 {
            backend.fail_next_syncs(1, CoreError::network(format!("attempt {}", attempt)));
        }
        let handle = spawn(&backend);

        let err = handle.sync_now().await.unwrap_err();
        assert_eq!(err.message(), "attempt 3");
        assert_eq!(backend.sync_attempts(), 3);

        let sync = handle.sync_state();
        match sync.last_result {
            Some(Err(e)) => assert_eq!(e.message, "attempt 3"),
            other => panic!("unexpected sync result: {:?}", other),
        }
        assert!(sync.last_synced_at.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_retries_auth_failures() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        backend.fail_next_syncs(1, CoreError::auth("token expired"));
        let handle = spawn(&backend);

        handle.sync_now().await.unwrap();
        assert_eq!(backend.sync_attempts(), 2);

        backend.fail_next_syncs(3, CoreError::auth("token revoked"));
        let err = handle.sync_now().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Auth);
        assert_eq!(backend.sync_attempts(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_validation_failure_not_retried() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        backend.fail_next_syncs(1, CoreError::validation("bad account config"));
        let handle = spawn(&backend);

        let err = handle.sync_now().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(backend.sync_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_refresh_keeps_confirmed_actions() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        // Rows are read when the refresh starts and arrive 2 s later
        backend.set_fetch_latency(Folder::Inbox, Duration::from_secs(2));
        let refresher = handle.clone();
        let refresh = tokio::spawn(async move { refresher.refresh().await });
        tokio::time::sleep(Duration::from_millis(100)).await;

        handle
            .perform_action(strings(&["id_1"]), ActionKind::Star)
            .await
            .unwrap();
        handle
            .perform_action(strings(&["id_2"]), ActionKind::Archive)
            .await
            .unwrap();
        assert!(handle.state().item("id_1").unwrap().is_starred());

        let outcome = refresh.await.unwrap().unwrap();
        assert!(matches!(outcome, LoadOutcome::Loaded { .. }));
        let state = handle.state();
        assert!(state.item("id_1").unwrap().is_starred());
        assert!(state.item("id_2").is_none());
        assert_eq!(ids(&state), strings(&["id_0", "id_1"]));
        assert!(backend.get("id_1").unwrap().is_starred());
    }

    #[tokio::test(start_paused = true)]
    async fn test_undo_restores_flags_for_every_undoable_kind() {
        for kind in ActionKind::ALL.into_iter().filter(|k| k.is_undoable()) {
            let initial = kind.inverse().unwrap().apply(EmailFlags::empty());
            let folder = if initial.contains(EmailFlags::DELETED) {
                Folder::Trash
            } else if initial.contains(EmailFlags::ARCHIVED) {
                Folder::Archive
            } else {
                Folder::Inbox
            };

            let backend = Arc::new(MemoryBackend::new());
            backend.insert(
                "acct1",
                vec![
                    EmailSummary::new("target", 2).with_flags(initial),
                    EmailSummary::new("bystander", 1).with_flags(initial),
                ],
            );
            let handle = spawn(&backend);
            handle
                .initialize(CollectionKey::new("acct1", folder))
                .await
                .unwrap();

            handle
                .perform_action(strings(&["target"]), kind)
                .await
                .unwrap();
            assert_ne!(backend.get("target").unwrap().flags, initial, "{}", kind);

            handle.undo().await.unwrap();
            let mut rx = handle.subscribe();
            rx.wait_for(|s| s.phase == LoadPhase::Idle).await.unwrap();

            let state = handle.state();
            assert_eq!(backend.get("target").unwrap().flags, initial, "{}", kind);
            assert_eq!(state.item("target").map(|e| e.flags), Some(initial), "{}", kind);
            assert_eq!(state.item("bystander").map(|e| e.flags), Some(initial), "{}", kind);
            assert!(state.last_action.is_none(), "{}", kind);

            handle.shutdown().await.unwrap();
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_only_load_errors_clear_on_next_load() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        backend.fail_next_mutation(CoreError::storage("disk full"));
        assert!(
            handle
                .perform_action(strings(&["id_0"]), ActionKind::Star)
                .await
                .is_err()
        );

        backend.insert("acct1", vec![EmailSummary::new("fresh", i64::MAX)]);
        handle.sync_now().await.unwrap();
        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.item("fresh").is_some()).await.unwrap();
        assert_eq!(
            handle.state().error.map(|e| e.kind),
            Some(ErrorKind::Storage)
        );

        handle.dismiss_error().await.unwrap();
        backend.fail_next_fetch(CoreError::network("timed out"));
        assert!(handle.refresh().await.is_err());
        assert_eq!(
            handle.state().error.map(|e| e.kind),
            Some(ErrorKind::Network)
        );

        handle.refresh().await.unwrap();
        let state = handle.state();
        assert!(state.error.is_none());
        assert_eq!(state.phase, LoadPhase::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_syncs_share_one_run() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        backend.fail_next_syncs(1, CoreError::network("flaky"));
        let handle = spawn(&backend);

        let (a, b) = tokio::join!(handle.sync_now(), handle.sync_now());
        assert_eq!(a.unwrap(), b.unwrap());
        assert_eq!(backend.sync_attempts(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_success_refreshes_silently() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        backend.insert("acct1", vec![EmailSummary::new("fresh", i64::MAX)]);
        handle.sync_now().await.unwrap();
        assert_eq!(handle.state().phase, LoadPhase::Idle);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.item("fresh").is_some()).await.unwrap();
        assert_eq!(handle.state().items[0].id, "fresh");
    }

    #[tokio::test(start_paused = true)]
    async fn test_background_sync_finish_refreshes() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let mut sync_rx = handle.subscribe_sync();
        backend.set_background_syncing(true);
        sync_rx.wait_for(|s| s.background_syncing).await.unwrap();

        backend.insert("acct1", vec![EmailSummary::new("fresh", i64::MAX)]);
        backend.set_background_syncing(false);

        let mut rx = handle.subscribe();
        rx.wait_for(|s| s.item("fresh").is_some()).await.unwrap();
        assert!(!handle.sync_state().background_syncing);
        assert_eq!(backend.fetch_calls().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_offline_and_pending_count_are_reflected() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        let mut sync_rx = handle.subscribe_sync();
        backend.set_offline(true);
        sync_rx.wait_for(|s| s.is_offline).await.unwrap();

        backend.set_pending_count(4);
        tokio::time::sleep(Duration::from_secs(6)).await;
        assert_eq!(handle.sync_state().pending_count, 4);

        // Mutations re-read the count right away
        backend.set_pending_count(5);
        handle
            .perform_action(strings(&["id_0"]), ActionKind::MarkRead)
            .await
            .unwrap();
        assert_eq!(handle.sync_state().pending_count, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_stops_controller() {
        let backend = Arc::new(MemoryBackend::with_generated("acct1", 3));
        let handle = spawn(&backend);
        handle.initialize(inbox()).await.unwrap();

        handle.shutdown().await.unwrap();
        let err = handle.refresh().await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unknown);
    }
}
