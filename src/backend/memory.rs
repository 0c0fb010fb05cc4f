//! In-memory local-first backend
//!
//! Keeps every account's mail in a vector and answers page reads by folder
//! membership. Used by the demo binary and as the test double: failures,
//! latency and duplicate rows can be scripted per call.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::watch;

use super::{MailBackend, SyncMonitor, SyncOutcome};
use crate::error::{CoreError, Result};
use crate::mail::{ActionKind, CollectionKey, EmailSummary, Folder};

/// A recorded `fetch_page` call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchCall {
    pub key: CollectionKey,
    pub page: usize,
    pub page_size: usize,
}

#[derive(Default)]
struct Inner {
    /// account -> mail, in insertion order
    mailboxes: HashMap<String, Vec<EmailSummary>>,
    fetch_failures: VecDeque<CoreError>,
    mutation_failures: VecDeque<CoreError>,
    sync_failures: VecDeque<CoreError>,
    fetch_delays: HashMap<Folder, Duration>,
    fetch_latencies: HashMap<Folder, Duration>,
    mutation_delays: VecDeque<Duration>,
    duplicate_next_page: bool,
    fetches: Vec<FetchCall>,
    mutations: Vec<(Vec<String>, ActionKind)>,
    sync_attempts: u32,
}

pub struct MemoryBackend {
    inner: Mutex<Inner>,
    background_sync: watch::Sender<bool>,
    offline: watch::Sender<bool>,
    pending: AtomicUsize,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        let (background_sync, _) = watch::channel(false);
        let (offline, _) = watch::channel(false);
        Self {
            inner: Mutex::new(Inner::default()),
            background_sync,
            offline,
            pending: AtomicUsize::new(0),
        }
    }

    /// Backend pre-filled with `count` inbox items `id_0..id_{count-1}`, newest first.
    pub fn with_generated(account: &str, count: usize) -> Self {
        let backend = Self::new();
        let base = 1_700_000_000i64;
        let emails = (0..count)
            .map(|i| {
                EmailSummary::new(format!("id_{}", i), base - i as i64)
                    .with_subject(format!("Message {}", i))
            })
            .collect();
        backend.insert(account, emails);
        backend
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Add mail to an account
    pub fn insert(&self, account: &str, emails: Vec<EmailSummary>) {
        self.lock()
            .mailboxes
            .entry(account.to_string())
            .or_default()
            .extend(emails);
    }

    /// Current stored copy of an item
    pub fn get(&self, id: &str) -> Option<EmailSummary> {
        self.lock()
            .mailboxes
            .values()
            .flat_map(|emails| emails.iter())
            .find(|e| e.id == id)
            .cloned()
    }

    pub fn fail_next_fetch(&self, err: CoreError) {
        self.lock().fetch_failures.push_back(err);
    }

    pub fn fail_next_mutation(&self, err: CoreError) {
        self.lock().mutation_failures.push_back(err);
    }

    /// Fail the next `times` sync attempts with `err`
    pub fn fail_next_syncs(&self, times: usize, err: CoreError) {
        let mut inner = self.lock();
        for _ in 0..times {
            inner.sync_failures.push_back(err.clone());
        }
    }

    /// Delay every page read of `folder`
    pub fn set_fetch_delay(&self, folder: Folder, delay: Duration) {
        self.lock().fetch_delays.insert(folder, delay);
    }

    /// Answer page reads of `folder` late, with rows read when the call was made
    pub fn set_fetch_latency(&self, folder: Folder, latency: Duration) {
        self.lock().fetch_latencies.insert(folder, latency);
    }

    /// Delay the next mutation call
    pub fn delay_next_mutation(&self, delay: Duration) {
        self.lock().mutation_delays.push_back(delay);
    }

    /// Repeat rows in the next page, the way a buggy loader would
    pub fn duplicate_next_page(&self) {
        self.lock().duplicate_next_page = true;
    }

    pub fn set_background_syncing(&self, active: bool) {
        self.background_sync.send_replace(active);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.send_replace(offline);
    }

    pub fn set_pending_count(&self, count: usize) {
        self.pending.store(count, Ordering::SeqCst);
    }

    pub fn fetch_calls(&self) -> Vec<FetchCall> {
        self.lock().fetches.clone()
    }

    pub fn mutation_calls(&self) -> Vec<(Vec<String>, ActionKind)> {
        self.lock().mutations.clone()
    }

    pub fn sync_attempts(&self) -> u32 {
        self.lock().sync_attempts
    }

    fn read_page(&self, key: &CollectionKey, page: usize, page_size: usize) -> Result<Vec<EmailSummary>> {
        let mut inner = self.lock();
        inner.fetches.push(FetchCall {
            key: key.clone(),
            page,
            page_size,
        });
        if let Some(err) = inner.fetch_failures.pop_front() {
            return Err(err);
        }

        let mut visible: Vec<&EmailSummary> = inner
            .mailboxes
            .get(&key.account)
            .map(|emails| emails.iter().filter(|e| key.folder.contains(e.flags)).collect())
            .unwrap_or_default();
        visible.sort_by(|a, b| b.date.cmp(&a.date).then_with(|| a.id.cmp(&b.id)));

        let mut page_items: Vec<EmailSummary> = visible
            .into_iter()
            .skip(page.saturating_mul(page_size))
            .take(page_size)
            .cloned()
            .collect();

        if std::mem::take(&mut inner.duplicate_next_page)
            && let Some(first) = page_items.first().cloned()
        {
            page_items.push(first);
        }
        Ok(page_items)
    }

    fn write_mutation(&self, ids: &[String], action: ActionKind) -> Result<()> {
        let mut inner = self.lock();
        inner.mutations.push((ids.to_vec(), action));
        if let Some(err) = inner.mutation_failures.pop_front() {
            return Err(err);
        }

        let wanted: HashSet<&str> = ids.iter().map(String::as_str).collect();
        let found = inner
            .mailboxes
            .values()
            .flat_map(|emails| emails.iter())
            .filter(|e| wanted.contains(e.id.as_str()))
            .count();
        if found != wanted.len() {
            return Err(CoreError::storage(format!(
                "{} of {} items not found",
                wanted.len() - found,
                wanted.len()
            )));
        }

        for email in inner
            .mailboxes
            .values_mut()
            .flat_map(|emails| emails.iter_mut())
            .filter(|e| wanted.contains(e.id.as_str()))
        {
            email.flags = action.apply(email.flags);
        }
        Ok(())
    }

    fn run_sync(&self) -> Result<Vec<SyncOutcome>> {
        let mut inner = self.lock();
        inner.sync_attempts += 1;
        if let Some(err) = inner.sync_failures.pop_front() {
            return Err(err);
        }
        let mut outcomes: Vec<SyncOutcome> = inner
            .mailboxes
            .iter()
            .map(|(account, emails)| SyncOutcome {
                account: account.clone(),
                new_count: 0,
                total: emails.len(),
            })
            .collect();
        outcomes.sort_by(|a, b| a.account.cmp(&b.account));
        Ok(outcomes)
    }
}

/// Stream of changes to a watch channel (the current value is not replayed)
fn watch_stream(rx: watch::Receiver<bool>) -> BoxStream<'static, bool> {
    stream::unfold(rx, |mut rx| async move {
        rx.changed().await.ok()?;
        let value = *rx.borrow_and_update();
        Some((value, rx))
    })
    .boxed()
}

impl MailBackend for MemoryBackend {
    fn fetch_page<'a>(
        &'a self,
        key: &'a CollectionKey,
        page: usize,
        page_size: usize,
    ) -> BoxFuture<'a, Result<Vec<EmailSummary>>> {
        Box::pin(async move {
            let delay = self.lock().fetch_delays.get(&key.folder).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            let result = self.read_page(key, page, page_size);
            let latency = self.lock().fetch_latencies.get(&key.folder).copied();
            if let Some(latency) = latency {
                tokio::time::sleep(latency).await;
            }
            result
        })
    }

    fn mutate<'a>(&'a self, ids: &'a [String], action: ActionKind) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let delay = self.lock().mutation_delays.pop_front();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.write_mutation(ids, action)
        })
    }

    fn sync_remote(&self) -> BoxFuture<'_, Result<Vec<SyncOutcome>>> {
        Box::pin(async move { self.run_sync() })
    }
}

impl SyncMonitor for MemoryBackend {
    fn background_sync_signal(&self) -> BoxStream<'static, bool> {
        watch_stream(self.background_sync.subscribe())
    }

    fn offline_status(&self) -> BoxStream<'static, bool> {
        watch_stream(self.offline.subscribe())
    }

    fn pending_operation_count(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }
}
