use futures::StreamExt;
use futures::stream::BoxStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::MissedTickBehavior;

use crate::backend::SyncOutcome;
use crate::error::Result;
use crate::mail::{ActionKind, CollectionKey, EmailSummary};

use super::ListController;
use super::actions::{LoadOutcome, MutationJob};

/// Requests sent by [`super::ListHandle`]
pub(crate) enum Command {
    Initialize {
        key: CollectionKey,
        reply: oneshot::Sender<Result<LoadOutcome>>,
    },
    Refresh {
        reply: oneshot::Sender<Result<LoadOutcome>>,
    },
    LoadNextPage {
        reply: oneshot::Sender<Result<LoadOutcome>>,
    },
    PerformAction {
        ids: Vec<String>,
        kind: ActionKind,
        reply: oneshot::Sender<Result<()>>,
    },
    PerformOnSelection {
        kind: ActionKind,
        reply: oneshot::Sender<Result<()>>,
    },
    Undo {
        reply: oneshot::Sender<Result<()>>,
    },
    Select {
        op: SelectionOp,
        reply: oneshot::Sender<()>,
    },
    DismissError {
        reply: oneshot::Sender<()>,
    },
    SyncNow {
        reply: oneshot::Sender<Result<Vec<SyncOutcome>>>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum SelectionOp {
    Enter(String),
    Toggle(String),
    Exit,
    SelectAll,
    DeselectAll,
}

/// Results of work running outside the controller task
pub(crate) enum Completion {
    PageLoaded {
        generation: u64,
        epoch: u64,
        page: usize,
        result: Result<Vec<EmailSummary>>,
    },
    Mutated {
        job: MutationJob,
        result: Result<()>,
    },
    Synced {
        result: Result<Vec<SyncOutcome>>,
    },
    BannerExpired {
        generation: u64,
        seq: u64,
    },
}

/// Next value of an optional signal stream. An absent stream never yields.
async fn next_signal(stream: &mut Option<BoxStream<'static, bool>>) -> Option<bool> {
    match stream {
        Some(stream) => stream.next().await,
        None => std::future::pending().await,
    }
}

impl ListController {
    pub(crate) async fn run(
        mut self,
        mut cmd_rx: mpsc::Receiver<Command>,
        mut completion_rx: mpsc::Receiver<Completion>,
        background: BoxStream<'static, bool>,
        offline: BoxStream<'static, bool>,
    ) {
        let mut background = Some(background);
        let mut offline = Some(offline);

        let mut poll = tokio::time::interval(self.config.sync.pending_poll_interval());
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; the count was read at spawn
        poll.tick().await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => match cmd {
                    Some(Command::Shutdown { reply }) => {
                        tracing::debug!("List controller shutting down");
                        self.stop();
                        self.publish();
                        reply.send(()).ok();
                        break;
                    }
                    Some(cmd) => self.handle_command(cmd),
                    None => {
                        // Every handle is gone
                        self.stop();
                        self.publish();
                        break;
                    }
                },
                Some(done) = completion_rx.recv() => self.handle_completion(done),
                signal = next_signal(&mut background) => match signal {
                    Some(active) => self.on_background_sync(active),
                    None => {
                        tracing::debug!("Background sync signal closed");
                        background = None;
                    }
                },
                signal = next_signal(&mut offline) => match signal {
                    Some(is_offline) => self.on_offline(is_offline),
                    None => {
                        tracing::debug!("Offline status stream closed");
                        offline = None;
                    }
                },
                _ = poll.tick() => self.poll_pending_count(),
            }

            self.publish();
        }
    }

    fn handle_command(&mut self, cmd: Command) {
        match cmd {
            Command::Initialize { key, reply } => self.initialize(key, reply),
            Command::Refresh { reply } => self.refresh(Some(reply)),
            Command::LoadNextPage { reply } => self.load_next_page(reply),
            Command::PerformAction { ids, kind, reply } => self.perform_action(ids, kind, reply),
            Command::PerformOnSelection { kind, reply } => self.perform_on_selection(kind, reply),
            Command::Undo { reply } => self.undo(reply),
            Command::Select { op, reply } => {
                self.apply_selection(op);
                self.reply(reply, ());
            }
            Command::DismissError { reply } => {
                self.dismiss_error();
                self.reply(reply, ());
            }
            Command::SyncNow { reply } => self.sync_now(reply),
            // Handled by the loop
            Command::Shutdown { reply } => self.reply(reply, ()),
        }
    }

    fn handle_completion(&mut self, done: Completion) {
        match done {
            Completion::PageLoaded {
                generation,
                epoch,
                page,
                result,
            } => self.on_page_loaded(generation, epoch, page, result),
            Completion::Mutated { job, result } => self.on_mutated(job, result),
            Completion::Synced { result } => self.on_synced(result),
            Completion::BannerExpired { generation, seq } => {
                self.on_banner_expired(generation, seq)
            }
        }
    }
}
