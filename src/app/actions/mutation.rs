use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};

use crate::app::ListController;
use crate::app::event_loop::Completion;
use crate::app::undo::{ActionRecord, BannerTimer};
use crate::backend::MailBackend;
use crate::error::{CoreError, Result};
use crate::mail::{ActionKind, EffectClass, EmailSummary};

type MutationReply = oneshot::Sender<Result<()>>;

/// One call to the mutation collaborator, queued behind earlier ones
pub(crate) struct MutationJob {
    pub(crate) generation: u64,
    pub(crate) ids: Vec<String>,
    pub(crate) kind: ActionKind,
    pub(crate) purpose: MutationPurpose,
}

pub(crate) enum MutationPurpose {
    Perform {
        /// Came from the multi-select set
        from_selection: bool,
        reply: MutationReply,
    },
    Undo {
        record: ActionRecord,
        reply: MutationReply,
    },
}

/// Runs mutations one at a time, in submission order, so their completions
/// reach the controller in the same order.
pub(crate) async fn mutation_worker(
    backend: Arc<dyn MailBackend>,
    mut jobs: mpsc::UnboundedReceiver<MutationJob>,
    completion_tx: mpsc::Sender<Completion>,
) {
    while let Some(job) = jobs.recv().await {
        tracing::debug!("Mutating {} items: {}", job.ids.len(), job.kind);
        let result = backend.mutate(&job.ids, job.kind).await;
        if completion_tx
            .send(Completion::Mutated { job, result })
            .await
            .is_err()
        {
            break;
        }
    }
    tracing::debug!("Mutation worker stopped");
}

/// Remove repeated ids, keeping the first occurrence
fn unique_ids(ids: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.into_iter().filter(|id| seen.insert(id.clone())).collect()
}

/// Bring rows read before the given mutations up to date with them
pub(crate) fn replay_confirmed(
    emails: &mut Vec<EmailSummary>,
    confirmed: &[(Vec<String>, ActionKind)],
) {
    for (ids, kind) in confirmed {
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        match kind.effect_class() {
            EffectClass::Toggle => {
                for email in emails
                    .iter_mut()
                    .filter(|e| targets.contains(e.id.as_str()))
                {
                    email.flags = kind.apply(email.flags);
                }
            }
            EffectClass::Remove => emails.retain(|e| !targets.contains(e.id.as_str())),
        }
    }
}

impl ListController {
    pub(crate) fn perform_action(
        &mut self,
        ids: Vec<String>,
        kind: ActionKind,
        reply: MutationReply,
    ) {
        let ids = unique_ids(ids);
        if ids.is_empty() {
            let err = CoreError::validation(format!("{} needs at least one item", kind));
            self.reply(reply, Err(err));
            return;
        }
        self.submit_mutation(MutationJob {
            generation: self.generation,
            ids,
            kind,
            purpose: MutationPurpose::Perform {
                from_selection: false,
                reply,
            },
        });
    }

    pub(crate) fn perform_on_selection(&mut self, kind: ActionKind, reply: MutationReply) {
        let selection = &self.state.selection;
        // Keep list order so the backend sees ids as displayed
        let ids: Vec<String> = self
            .state
            .items
            .iter()
            .filter(|e| selection.contains(&e.id))
            .map(|e| e.id.clone())
            .collect();
        if !selection.active || ids.is_empty() {
            self.reply(reply, Err(CoreError::validation("no items selected")));
            return;
        }
        self.submit_mutation(MutationJob {
            generation: self.generation,
            ids,
            kind,
            purpose: MutationPurpose::Perform {
                from_selection: true,
                reply,
            },
        });
    }

    pub(crate) fn submit_mutation(&mut self, job: MutationJob) {
        if let Err(mpsc::error::SendError(job)) = self.mutation_tx.send(job) {
            tracing::error!("Mutation worker is gone, dropping {}", job.kind);
            let reply = match job.purpose {
                MutationPurpose::Perform { reply, .. } => reply,
                MutationPurpose::Undo { reply, .. } => {
                    self.undo_in_flight = false;
                    reply
                }
            };
            self.reply(reply, Err(CoreError::controller_stopped()));
        }
    }

    pub(crate) fn on_mutated(&mut self, job: MutationJob, result: Result<()>) {
        let MutationJob {
            generation,
            ids,
            kind,
            purpose,
        } = job;
        match purpose {
            MutationPurpose::Perform {
                from_selection,
                reply,
            } => self.finish_perform(generation, ids, kind, from_selection, reply, result),
            MutationPurpose::Undo { record, reply } => {
                self.finish_undo(generation, record, reply, result)
            }
        }
        // Failed or not, the offline queue may have changed
        self.poll_pending_count();
    }

    fn finish_perform(
        &mut self,
        generation: u64,
        ids: Vec<String>,
        kind: ActionKind,
        from_selection: bool,
        reply: MutationReply,
        result: Result<()>,
    ) {
        if generation != self.generation {
            tracing::debug!("{} finished after a collection switch, list untouched", kind);
            self.reply(reply, result);
            return;
        }
        if let Err(e) = result {
            tracing::warn!("{} on {} items failed: {}", kind, ids.len(), e);
            self.state.error = Some((&e).into());
            self.load_error = false;
            self.dirty = true;
            self.reply(reply, Err(e));
            return;
        }

        self.apply_effect(&ids, kind);
        if let Some(load) = self.in_flight.as_mut() {
            load.confirmed.push((ids.clone(), kind));
        }
        if from_selection || ids.len() > 1 {
            self.state.selection.exit();
        } else {
            let items = &self.state.items;
            self.state.selection.retain_present(items);
        }
        tracing::info!("{} {} items", kind.label(), ids.len());
        self.record_action(kind, ids);
        self.dirty = true;
        self.reply(reply, Ok(()));
    }

    /// Apply a confirmed action to the loaded items. Items not named in
    /// `ids`, and toggles that change nothing, keep their allocation.
    fn apply_effect(&mut self, ids: &[String], kind: ActionKind) {
        let targets: HashSet<&str> = ids.iter().map(String::as_str).collect();
        match kind.effect_class() {
            EffectClass::Toggle => {
                for item in self
                    .state
                    .items
                    .iter_mut()
                    .filter(|e| targets.contains(e.id.as_str()))
                {
                    let flags = kind.apply(item.flags);
                    if flags != item.flags {
                        Arc::make_mut(item).flags = flags;
                    }
                }
            }
            EffectClass::Remove => {
                self.state
                    .items
                    .retain(|e| !targets.contains(e.id.as_str()));
            }
        }
    }

    /// Store the newest record, replacing the previous one and its banner
    fn record_action(&mut self, kind: ActionKind, ids: Vec<String>) {
        self.action_seq += 1;
        let record = ActionRecord::new(kind, ids, self.action_seq);

        if let Some(timer) = self.banner.take() {
            timer.cancel();
        }
        if record.undoable {
            self.banner = Some(BannerTimer::arm(
                &self.generation_token,
                self.config.undo.banner_duration(),
                self.generation,
                record.seq,
                self.completion_tx.clone(),
            ));
        }
        self.state.undo_banner_visible = record.undoable;
        self.state.last_action = Some(record);
    }
}
