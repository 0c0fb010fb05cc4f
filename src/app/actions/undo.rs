use tokio::sync::oneshot;

use crate::app::ListController;
use crate::app::undo::ActionRecord;
use crate::error::{CoreError, Result};

use super::mutation::{MutationJob, MutationPurpose};

impl ListController {
    /// Send the inverse of the stored action through the mutation queue
    pub(crate) fn undo(&mut self, reply: oneshot::Sender<Result<()>>) {
        if self.undo_in_flight {
            self.reply(reply, Err(CoreError::validation("undo already in progress")));
            return;
        }
        let Some(record) = self.state.last_action.clone() else {
            self.reply(reply, Err(CoreError::validation("nothing to undo")));
            return;
        };
        let Some(inverse) = record.inverse() else {
            self.reply(
                reply,
                Err(CoreError::validation(format!("{} cannot be undone", record.kind))),
            );
            return;
        };

        tracing::info!(
            "Undoing {} on {} items with {}",
            record.kind,
            record.ids.len(),
            inverse
        );
        self.undo_in_flight = true;
        self.submit_mutation(MutationJob {
            generation: self.generation,
            ids: record.ids.clone(),
            kind: inverse,
            purpose: MutationPurpose::Undo { record, reply },
        });
    }

    pub(crate) fn finish_undo(
        &mut self,
        generation: u64,
        record: ActionRecord,
        reply: oneshot::Sender<Result<()>>,
        result: Result<()>,
    ) {
        self.undo_in_flight = false;
        if generation != self.generation {
            self.reply(reply, result);
            return;
        }

        match result {
            Ok(()) => {
                // A newer action may have replaced the record meanwhile
                let same = self
                    .state
                    .last_action
                    .as_ref()
                    .is_some_and(|current| current.seq == record.seq);
                if same {
                    self.state.last_action = None;
                    self.state.undo_banner_visible = false;
                    if let Some(timer) = self.banner.take() {
                        timer.cancel();
                    }
                }
                self.dirty = true;
                // Reload instead of reconstructing the previous items
                self.refresh(None);
                self.reply(reply, Ok(()));
            }
            Err(e) => {
                tracing::warn!("Undo of {} failed: {}", record.kind, e);
                self.state.error = Some((&e).into());
                self.load_error = false;
                self.dirty = true;
                self.reply(reply, Err(e));
            }
        }
    }

    pub(crate) fn on_banner_expired(&mut self, generation: u64, seq: u64) {
        let current = self
            .state
            .last_action
            .as_ref()
            .is_some_and(|record| record.seq == seq);
        if generation != self.generation || !current {
            return;
        }
        self.banner = None;
        if self.state.undo_banner_visible {
            self.state.undo_banner_visible = false;
            self.dirty = true;
        }
    }
}
