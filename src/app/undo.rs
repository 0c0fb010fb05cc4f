//! Undo data structures
//!
//! Only the most recent completed action is kept. Its banner hides after a
//! fixed window, but the record itself stays until it is undone or replaced.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::mail::ActionKind;

use super::event_loop::Completion;

/// The most recently completed action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub kind: ActionKind,
    pub ids: Vec<String>,
    pub completed_at: DateTime<Utc>,
    pub undoable: bool,
    /// Monotonic per controller; ties banner timers to the record they belong to
    pub(crate) seq: u64,
}

impl ActionRecord {
    pub(crate) fn new(kind: ActionKind, ids: Vec<String>, seq: u64) -> Self {
        Self {
            kind,
            ids,
            completed_at: Utc::now(),
            undoable: kind.is_undoable(),
            seq,
        }
    }

    pub fn inverse(&self) -> Option<ActionKind> {
        self.kind.inverse()
    }
}

/// Scheduled hide of the undo banner
pub(crate) struct BannerTimer {
    token: CancellationToken,
}

impl BannerTimer {
    /// Send `BannerExpired` after `window` unless cancelled first. `parent`
    /// is the collection's generation token, so switching collections
    /// cancels the timer too.
    pub(crate) fn arm(
        parent: &CancellationToken,
        window: Duration,
        generation: u64,
        seq: u64,
        completion_tx: mpsc::Sender<Completion>,
    ) -> Self {
        let token = parent.child_token();
        let cancelled = token.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => {}
                _ = tokio::time::sleep(window) => {
                    completion_tx
                        .send(Completion::BannerExpired { generation, seq })
                        .await
                        .ok();
                }
            }
        });
        Self { token }
    }

    pub(crate) fn cancel(self) {
        self.token.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_copies_undoability() {
        let star = ActionRecord::new(ActionKind::Star, vec!["a".into()], 1);
        assert!(star.undoable);
        assert_eq!(star.inverse(), Some(ActionKind::Unstar));

        let read = ActionRecord::new(ActionKind::MarkRead, vec!["a".into()], 2);
        assert!(!read.undoable);
        assert_eq!(read.inverse(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn test_banner_timer_fires_after_window() {
        let (tx, mut rx) = mpsc::channel(4);
        let parent = CancellationToken::new();
        let _timer = BannerTimer::arm(&parent, Duration::from_millis(5000), 7, 3, tx);

        match rx.recv().await {
            Some(Completion::BannerExpired { generation, seq }) => {
                assert_eq!(generation, 7);
                assert_eq!(seq, 3);
            }
            other => panic!("unexpected completion: {:?}", other.is_some()),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_parent_silences_timer() {
        let (tx, mut rx) = mpsc::channel(4);
        let parent = CancellationToken::new();
        let _timer = BannerTimer::arm(&parent, Duration::from_millis(5000), 1, 1, tx);
        parent.cancel();

        // The sender is dropped with the task, so the channel closes empty
        assert!(rx.recv().await.is_none());
    }
}
