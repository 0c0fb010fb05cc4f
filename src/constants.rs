//! Crate-wide constants for tuning and configuration
//!
//! Centralizes magic numbers to make them discoverable. Every value here is
//! also the serde default of the matching [`crate::config::Config`] field.

/// Number of items requested per page from the backend.
pub const PAGE_SIZE: usize = 50;

/// How long the undo banner stays visible after an undoable action, in milliseconds.
/// The action record outlives the banner; only the affordance disappears.
pub const UNDO_BANNER_MS: u64 = 5000;

/// Maximum number of sync attempts (initial attempt included).
pub const SYNC_MAX_ATTEMPTS: u32 = 3;

/// Delay before the second sync attempt, in milliseconds.
pub const SYNC_INITIAL_DELAY_MS: u64 = 1000;

/// Multiplicative growth of the delay between sync attempts.
pub const SYNC_BACKOFF_FACTOR: f64 = 2.0;

/// Upper bound for a single delay between sync attempts, in milliseconds.
pub const SYNC_MAX_DELAY_MS: u64 = 10_000;

/// Interval in seconds between polls of the offline queue's pending count.
pub const PENDING_POLL_SECS: u64 = 5;

/// Capacity of the command channel into the list controller.
pub const COMMAND_CHANNEL_CAPACITY: usize = 64;

/// Capacity of the channel carrying completions back into the controller.
pub const COMPLETION_CHANNEL_CAPACITY: usize = 128;

/// Default log filter directive when `RUST_LOG` is unset.
pub const DEFAULT_LOG_FILTER: &str = "info,inboxflow=debug";
