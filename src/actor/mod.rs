//! Shared helpers for the actor tasks.

mod retry;

pub use retry::{RetryConfig, with_retry, with_retry_when};
