//! Tracing setup
//!
//! Logs go to `<data_dir>/inboxflow/inboxflow.log`, or stderr when the file
//! can't be opened.

use std::fs::OpenOptions;
use std::path::Path;

use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::{Config, LoggingConfig};

/// Install the global subscriber. Returns `false` if one was already set.
pub fn init_logging(config: &LoggingConfig) -> Result<bool> {
    let log_file = if config.to_file {
        Config::data_dir()
            .ok()
            .and_then(|dir| std::fs::create_dir_all(&dir).ok().map(|_| dir))
            .map(|dir| dir.join("inboxflow.log"))
    } else {
        None
    };
    Ok(init_with_file(&config.filter, log_file.as_deref()))
}

fn init_with_file(filter: &str, path: Option<&Path>) -> bool {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    let file = path.and_then(|path| {
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .ok()
    });

    let installed = if let Some(file) = file {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .with_writer(std::sync::Mutex::new(file))
                    .with_ansi(false),
            )
            .try_init()
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .try_init()
    };
    installed.is_ok()
}
