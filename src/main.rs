use std::env;
use std::sync::Arc;

use anyhow::{Context, Result};

use inboxflow::logging::init_logging;
use inboxflow::{
    ActionKind, CollectionKey, Config, Folder, ListHandle, MemoryBackend, spawn_list_controller,
};

fn print_usage() {
    eprintln!(
        r#"inboxflow - list and action orchestration demo

Usage: inboxflow [command]

Commands:
    (none)      Run the demo scenario against an in-memory mailbox
    help        Show this help message

Configuration file: ~/.config/inboxflow/config.toml
"#
    );
}

fn print_state(label: &str, handle: &ListHandle) {
    let state = handle.state();
    let sync = handle.sync_state();
    println!("== {}", label);
    println!(
        "   items: {}  phase: {:?}  more pages: {}",
        state.items.len(),
        state.phase,
        state.has_more_pages()
    );
    if let Some(record) = &state.last_action {
        println!(
            "   last action: {} on {:?} (undoable: {}, banner: {})",
            record.kind, record.ids, record.undoable, state.undo_banner_visible
        );
    }
    if let Some(err) = &state.error {
        println!("   error: {} ({})", err.message, err.kind);
    }
    println!(
        "   syncing: {}  offline: {}  pending: {}",
        sync.is_syncing, sync.is_offline, sync.pending_count
    );
}

async fn run_demo(config: Config) -> Result<()> {
    let backend = Arc::new(MemoryBackend::with_generated("acct1", 62));
    let handle = spawn_list_controller(backend.clone(), backend.clone(), config);

    let key = CollectionKey::new("acct1", Folder::Inbox);
    let outcome = handle
        .initialize(key.clone())
        .await
        .with_context(|| format!("Failed to load {}", key))?;
    print_state(&format!("initialize {} -> {:?}", key, outcome), &handle);

    let outcome = handle.load_next_page().await?;
    print_state(&format!("load next page -> {:?}", outcome), &handle);

    handle
        .perform_action(vec!["id_7".to_string()], ActionKind::Star)
        .await?;
    let starred = handle
        .state()
        .item("id_7")
        .is_some_and(|email| email.is_starred());
    print_state(&format!("star id_7 -> starred: {}", starred), &handle);

    handle.undo().await?;
    let mut rx = handle.subscribe();
    rx.wait_for(|s| !s.is_refreshing())
        .await
        .context("List controller stopped during refresh")?;
    print_state("undo", &handle);

    let outcomes = handle.sync_now().await?;
    for outcome in &outcomes {
        println!(
            "   synced {}: {} new, {} total",
            outcome.account, outcome.new_count, outcome.total
        );
    }
    print_state("sync", &handle);

    handle.shutdown().await?;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args: Vec<String> = env::args().collect();

    match args.get(1).map(|s| s.as_str()) {
        Some("help") | Some("--help") | Some("-h") => {
            print_usage();
            Ok(())
        }
        Some(cmd) => {
            eprintln!("Unknown command: {}", cmd);
            print_usage();
            std::process::exit(1);
        }
        None => {
            let config = Config::load()?;
            init_logging(&config.logging)?;
            tracing::info!("Starting demo with page size {}", config.list.page_size);
            run_demo(config).await
        }
    }
}
