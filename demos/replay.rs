//! Replay a saved transcript through one file-context pass.
//!
//! Usage:
//!   cargo run --example replay -- transcript.json --worktree /path/to/repo
//!   cargo run --example replay -- transcript.json --finalize
//!   cargo run --example replay -- transcript.json --changed src/lib.rs --changed README.md
//!   RUST_LOG=nexus_file_context=debug cargo run --example replay -- transcript.json
//!
//! The transcript is a JSON array of messages. The rewritten window is
//! printed to stdout, the summary to stderr.

use std::path::PathBuf;

use async_trait::async_trait;
use clap::Parser;
use nexus_file_context::{
    format_summary, ChangedFile, Config, FileContextSync, HistoryError, Message, SessionHistory,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "replay", about = "Run a file-context pass over a saved transcript")]
struct Cli {
    /// Transcript JSON (array of messages)
    transcript: PathBuf,

    /// Worktree root for resolving relative paths
    #[arg(long)]
    worktree: Option<PathBuf>,

    /// Config file (created with defaults if missing)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Run finalization instead of consolidation
    #[arg(long)]
    finalize: bool,

    /// Treat these files as changed by a delegated task
    #[arg(long = "changed")]
    changed: Vec<String>,
}

/// Pretends a single child session changed the given files.
struct ReplayHistory(Vec<String>);

#[async_trait]
impl SessionHistory for ReplayHistory {
    async fn changed_files(&self, _: &str) -> Result<Vec<ChangedFile>, HistoryError> {
        Ok(self
            .0
            .iter()
            .map(|f| ChangedFile { file: f.clone() })
            .collect())
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let raw = tokio::fs::read_to_string(&cli.transcript)
        .await
        .unwrap_or_else(|e| {
            eprintln!("error: cannot read {}: {e}", cli.transcript.display());
            std::process::exit(1);
        });
    let mut window: Vec<Message> = serde_json::from_str(&raw).unwrap_or_else(|e| {
        eprintln!("error: invalid transcript: {e}");
        std::process::exit(1);
    });
    let Some(session_id) = window.last().map(|m| m.session_id.clone()) else {
        eprintln!("transcript is empty");
        return;
    };

    let mut sync = match cli.config {
        Some(ref path) => FileContextSync::from_config_file(path).await,
        None => FileContextSync::new(Config::default()),
    }
    .with_history(ReplayHistory(cli.changed.clone()));
    if let Some(ref root) = cli.worktree {
        sync = sync.with_worktree(root);
    }

    if !cli.changed.is_empty() {
        let added = sync
            .on_task_completed(&session_id, &json!({ "sessionId": "replay-child" }))
            .await;
        eprintln!("invalidated {added} file(s)");
    }
    if cli.finalize {
        sync.on_session_idle(&session_id).await;
    }

    match sync.transform(&mut window).await {
        Some(_) => {
            if let Some(stats) = sync.stats(&session_id).await {
                eprintln!("{}", format_summary(&stats));
            }
        }
        None => eprintln!("no pass ran"),
    }

    match serde_json::to_string_pretty(&window) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("error: cannot serialize window: {e}"),
    }
}
