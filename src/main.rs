//! Adjutant CLI — a headless REPL transport over the agent runtime.
//!
//! Run without a subcommand to chat. In-chat commands mirror what a chat
//! transport would bind: `/approve <id>`, `/deny <id>`, `/pending`,
//! `/tasks`, `/clear`, `/quit`.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tracing_subscriber::EnvFilter;

use adjutant::config::{load_config, load_default_config};
use adjutant::prelude::*;

// ─── CLI ──────────────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "adjutant",
    about = "Per-user conversational agent runtime",
    version,
    long_about = "Headless interface to the adjutant agent runtime.\n\
                  Run without a subcommand to enter the interactive REPL."
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config.toml (default: ~/.adjutant/config.toml).
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    /// User key attributed to REPL messages.
    #[arg(long, global = true, default_value = "local")]
    user: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Interactive chat REPL (the default).
    Chat,
    /// List scheduled tasks and exit.
    Tasks,
    /// List pending exec approvals and exit.
    Pending,
}

// ─── Entry point ──────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_default_config(),
    };

    let runtime = AgentRuntime::new(config)?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => run_repl(runtime, &cli.user).await,
        Commands::Tasks => {
            print_tasks(&runtime);
            Ok(())
        }
        Commands::Pending => {
            print_pending(&runtime);
            Ok(())
        }
    }
}

// ─── REPL ─────────────────────────────────────────────────────────────────────

async fn run_repl(runtime: Arc<AgentRuntime>, user: &str) -> Result<(), String> {
    runtime.start_scheduler();

    // Deliver unsolicited replies (scheduled briefings, reminders) even
    // while the prompt is idle.
    let mut events = runtime.bus().subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                AgentEvent::UnsolicitedReply { content, .. } => {
                    println!("\n[scheduled] {content}");
                }
                AgentEvent::ApprovalRequested {
                    approval_id,
                    tool_name,
                    risk_level,
                } => {
                    println!(
                        "\n[approval needed] {tool_name} ({risk_level}): \
                         /approve {approval_id} or /deny {approval_id}"
                    );
                }
                _ => {}
            }
        }
    });

    println!("adjutant ready. /quit to exit, /pending, /tasks, /clear, /approve <id>, /deny <id>");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    loop {
        stdout.write_all(b"> ").await.map_err(|e| e.to_string())?;
        stdout.flush().await.map_err(|e| e.to_string())?;

        let Some(line) = lines.next_line().await.map_err(|e| e.to_string())? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match line.split_once(' ').map_or((line, ""), |(a, b)| (a, b.trim())) {
            ("/quit", _) | ("/exit", _) => break,
            ("/pending", _) => print_pending(&runtime),
            ("/tasks", _) => print_tasks(&runtime),
            ("/clear", _) => match runtime.clear_session(user).await {
                Ok(()) => println!("conversation cleared."),
                Err(e) => println!("failed to clear conversation: {e}"),
            },
            ("/approve", id) if !id.is_empty() => {
                if runtime.approve(id) {
                    println!("approved {id}.");
                } else {
                    println!("no pending approval with id {id}.");
                }
            }
            ("/deny", id) if !id.is_empty() => {
                if runtime.deny(id) {
                    println!("denied {id}.");
                } else {
                    println!("no pending approval with id {id}.");
                }
            }
            _ => {
                let reply = runtime
                    .handle_message(IncomingMessage::new(user, line))
                    .await;
                println!("{reply}");
            }
        }
    }

    runtime.scheduler().stop();
    Ok(())
}

// ─── Listings ─────────────────────────────────────────────────────────────────

fn print_pending(runtime: &Arc<AgentRuntime>) {
    let pending = runtime.pending_approvals();
    if pending.is_empty() {
        println!("no pending approvals.");
        return;
    }
    for approval in pending {
        println!("{}\n", approval.summary());
    }
}

fn print_tasks(runtime: &Arc<AgentRuntime>) {
    let tasks = runtime.scheduler().list_tasks(false);
    if tasks.is_empty() {
        println!("no scheduled tasks.");
        return;
    }
    for task in tasks {
        let next = task
            .next_run
            .map(|t| t.to_rfc3339())
            .unwrap_or_else(|| "-".to_string());
        let enabled = if task.enabled { "enabled" } else { "disabled" };
        println!(
            "{}  {:?}  {}  next: {next}  ({})",
            task.id, task.kind, task.name, enabled
        );
    }
}
