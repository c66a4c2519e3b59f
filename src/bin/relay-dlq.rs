//! # Relay DLQ Tool
//!
//! Operator command-line interface for a Redis-backed queue: region sizes,
//! dead-letter inspection and requeueing.

use std::sync::Arc;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;

use relay_core::config::ConfigManager;
use relay_core::logging::init_structured_logging;
use relay_core::messaging::{ConnectionManager, EventQueue, RedisConnector};

#[derive(Parser, Debug)]
#[command(name = "relay-dlq")]
#[command(about = "Inspect and requeue dead-lettered relay events")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Configuration file path (TOML)
    #[arg(short, long, env = "RELAY_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Broker URL, overriding the configuration
    #[arg(long)]
    url: Option<String>,

    /// Queue base name, overriding the configuration
    #[arg(short, long)]
    queue: Option<String>,

    /// Subcommands
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Show the size of every queue region
    Stats,
    /// List dead-lettered events
    List {
        /// Limit number of results
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Print full records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Move every dead-lettered event back to the ready list
    Requeue,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    let cli = Cli::parse();

    let manager = ConfigManager::load_from_file(cli.config.as_deref())
        .context("failed to load relay configuration")?;
    let config = manager.config();
    let url = cli.url.clone().unwrap_or_else(|| config.connection.url.clone());
    let queue_name = cli.queue.clone().unwrap_or_else(|| config.queue.name.clone());

    let connection = Arc::new(ConnectionManager::new(
        Arc::new(RedisConnector::new(url)),
        config.connection_config(),
    ));
    let queue = EventQueue::with_system_clock(queue_name, connection);
    queue.connect().await.context("failed to connect to broker")?;
    info!(queue = %queue.name(), "Connected");

    let outcome = run(&cli.command, &queue).await;
    queue.disconnect().await;
    outcome
}

async fn run(command: &Commands, queue: &EventQueue) -> anyhow::Result<()> {
    match command {
        Commands::Stats => {
            let stats = queue.stats().await?;
            println!("Queue '{}'", queue.name());
            println!("  ready:       {}", stats.ready);
            println!("  scheduled:   {}", stats.scheduled);
            println!("  processing:  {}", stats.processing);
            println!("  dead-letter: {}", stats.failed);
        }
        Commands::List { limit, json } => {
            let events = queue.failed_events().await?;
            println!(
                "Found {} dead-lettered events (showing up to {})\n",
                events.len(),
                limit
            );

            for event in events.iter().take(*limit) {
                if *json {
                    println!("{}", serde_json::to_string_pretty(&event.to_record())?);
                    continue;
                }
                println!("  • {}", event.name());
                println!("    Error: {}", event.error().unwrap_or("-"));
                println!("    Retries: {}", event.retries());
                if let Some(failed_at) = event.failed_at() {
                    println!("    Failed at: {}", failed_at.to_rfc3339());
                }
                if let Some(job_id) = event.job_id() {
                    println!("    Job: {job_id}");
                }
                println!();
            }
        }
        Commands::Requeue => {
            let moved = queue.requeue_failed().await?;
            println!("Requeued {moved} events onto '{}'", queue.name());
        }
    }
    Ok(())
}
