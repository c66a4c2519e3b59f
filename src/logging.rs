//! # Structured Logging Module
//!
//! Environment-aware structured logging to the console and, when
//! `RELAY_LOG_DIR` is set, to a JSON log file in that directory.
//!
//! The level comes from the deployment environment (`RELAY_ENV`/`APP_ENV`)
//! unless `RUST_LOG` is set, which always wins.

use std::fs;
use std::path::PathBuf;
use std::process;
use std::sync::OnceLock;

use chrono::Utc;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use crate::config::ConfigManager;

/// Directory for JSON log files; console only when unset
pub const LOG_DIR_ENV: &str = "RELAY_LOG_DIR";

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();
static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Initialize structured logging with environment-specific configuration.
/// Safe to call more than once; an already installed global subscriber is
/// left in place.
pub fn init_structured_logging() {
    LOGGER_INITIALIZED.get_or_init(|| {
        let environment = ConfigManager::detect_environment();
        let log_level = get_log_level(&environment);

        let console_layer = fmt::layer()
            .with_target(true)
            .with_thread_ids(true)
            .with_level(true)
            .with_ansi(true)
            .with_filter(env_filter(log_level));

        let mut log_file = None;
        let file_layer = match std::env::var(LOG_DIR_ENV).ok().map(PathBuf::from) {
            Some(log_dir) => match fs::create_dir_all(&log_dir) {
                Ok(()) => {
                    let file_name = format!(
                        "{}.{}.{}.log",
                        environment,
                        process::id(),
                        Utc::now().format("%Y%m%d_%H%M%S")
                    );
                    log_file = Some(log_dir.join(&file_name));

                    let file_appender = tracing_appender::rolling::never(&log_dir, file_name);
                    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
                    // keep the writer flushing for the life of the process
                    let _ = FILE_GUARD.set(guard);

                    Some(
                        fmt::layer()
                            .with_writer(file_writer)
                            .with_target(true)
                            .with_thread_ids(true)
                            .with_level(true)
                            .with_ansi(false)
                            .json()
                            .with_filter(env_filter(log_level)),
                    )
                }
                Err(e) => {
                    eprintln!("Failed to create log directory {}: {e}", log_dir.display());
                    None
                }
            },
            None => None,
        };

        let subscriber = tracing_subscriber::registry()
            .with(console_layer)
            .with(file_layer);

        if subscriber.try_init().is_err() {
            tracing::debug!(
                "Global tracing subscriber already initialized - continuing with existing subscriber"
            );
            return;
        }

        tracing::info!(
            pid = process::id(),
            environment = %environment,
            log_file = ?log_file,
            "Structured logging initialized"
        );
    });
}

fn env_filter(default_level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level))
}

/// Get log level based on environment
fn get_log_level(environment: &str) -> &'static str {
    match environment {
        "production" | "staging" => "info",
        _ => "debug",
    }
}
