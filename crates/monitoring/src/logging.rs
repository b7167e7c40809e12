//! Logging configuration and initialization for keeper services
//!
//! - Console logging or daily rotating file logging
//! - Verbosity derived from the deployment environment unless `RUST_LOG` is set

use anyhow::Result;
use std::env;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Maximum length for log messages (999 characters)
const MAX_LOG_MESSAGE_LENGTH: usize = 999;

/// Truncate a message to the maximum allowed length
pub fn truncate_message(message: &str) -> String {
    if message.len() <= MAX_LOG_MESSAGE_LENGTH {
        return message.to_string();
    }

    let mut cut = MAX_LOG_MESSAGE_LENGTH - 14;
    while !message.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}...[truncated]", &message[..cut])
}

/// Base verbosity for a deployment environment
fn default_directive(env_name: &str) -> &'static str {
    match env_name {
        "prod" => "info",
        _ => "debug",
    }
}

fn env_filter(env_name: &str) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(env_name)))
}

/// Initialize tracing with configurable output destination
///
/// ## Environment Variables
///
/// - `RUST_LOG`: overrides the environment-derived level (`dev` → debug, `prod` → info)
/// - `LOG_DESTINATION`: "console" or "file" (default: "console")
/// - `LOG_DIR`: Directory for log files (default: "./logs"), file mode only
/// - `LOG_FILE_PREFIX`: Prefix for log file names (default: "keeper"), file mode only
///
/// In file mode the returned guard flushes the background writer when dropped;
/// hold it until shutdown.
pub fn init_logging(env_name: &str) -> Result<Option<WorkerGuard>> {
    let log_destination = env::var("LOG_DESTINATION").unwrap_or_else(|_| "console".to_string());

    match log_destination.to_lowercase().as_str() {
        "file" => {
            let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "./logs".to_string());
            let log_file_prefix =
                env::var("LOG_FILE_PREFIX").unwrap_or_else(|_| "keeper".to_string());

            std::fs::create_dir_all(&log_dir).map_err(|e| {
                anyhow::anyhow!("Failed to create log directory '{}': {}", log_dir, e)
            })?;

            let file_appender = rolling::daily(&log_dir, &log_file_prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter(env_name))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(non_blocking)
                        .with_ansi(false)
                        .with_target(false),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("Failed to initialize file tracing subscriber: {}", e)
                })?;

            info!("Logging to daily rotating files in: {}/", log_dir);
            info!("Log file pattern: {}/{}.<YYYY-MM-DD>", log_dir, log_file_prefix);
            Ok(Some(guard))
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter(env_name))
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(std::io::stdout)
                        .with_ansi(true)
                        .with_target(false),
                )
                .try_init()
                .map_err(|e| {
                    anyhow::anyhow!("Failed to initialize console tracing subscriber: {}", e)
                })?;

            info!("Logging to console (env: {})", env_name);
            Ok(None)
        }
    }
}
