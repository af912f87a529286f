//! Logging setup for the ingest binary
//!
//! Always logs to stderr; with a log directory also to a daily-rotated file.

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub const LOG_FILE_NAME: &str = "amcache-ingest.log";
const DEFAULT_FILTER: &str = "info,amc_acquire=debug,amc_ingest=debug";

/// Filter from `RUST_LOG`, or the crate default
pub fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging.
///
/// The returned guard must be held until exit so buffered file logs are
/// flushed. `None` when no log directory was given.
pub fn init_logging(log_dir: Option<&Path>) -> Option<WorkerGuard> {
    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).ok();
            let file_appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .init();

            tracing::info!("Logging initialized, log directory: {:?}", dir);
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
                .init();
            None
        }
    }
}
