//! Logging bootstrap
//!
//! One log file per strategy run, named
//! `{YYYYMMDD_HHMMSS_mmm}_{config_name}.log` under the configured root.
//! Level filtering follows `RUST_LOG` when set.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name for one run: timestamp to millisecond plus the config stem.
pub fn log_file_name(config_name: &str, now: DateTime<Local>) -> String {
    format!(
        "{}_{:03}_{}.log",
        now.format("%Y%m%d_%H%M%S"),
        now.timestamp_subsec_millis(),
        config_name
    )
}

/// Create the run's log file and install the global subscriber.
/// Returns the log file path.
pub fn init_logger(log_dir: &Path, config_path: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(log_dir)
        .with_context(|| format!("could not create log dir {}", log_dir.display()))?;

    let config_name = config_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("strategy");
    let file_path = log_dir.join(log_file_name(config_name, Local::now()));
    let file = File::create(&file_path)
        .with_context(|| format!("could not create log file {}", file_path.display()))?;

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let result = tracing_subscriber::registry()
        .with(env_filter)
        .with(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_thread_ids(true)
                .with_writer(Arc::new(file)),
        )
        .try_init();
    if result.is_err() {
        // A subscriber installed earlier (tests) keeps precedence
        tracing::warn!(action = "init_logger", result = "already_initialized");
    }
    Ok(file_path)
}
