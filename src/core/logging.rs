use chrono::Local;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

use super::config::PurgeConfig;
use super::error::{PurgeError, Result};
use crate::utils::file_stamp;

/// Builds the filter from the configured level.
/// A full `RUST_LOG`-style directive string is accepted too.
pub fn build_filter(level: &str) -> EnvFilter {
    EnvFilter::try_new(level.trim().to_lowercase()).unwrap_or_else(|_| EnvFilter::new("info"))
}

pub fn log_file_path(dir: &Path, command: &str) -> PathBuf {
    dir.join(format!("{}_{}.log", command, file_stamp(Local::now())))
}

/// Installs the global subscriber: stderr always, plus a plain-text file when enabled.
/// Returns the log file path, if any.
pub fn init(config: &PurgeConfig, command: &str) -> Result<Option<PathBuf>> {
    let console = fmt::layer().with_writer(std::io::stderr).with_target(false);

    let (file_layer, path) = if config.logging.log_to_file {
        let dir = config
            .logging
            .log_dir
            .clone()
            .unwrap_or_else(|| config.deletion.results_dir.clone());
        fs::create_dir_all(&dir)?;
        let path = log_file_path(&dir, command);
        let file = File::create(&path)?;
        let layer = fmt::layer()
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .with_target(false);
        (Some(layer), Some(path))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(build_filter(&config.logging.level))
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| PurgeError::Configuration(format!("logging already initialized: {e}")))?;

    Ok(path)
}
