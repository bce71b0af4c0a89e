//! tracing subscriber setup: console output plus an optional plain-text log file.

use std::fs::OpenOptions;
use std::sync::Mutex;

use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use crate::config::{AppPaths, GlobalConfig};

/// Install the global subscriber. `RUST_LOG` takes precedence over
/// `log_level` from the config.
pub fn init(cfg: &GlobalConfig, paths: &AppPaths) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&cfg.log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let console = fmt::layer()
        .with_target(cfg.detailed_log)
        .with_line_number(cfg.detailed_log);

    let file = if cfg.log_to_file {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(paths.log_file())?;
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(true)
                .with_line_number(cfg.detailed_log)
                .with_writer(Mutex::new(file)),
        )
    } else {
        None
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {}", e))?;

    if cfg.log_to_file {
        tracing::debug!("Logging to {}", paths.log_file().display());
    }
    Ok(())
}
