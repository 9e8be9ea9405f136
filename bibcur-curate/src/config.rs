//! bibcur-curate runtime settings
//!
//! Logging setup and the history database location. The database path
//! follows the same priority as the config file itself:
//! 1. Command-line argument
//! 2. `BIBCUR_HISTORY_DB` environment variable (read by the CLI parser)
//! 3. `history_db` in the TOML file
//! 4. OS data directory

use bibcur_common::config::{LoggingConfig, TomlConfig};
use bibcur_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter from `RUST_LOG`, else the configured level for this workspace
pub fn log_filter(logging: &LoggingConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = logging.level.trim();
        if level.contains('=') {
            EnvFilter::new(level)
        } else {
            EnvFilter::new(format!("bibcur_curate={0},bibcur_common={0}", level))
        }
    })
}

/// Install the global subscriber, to stderr or to the configured file
pub fn init_logging(logging: &LoggingConfig) -> Result<()> {
    let registry = tracing_subscriber::registry().with(log_filter(logging));

    let installed = match &logging.file {
        Some(path) => {
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            registry
                .with(fmt::layer().with_ansi(false).with_writer(Mutex::new(file)))
                .try_init()
        }
        None => registry.with(fmt::layer().with_writer(std::io::stderr)).try_init(),
    };

    installed.map_err(|e| Error::Internal(format!("Logging setup failed: {}", e)))
}

/// History database path after applying the override priority
pub fn history_db_path(cli_arg: Option<&Path>, config: &TomlConfig) -> PathBuf {
    match cli_arg {
        Some(path) => path.to_path_buf(),
        None => config.history_db_path(),
    }
}
