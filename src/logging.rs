use std::fs::{self, File};
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::Local;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::error::ScraperError;

/// `scraper_<YYYYmmdd_HHMMSS>.log` for the current local time.
pub fn log_file_name() -> String {
    format!("scraper_{}.log", Local::now().format("%Y%m%d_%H%M%S"))
}

pub fn default_directive(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    format!("warn,granuloma_scraper={level}")
}

/// Installs the global subscriber: one layer for the console and one without
/// ANSI colors for the per-run log file in `log_dir`. `RUST_LOG` overrides the
/// level. Returns the log file path.
pub fn init(log_dir: &Utf8Path, verbose: bool, to_stderr: bool) -> Result<Utf8PathBuf, ScraperError> {
    fs::create_dir_all(log_dir.as_std_path())
        .map_err(|err| ScraperError::Logging(format!("create {log_dir}: {err}")))?;
    let log_path = log_dir.join(log_file_name());
    let file = File::create(log_path.as_std_path())
        .map_err(|err| ScraperError::Logging(format!("create {log_path}: {err}")))?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));
    let console = if to_stderr {
        BoxMakeWriter::new(std::io::stderr)
    } else {
        BoxMakeWriter::new(std::io::stdout)
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(console))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file)),
        )
        .try_init()
        .map_err(|err| ScraperError::Logging(err.to_string()))?;
    Ok(log_path)
}
