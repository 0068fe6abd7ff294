// tracing setup: stderr plus a daily rolling file in the app log dir

use std::path::Path;
use tracing_appender::rolling::Rotation;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// used when RUST_LOG is unset
pub const DEFAULT_FILTER: &str = "info,mira=debug,mira_lib=debug,mira_core=debug";

const LOG_PREFIX: &str = "mira";
const MAX_LOG_FILES: usize = 5;

pub fn init(log_dir: &Path) -> anyhow::Result<()> {
    let appender = tracing_appender::rolling::Builder::new()
        .rotation(Rotation::DAILY)
        .max_log_files(MAX_LOG_FILES)
        .filename_prefix(LOG_PREFIX)
        .filename_suffix("log")
        .build(log_dir)?;

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(std::io::stderr.and(appender))
        .try_init()
        .map_err(|e| anyhow::anyhow!(e))?;

    tracing::info!(dir = %log_dir.display(), "logging to file");
    Ok(())
}

/// stderr only, for when the log dir cannot be resolved
pub fn init_stderr() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();
}
