use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::info;
use tracing_subscriber::EnvFilter;

pub fn log_file_path() -> PathBuf {
    dirs::data_local_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf-agent")
        .join("pdf-agent.log")
}

/// Install the global subscriber. `RUST_LOG` overrides `level`.
///
/// The TUI owns the terminal, so in that mode everything goes to a log file.
pub fn init_logging(level: &str, to_file: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("pdf_agent={level},warn")))
        .context("invalid log level")?;

    if to_file {
        let path = log_file_path();
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("create log directory {}", dir.display()))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .with_context(|| format!("open log file {}", path.display()))?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(Mutex::new(file))
            .with_ansi(false)
            .try_init()
            .map_err(|e| anyhow::anyhow!("install subscriber: {e}"))?;
        info!(path = %path.display(), "file logging enabled");
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .compact()
            .try_init()
            .map_err(|e| anyhow::anyhow!("install subscriber: {e}"))?;
    }
    Ok(())
}
