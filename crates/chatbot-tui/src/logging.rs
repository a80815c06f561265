use anyhow::Result;
use chatbot_core::Config;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Initialize tracing into a daily rolling file.
///
/// The terminal belongs to ratatui, so nothing is written to stdout/stderr.
/// Default level: INFO for our crates, WARN otherwise; override via RUST_LOG.
/// Keep the returned guard alive until exit or buffered lines are lost.
pub fn init() -> Result<WorkerGuard> {
    let log_dir = Config::log_dir()?;
    std::fs::create_dir_all(&log_dir)?;

    let appender = tracing_appender::rolling::daily(&log_dir, "chatbot.log");
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("warn,chatbot_core=info,chatbot_tui=info"));

    let file_layer = fmt::layer()
        .with_writer(writer)
        .with_ansi(false)
        .with_target(true);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .try_init()?;

    tracing::debug!(dir = %log_dir.display(), "Tracing initialized");
    Ok(guard)
}
