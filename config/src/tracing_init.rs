//! Shared tracing setup for binaries: env-filtered stderr layer plus a daily
//! rolling file under `~/.<app>/logs`. Gated behind the `tracing-init` feature.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

fn log_dir(app_name: &str) -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(format!(".{}", app_name))
        .join("logs")
}

/// Initialises tracing for a server binary. Returns the appender guard; keep it
/// alive for the process lifetime or buffered log lines are dropped.
///
/// Filter comes from `RUST_LOG`, default `info`.
pub fn init_tracing(app_name: &str) -> std::io::Result<WorkerGuard> {
    let dir = log_dir(app_name);
    std::fs::create_dir_all(&dir)?;
    let file_appender = tracing_appender::rolling::daily(&dir, format!("{}.log", app_name));
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file_writer)
                .with_ansi(false),
        )
        .init();

    Ok(guard)
}
