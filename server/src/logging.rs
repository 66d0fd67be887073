use std::path::Path;
use tracing_subscriber::prelude::*;

static LOG_GUARD: once_cell::sync::Lazy<std::sync::Mutex<Option<tracing_appender::non_blocking::WorkerGuard>>> =
    once_cell::sync::Lazy::new(|| std::sync::Mutex::new(None));

/// Stderr plus a daily rolling file in `log_dir`. `RUST_LOG` overrides the `info` default.
pub fn init_logging(log_dir: &Path) {
    let mut filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    for directive in ["sqlx=warn", "hyper=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    let _ = std::fs::create_dir_all(log_dir);
    let file_appender = tracing_appender::rolling::daily(log_dir, "smspilot.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    if let Ok(mut slot) = LOG_GUARD.lock() {
        *slot = Some(guard);
    }

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .try_init();

    tracing::info!("Logging directory: {}", log_dir.display());
}
