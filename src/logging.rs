use std::fs;
use std::path::PathBuf;
use tracing::Subscriber;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, prelude::*, EnvFilter, Layer};

/// Where and how run logs are written.
#[derive(Debug, Clone, Default)]
pub struct LoggingConfig {
    /// Directory for the daily-rolling JSON log file; console only when unset
    pub log_dir: Option<PathBuf>,
    /// Raise the default level for this crate to debug
    pub verbose: bool,
}

impl LoggingConfig {
    /// Filter used when RUST_LOG is unset.
    pub fn default_directive(&self) -> &'static str {
        if self.verbose {
            "kgx_ingest=debug,info"
        } else {
            "kgx_ingest=info,warn"
        }
    }
}

/// Console goes to stderr so `read` can stream records on stdout.
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fmt::layer().with_target(true).with_writer(std::io::stderr)
}

/// Initializes the logging system with console output and, optionally, a JSON file.
///
/// The returned guard must be held for the lifetime of the process so buffered
/// file output is flushed on exit.
pub fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    // Respect RUST_LOG if set
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.default_directive()));

    match &config.log_dir {
        Some(dir) => {
            let _ = fs::create_dir_all(dir);
            let file_appender = tracing_appender::rolling::daily(dir, "kgx_ingest.log");
            let (non_blocking_writer, guard) = tracing_appender::non_blocking(file_appender);
            let file_layer = fmt::layer().json().with_writer(non_blocking_writer);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(file_layer)
                .with(console_layer())
                .init();
            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer())
                .init();
            None
        }
    }
}
