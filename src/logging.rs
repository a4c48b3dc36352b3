//! Structured logging setup.

use std::path::Path;

use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing::Subscriber;
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Default filter when `RUST_LOG` is unset. HTTP and audio internals are
/// noisy at info.
const DEFAULT_FILTER: &str = "info,reqwest=warn,hyper=warn,hyper_util=warn,mio=warn,cpal=warn";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialize logging.
///
/// Sets up:
/// - File output: `{log_dir}/assistant.<date>.log`, daily rotation, latest 5 files.
/// - Console output on stderr (stdout carries IPC and must stay clean).
/// - Environment filter: `RUST_LOG`, defaulting to [`DEFAULT_FILTER`].
///
/// If the log directory cannot be used, logs go to stderr only.
fn console_layer<S>() -> impl Layer<S>
where
    S: Subscriber + for<'a> LookupSpan<'a>,
{
    fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .compact()
}

pub fn init(log_dir: &Path) {

    let file_appender = std::fs::create_dir_all(log_dir)
        .map_err(|e| e.to_string())
        .and_then(|()| {
            RollingFileAppender::builder()
                .rotation(Rotation::DAILY)
                .filename_prefix("assistant")
                .filename_suffix("log")
                .max_log_files(5)
                .build(log_dir)
                .map_err(|e| e.to_string())
        });

    match file_appender {
        Ok(appender) => {
            let file_layer = fmt::layer()
                .with_writer(appender)
                .with_ansi(false)
                .with_target(true)
                .with_file(true)
                .with_line_number(true);
            tracing_subscriber::registry()
                .with(env_filter())
                .with(file_layer)
                .with(console_layer())
                .init();
            tracing::info!(log_dir = %log_dir.display(), "Logger initialized");
        }
        Err(e) => {
            tracing_subscriber::registry()
                .with(env_filter())
                .with(console_layer())
                .init();
            tracing::warn!(log_dir = %log_dir.display(), error = %e, "File logging unavailable, using stderr only");
        }
    }
}
