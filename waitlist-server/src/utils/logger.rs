//! Logging Infrastructure
//!
//! Console output always; a daily rolling file when a log dir exists.
//! `RUST_LOG` overrides the configured level.

use std::path::Path;
use tracing_subscriber::EnvFilter;

/// Initialize the logger
pub fn init_logger() {
    init_logger_with_file(None, None, None);
}

/// Initialize the logger with optional JSON and file output
///
/// Safe to call more than once; later calls are ignored.
pub fn init_logger_with_file(log_level: Option<&str>, json: Option<bool>, log_dir: Option<&str>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file_dir = log_dir
        .map(Path::new)
        .filter(|path| path.exists())
        .and_then(|path| path.to_str());

    let result = match (file_dir, json.unwrap_or(false)) {
        (Some(dir), true) => {
            let appender = tracing_appender::rolling::daily(dir, "waitlist-server");
            subscriber.json().with_writer(appender).try_init()
        }
        (Some(dir), false) => {
            let appender = tracing_appender::rolling::daily(dir, "waitlist-server");
            subscriber.with_ansi(false).with_writer(appender).try_init()
        }
        (None, true) => subscriber.json().try_init(),
        (None, false) => subscriber.try_init(),
    };

    if result.is_err() {
        tracing::debug!("Logger already initialized");
    }
}
