//! # qbot-logging
//!
//! Logging for the qbot questionnaire.
//!
//! ## Key Types
//!
//! - [`Logger`] - Structured event logging
//! - [`LogEvent`] - Questionnaire lifecycle events
//! - [`LogFormat`] - Output formats (Pretty, JSON, Compact)
//!
//! Diagnostics go through `tracing`; call [`init_tracing`] once at startup.

mod events;

pub use events::{LogEvent, LogFormat, Logger};

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// File name prefix for rolling diagnostic logs
const LOG_FILE_PREFIX: &str = "qbot.log";

/// Initialize tracing for the application.
///
/// With `log_dir` set, diagnostics go to a daily rolling file instead of
/// stderr. The returned guard must be held until shutdown so buffered lines
/// are flushed.
pub fn init_tracing(level: &str, format: LogFormat, log_dir: Option<&Path>) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match log_dir {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            match format {
                LogFormat::Json => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json().with_target(false).with_writer(writer))
                        .init();
                }
                LogFormat::Pretty | LogFormat::Compact => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(
                            fmt::layer()
                                .with_target(false)
                                .with_ansi(false)
                                .with_writer(writer),
                        )
                        .init();
                }
            }
            Some(guard)
        }
        None => {
            match format {
                LogFormat::Json => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().json().with_target(false).with_writer(std::io::stderr))
                        .init();
                }
                LogFormat::Pretty | LogFormat::Compact => {
                    tracing_subscriber::registry()
                        .with(filter)
                        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
                        .init();
                }
            }
            None
        }
    }
}
