//! Logging infrastructure for Reaction Audio Sync.
//!
//! This module provides:
//! - Per-run loggers with tracing + callback output
//! - Compact mode with progress filtering
//! - Tail buffer dumped when a run fails
//! - Global `tracing` subscriber setup
//!
//! # Example
//!
//! ```no_run
//! use ras_core::logging::{RunLogger, LogConfig};
//!
//! let logger = RunLogger::new("clip_01", LogConfig::default(), None);
//! logger.stage("Coarse");
//! logger.progress(50);
//! logger.success("Aligned");
//! ```

mod run_logger;
mod types;

pub use run_logger::RunLogger;
pub use types::{LogConfig, LogLevel, MessagePrefix, RunLogCallback};

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Crates whose events follow the requested level; everything else is
/// held at `warn`.
const OWN_TARGETS: [&str; 2] = ["ras_core", "ras_cli"];

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` wins when set. Otherwise this crate and the CLI log at
/// `default_level` and dependencies at `warn`. Output goes to stderr so
/// stdout stays free for reports. Returns `false` if a subscriber was
/// already installed.
pub fn init_tracing(default_level: LogLevel) -> bool {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(filter_directive(default_level)));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(true)
                .with_thread_ids(false)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .try_init()
        .is_ok()
}

/// `EnvFilter` directive for `level` on our own targets.
fn filter_directive(level: LogLevel) -> String {
    let level = level.to_tracing_level().as_str().to_ascii_lowercase();
    let mut directive = String::from("warn");
    for target in OWN_TARGETS {
        directive.push_str(&format!(",{target}={level}"));
    }
    directive
}
