//! Per-run logger with tracing and callback output.
//!
//! Each orchestrator run gets its own logger that:
//! - Forwards every line to `tracing` tagged with the run name
//! - Sends formatted lines to a callback (if provided)
//! - Supports compact mode with progress filtering
//! - Keeps a tail buffer that is dumped when the run fails

use std::collections::VecDeque;
use std::sync::Arc;

use chrono::Local;
use parking_lot::Mutex;

use super::types::{LogConfig, LogLevel, MessagePrefix, RunLogCallback};

/// Logger owned by a single run.
pub struct RunLogger {
    run_name: String,
    callback: Arc<Mutex<Option<RunLogCallback>>>,
    config: LogConfig,
    tail_buffer: Arc<Mutex<VecDeque<String>>>,
    /// Last progress value logged (for compact mode filtering).
    last_progress: Arc<Mutex<Option<u32>>>,
}

impl RunLogger {
    /// Create a new run logger.
    pub fn new(run_name: impl Into<String>, config: LogConfig, callback: Option<RunLogCallback>) -> Self {
        let capacity = config.error_tail.max(1);
        Self {
            run_name: run_name.into(),
            callback: Arc::new(Mutex::new(callback)),
            config,
            tail_buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            last_progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Get the run name.
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Log a message at the specified level.
    ///
    /// Every message reaches the tail buffer; only messages at or above the
    /// configured level are emitted.
    pub fn log(&self, level: LogLevel, message: &str) {
        let formatted = self.format_message(message);
        self.remember(&formatted);

        if level < self.config.level {
            return;
        }
        self.emit(level, &formatted);
    }

    /// Log an info message.
    pub fn info(&self, message: &str) {
        self.log(LogLevel::Info, message);
    }

    /// Log a debug message.
    pub fn debug(&self, message: &str) {
        let msg = MessagePrefix::Debug.format(message);
        self.log(LogLevel::Debug, &msg);
    }

    /// Log a warning message.
    pub fn warn(&self, message: &str) {
        let msg = MessagePrefix::Warning.format(message);
        self.log(LogLevel::Warn, &msg);
    }

    /// Log an error message.
    pub fn error(&self, message: &str) {
        let msg = MessagePrefix::Error.format(message);
        self.log(LogLevel::Error, &msg);
    }

    /// Log a stage marker.
    pub fn stage(&self, stage_name: &str) {
        let msg = MessagePrefix::Stage.format(stage_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a section marker.
    pub fn section(&self, section_name: &str) {
        let msg = MessagePrefix::Section.format(section_name);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a success message.
    pub fn success(&self, message: &str) {
        let msg = MessagePrefix::Success.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log a validation message.
    pub fn validation(&self, message: &str) {
        let msg = MessagePrefix::Validation.format(message);
        self.log(LogLevel::Info, &msg);
    }

    /// Log progress update (filtered in compact mode).
    ///
    /// Returns true if the progress was logged, false if filtered.
    pub fn progress(&self, percent: u32) -> bool {
        if self.config.compact {
            let mut last = self.last_progress.lock();
            let step = self.config.progress_step.max(1);
            let current_step = (percent / step) * step;

            // Log at step boundaries (0%, 20%, 40%, ...) and always at 100%
            let filtered = match *last {
                Some(prev) => current_step <= (prev / step) * step && percent < 100,
                None => false,
            };
            if filtered {
                return false;
            }
            *last = Some(percent);
        }

        let msg = format!("Progress: {}%", percent);
        self.log(LogLevel::Info, &msg);
        true
    }

    /// Dump the tail buffer (typically after an error).
    pub fn show_tail(&self, header: &str) {
        let lines = self.get_tail();
        if lines.is_empty() {
            return;
        }

        self.emit(LogLevel::Error, &format!("[{}/tail]", header));
        for line in &lines {
            self.emit(LogLevel::Error, line);
        }
    }

    /// Clear the tail buffer.
    pub fn clear_tail(&self) {
        self.tail_buffer.lock().clear();
    }

    /// Get the current tail buffer contents.
    pub fn get_tail(&self) -> Vec<String> {
        self.tail_buffer.lock().iter().cloned().collect()
    }

    /// Format a message with timestamp (if enabled).
    fn format_message(&self, message: &str) -> String {
        if self.config.show_timestamps {
            let timestamp = Local::now().format("%H:%M:%S");
            format!("[{}] {}", timestamp, message)
        } else {
            message.to_string()
        }
    }

    fn remember(&self, formatted: &str) {
        if self.config.error_tail == 0 {
            return;
        }
        let mut buffer = self.tail_buffer.lock();
        if buffer.len() >= self.config.error_tail {
            buffer.pop_front();
        }
        buffer.push_back(formatted.to_string());
    }

    /// Send a formatted line to tracing and the callback.
    fn emit(&self, level: LogLevel, formatted: &str) {
        let run = self.run_name.as_str();
        match level {
            LogLevel::Trace => tracing::trace!(run, "{}", formatted),
            LogLevel::Debug => tracing::debug!(run, "{}", formatted),
            LogLevel::Info => tracing::info!(run, "{}", formatted),
            LogLevel::Warn => tracing::warn!(run, "{}", formatted),
            LogLevel::Error => tracing::error!(run, "{}", formatted),
        }

        if let Some(ref callback) = *self.callback.lock() {
            callback(formatted);
        }
    }
}

impl std::fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RunLogger")
            .field("run_name", &self.run_name)
            .field("config", &self.config)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn plain() -> LogConfig {
        LogConfig {
            show_timestamps: false,
            ..LogConfig::default()
        }
    }

    #[test]
    fn calls_callback() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let count_clone = call_count.clone();

        let callback: RunLogCallback = Box::new(move |_msg| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        });

        let logger = RunLogger::new("test_run", plain(), Some(callback));
        logger.info("Message 1");
        logger.info("Message 2");
        logger.debug("hidden at info level");

        assert_eq!(call_count.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn callback_sees_prefixed_lines() {
        let lines = Arc::new(Mutex::new(Vec::new()));
        let sink = lines.clone();
        let callback: RunLogCallback = Box::new(move |msg| sink.lock().push(msg.to_string()));
        let logger = RunLogger::new("test_run", plain(), Some(callback));

        logger.stage("Refine");
        logger.warn("spread");
        let lines = lines.lock();
        assert_eq!(lines[0], "=== Refine ===");
        assert_eq!(lines[1], "[WARNING] spread");
    }

    #[test]
    fn compact_mode_filters_progress() {
        let config = LogConfig {
            compact: true,
            progress_step: 20,
            ..plain()
        };
        let logger = RunLogger::new("test_run", config, None);

        assert!(logger.progress(0));
        assert!(!logger.progress(5));
        assert!(!logger.progress(15));
        assert!(logger.progress(20));
        assert!(!logger.progress(25));
        assert!(logger.progress(40));
        assert!(logger.progress(100));
    }

    #[test]
    fn verbose_mode_logs_all_progress() {
        let config = LogConfig {
            compact: false,
            ..plain()
        };
        let logger = RunLogger::new("test_run", config, None);
        assert!(logger.progress(1));
        assert!(logger.progress(2));
    }

    #[test]
    fn tail_buffer_maintains_limit() {
        let config = LogConfig {
            error_tail: 5,
            ..plain()
        };
        let logger = RunLogger::new("test_run", config, None);

        for i in 0..10 {
            logger.info(&format!("Line {}", i));
        }

        let tail = logger.get_tail();
        assert_eq!(tail.len(), 5);
        assert_eq!(tail[0], "Line 5");
        assert_eq!(tail[4], "Line 9");

        logger.clear_tail();
        assert!(logger.get_tail().is_empty());
    }

    #[test]
    fn tail_keeps_filtered_levels() {
        let logger = RunLogger::new("test_run", plain(), None);
        logger.debug("detail");
        assert_eq!(logger.get_tail(), vec!["[DEBUG] detail".to_string()]);
    }

    #[test]
    fn timestamps_are_prefixed() {
        let logger = RunLogger::new("test_run", LogConfig::default(), None);
        logger.info("x");
        let tail = logger.get_tail();
        assert!(tail[0].starts_with('['));
        assert!(tail[0].ends_with("] x"));
    }
}
