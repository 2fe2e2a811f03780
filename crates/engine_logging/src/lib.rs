#![deny(missing_docs)]
//! Shared logging utilities for the pinharvest workspace.
//!
//! This crate provides the `engine_*` logging macros used by the binary, the
//! [`LogSink`] capability that engine components receive instead of reaching
//! for a global logger, and a minimal test initializer for the global logger.

use std::sync::{Arc, Mutex};

pub use log::Level;

/// Logs a trace-level message using the global logging facade.
#[macro_export]
macro_rules! engine_trace {
    ($($arg:tt)*) => {{
        log::trace!($($arg)*);
    }};
}

/// Logs an info-level message using the global logging facade.
#[macro_export]
macro_rules! engine_info {
    ($($arg:tt)*) => {{
        log::info!($($arg)*);
    }};
}

/// Logs a debug-level message using the global logging facade.
#[macro_export]
macro_rules! engine_debug {
    ($($arg:tt)*) => {{
        log::debug!($($arg)*);
    }};
}

/// Logs a warn-level message using the global logging facade.
#[macro_export]
macro_rules! engine_warn {
    ($($arg:tt)*) => {{
        log::warn!($($arg)*);
    }};
}

/// Logs an error-level message using the global logging facade.
#[macro_export]
macro_rules! engine_error {
    ($($arg:tt)*) => {{
        log::error!($($arg)*);
    }};
}

/// Logs a debug-level message to an injected [`LogSink`].
#[macro_export]
macro_rules! sink_debug {
    ($sink:expr, $($arg:tt)*) => {{
        $crate::LogSink::log(&*$sink, $crate::Level::Debug, &format!($($arg)*));
    }};
}

/// Logs an info-level message to an injected [`LogSink`].
#[macro_export]
macro_rules! sink_info {
    ($sink:expr, $($arg:tt)*) => {{
        $crate::LogSink::log(&*$sink, $crate::Level::Info, &format!($($arg)*));
    }};
}

/// Logs a warn-level message to an injected [`LogSink`].
#[macro_export]
macro_rules! sink_warn {
    ($sink:expr, $($arg:tt)*) => {{
        $crate::LogSink::log(&*$sink, $crate::Level::Warn, &format!($($arg)*));
    }};
}

/// Logs an error-level message to an injected [`LogSink`].
#[macro_export]
macro_rules! sink_error {
    ($sink:expr, $($arg:tt)*) => {{
        $crate::LogSink::log(&*$sink, $crate::Level::Error, &format!($($arg)*));
    }};
}

/// Destination for log records emitted by engine components.
///
/// Components hold an `Arc<dyn LogSink>` and never touch a global logger
/// directly, so tests can observe what a component reported.
pub trait LogSink: Send + Sync {
    /// Records a single message at `level`.
    fn log(&self, level: Level, message: &str);

    /// Records a debug-level message.
    fn debug(&self, message: &str) {
        self.log(Level::Debug, message);
    }

    /// Records an info-level message.
    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    /// Records a warn-level message.
    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    /// Records an error-level message.
    fn error(&self, message: &str) {
        self.log(Level::Error, message);
    }
}

/// Forwards records to the `log` facade under a fixed target.
#[derive(Debug, Clone)]
pub struct FacadeLogSink {
    target: &'static str,
}

impl FacadeLogSink {
    /// Creates a sink that logs under `target`.
    pub fn new(target: &'static str) -> Self {
        Self { target }
    }

    /// Convenience constructor returning the sink already boxed for sharing.
    pub fn shared(target: &'static str) -> Arc<dyn LogSink> {
        Arc::new(Self::new(target))
    }
}

impl Default for FacadeLogSink {
    fn default() -> Self {
        Self::new("pinharvest")
    }
}

impl LogSink for FacadeLogSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: self.target, level, "{message}");
    }
}

/// A captured log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Severity of the record.
    pub level: Level,
    /// Rendered message text.
    pub message: String,
}

/// Keeps every record in memory. Intended for tests.
#[derive(Debug, Default, Clone)]
pub struct MemoryLogSink {
    records: Arc<Mutex<Vec<LogRecord>>>,
}

impl MemoryLogSink {
    /// Creates an empty sink.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy of every record captured so far.
    pub fn records(&self) -> Vec<LogRecord> {
        self.records
            .lock()
            .map(|records| records.clone())
            .unwrap_or_default()
    }

    /// Returns the messages captured at exactly `level`.
    pub fn messages_at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|record| record.level == level)
            .map(|record| record.message)
            .collect()
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, level: Level, message: &str) {
        if let Ok(mut records) = self.records.lock() {
            records.push(LogRecord {
                level,
                message: message.to_string(),
            });
        }
    }
}

/// Initializes a simple terminal logger for use in unit tests.
///
/// This safely no-ops if another logger has already been initialized.
pub fn initialize_for_tests() {
    use simplelog::{ColorChoice, CombinedLogger, Config, TermLogger, TerminalMode};

    // Use debug level in debug builds, info in release builds.
    let level = if cfg!(debug_assertions) {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    // Ignore the error if a logger was already set by another test.
    let _ = CombinedLogger::init(vec![TermLogger::new(
        level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    )]);
}
