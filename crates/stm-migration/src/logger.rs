//! Logging sink for migration lifecycle messages
//!
//! The pipeline never fails because of logging. [`TracingLogger`] is the
//! default and forwards to `tracing`; [`NullLogger`] discards everything.

use std::fmt;

/// Log severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// Leveled, formatted log sink
pub trait Logger: Send + Sync {
    /// Emit one message
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>);

    /// Emit at debug level
    fn debug(&self, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Debug, message);
    }

    /// Emit at info level
    fn info(&self, message: fmt::Arguments<'_>) {
        self.log(LogLevel::Info, message);
    }
}

/// Forwards messages to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: LogLevel, message: fmt::Arguments<'_>) {
        match level {
            LogLevel::Debug => tracing::debug!(target: "stm_migration", "{}", message),
            LogLevel::Info => tracing::info!(target: "stm_migration", "{}", message),
            LogLevel::Warn => tracing::warn!(target: "stm_migration", "{}", message),
            LogLevel::Error => tracing::error!(target: "stm_migration", "{}", message),
        }
    }
}

/// Discards all messages
#[derive(Debug, Clone, Copy, Default)]
pub struct NullLogger;

impl Logger for NullLogger {
    fn log(&self, _level: LogLevel, _message: fmt::Arguments<'_>) {}
}
