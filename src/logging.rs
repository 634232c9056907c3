//! Structured logging for portal runs.
//!
//! Stage code logs through [`RunLogger`] with a category per pipeline stage so
//! records stay attributable once a run is reduced to a single outcome line.
//! An external callback can take over delivery (the CLI bridges records into
//! the `log` crate); otherwise records are printed to the console.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::Verbosity;

/// Convenience alias for external logging callbacks.
pub type LogCallback = Arc<dyn Fn(&RunLogRecord) + Send + Sync + 'static>;

/// Log severity used across the crate.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Info,
    Debug,
}

impl LogLevel {
    pub fn label(self) -> &'static str {
        match self {
            LogLevel::Error => "ERROR",
            LogLevel::Info => "INFO",
            LogLevel::Debug => "DEBUG",
        }
    }
}

/// Logging configuration shared across the run pipeline.
#[derive(Clone, Default)]
pub struct LogConfig {
    pub verbose: Verbosity,
    pub external_logger: Option<LogCallback>,
}

impl LogConfig {
    pub fn new(verbose: Verbosity) -> Self {
        Self {
            verbose,
            external_logger: None,
        }
    }

    /// Errors always pass; info and debug require the matching verbosity.
    pub fn should_log(&self, level: LogLevel) -> bool {
        match (level, self.verbose) {
            (LogLevel::Error, _) => true,
            (LogLevel::Info, Verbosity::Medium | Verbosity::Detailed) => true,
            (LogLevel::Debug, Verbosity::Detailed) => true,
            _ => false,
        }
    }
}

/// Structured log entry shared with external callbacks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunLogRecord {
    pub timestamp: DateTime<Utc>,
    pub message: String,
    pub level: LogLevel,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub auxiliary: Option<Value>,
}

impl RunLogRecord {
    pub fn new(
        message: impl Into<String>,
        level: LogLevel,
        category: Option<String>,
        auxiliary: Option<Value>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            message: message.into(),
            level,
            category,
            auxiliary,
        }
    }
}

/// Console printer used when no external logger is configured.
pub fn default_log_handler(record: &RunLogRecord) {
    let when = record
        .timestamp
        .to_rfc3339_opts(chrono::SecondsFormat::Secs, true);
    let category = record
        .category
        .as_deref()
        .map(|c| format!(" [{c}]"))
        .unwrap_or_default();
    println!(
        "[{when}] {:<5}{category} {}",
        record.level.label(),
        record.message
    );
    if let Some(aux) = record.auxiliary.as_ref().filter(|aux| !aux.is_null()) {
        println!("    {aux}");
    }
}

/// Logger handed to every stage of a portal run.
#[derive(Clone)]
pub struct RunLogger {
    config: LogConfig,
}

impl fmt::Debug for RunLogger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RunLogger")
            .field("verbosity", &self.config.verbose)
            .field("external_logger", &self.config.external_logger.is_some())
            .finish()
    }
}

impl RunLogger {
    pub fn with_config(config: LogConfig) -> Self {
        Self { config }
    }

    pub fn new(verbose: Verbosity) -> Self {
        Self::with_config(LogConfig::new(verbose))
    }

    pub fn config(&self) -> &LogConfig {
        &self.config
    }

    pub fn set_verbose(&mut self, verbose: Verbosity) {
        self.config.verbose = verbose;
    }

    pub fn set_external_logger(&mut self, logger: Option<LogCallback>) {
        self.config.external_logger = logger;
    }

    pub fn log(
        &self,
        message: impl Into<String>,
        level: LogLevel,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        if !self.config.should_log(level) {
            return;
        }

        let record = RunLogRecord::new(message, level, category.map(str::to_string), auxiliary);
        match &self.config.external_logger {
            Some(callback) => callback(&record),
            None => default_log_handler(&record),
        }
    }

    pub fn error(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Error, category, auxiliary);
    }

    pub fn info(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Info, category, auxiliary);
    }

    pub fn debug(
        &self,
        message: impl Into<String>,
        category: Option<&str>,
        auxiliary: Option<Value>,
    ) {
        self.log(message, LogLevel::Debug, category, auxiliary);
    }
}
