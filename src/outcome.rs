//! Run outcomes and the numeric normalization applied to extracted text.

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::browser::DriverError;

/// A value read from the portfolio page.
///
/// The portal renders the figure with decorations ("12.34%", "N/A"), so the
/// numeric reading is derived on a best-effort basis while the raw text is
/// always retained for persistence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExtractedValue {
    pub raw: String,
    pub numeric: Option<f64>,
}

impl ExtractedValue {
    pub fn from_raw(raw: impl Into<String>) -> Self {
        let raw = raw.into();
        let numeric = parse_numeric(&raw);
        ExtractedValue { raw, numeric }
    }
}

/// Strip every character except ASCII digits, `.` and `-`, then parse as a
/// float.  Text with no parsable remainder yields `None`.
pub fn parse_numeric(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
        .collect();
    if cleaned.is_empty() {
        return None;
    }
    cleaned.parse::<f64>().ok()
}

/// Classification of run failures.
///
/// `PopupTimeout` and `LoginFormNotFound` are part of the vocabulary but do
/// not terminate runs on their own: popup absence is a normal state and a
/// missing login form only surfaces downstream as `NavigationTimeout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    PopupTimeout,
    LoginFormNotFound,
    NavigationTimeout,
    ExtractionNotFound,
    SinkFailure,
    Browser,
}

/// Errors that terminate a portal run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("destination pattern '{pattern}' not matched within {timeout_ms}ms")]
    NavigationTimeout { pattern: String, timeout_ms: u64 },
    #[error("no selector strategy matched the page{}", screenshot_note(.screenshot))]
    ExtractionNotFound { screenshot: Option<PathBuf> },
    #[error(transparent)]
    Driver(#[from] DriverError),
}

fn screenshot_note(screenshot: &Option<PathBuf>) -> String {
    match screenshot {
        Some(path) => format!("; diagnostic saved to {}", path.display()),
        None => String::new(),
    }
}

impl RunError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            RunError::NavigationTimeout { .. } => ErrorKind::NavigationTimeout,
            RunError::ExtractionNotFound { .. } => ErrorKind::ExtractionNotFound,
            RunError::Driver(_) => ErrorKind::Browser,
        }
    }
}

/// The single terminal state of a run.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum RunOutcome {
    Success {
        value: ExtractedValue,
        timestamp: DateTime<Utc>,
    },
    Failure {
        kind: ErrorKind,
        diagnostic: String,
    },
}

impl RunOutcome {
    pub fn success(value: ExtractedValue) -> Self {
        RunOutcome::Success {
            value,
            timestamp: Utc::now(),
        }
    }

    pub fn failure(error: &RunError) -> Self {
        RunOutcome::Failure {
            kind: error.kind(),
            diagnostic: error.to_string(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, RunOutcome::Success { .. })
    }
}
