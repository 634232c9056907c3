//! Delivery of extracted values to downstream recipients.
//!
//! Sinks run after the browser work is finished. Every sink returns a
//! `Result` and the dispatcher decides what a failure means; nothing in this
//! module can abort a run on its own.

mod csv;
mod notify;
mod sheets;

pub use csv::CsvSink;
pub use notify::NotifyClient;
pub use sheets::{SheetsClient, SheetsTarget};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::outcome::ExtractedValue;

/// One extracted figure, stamped and ready for delivery.
#[derive(Debug, Clone, PartialEq)]
pub struct SinkRecord {
    pub timestamp: DateTime<Utc>,
    pub raw: String,
    pub numeric: Option<f64>,
}

impl SinkRecord {
    pub fn new(value: &ExtractedValue, timestamp: DateTime<Utc>) -> Self {
        Self {
            timestamp,
            raw: value.raw.clone(),
            numeric: value.numeric,
        }
    }
}

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("sink http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("sink io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("api call to {context} failed ({status}): {body}")]
    Api {
        context: String,
        status: reqwest::StatusCode,
        body: String,
    },
}

/// Persists one record per successful run.
#[async_trait]
pub trait RecordSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn record(&self, record: &SinkRecord) -> Result<(), SinkError>;
}

/// Pushes a short human-readable line about how the run went.
#[async_trait]
pub trait MessageSink: Send + Sync {
    fn name(&self) -> &'static str;

    async fn push(&self, message: &str) -> Result<(), SinkError>;
}
