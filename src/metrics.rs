//! Per-stage timing collected across a portal run.

use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Stages tracked while a run moves through the portal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStage {
    Popup,
    Session,
    Navigation,
    Extract,
    Delivery,
}

/// Aggregated wall-clock milliseconds per stage.
#[derive(Debug, Default, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunMetrics {
    pub popup_elapsed_ms: u64,
    pub session_elapsed_ms: u64,
    pub navigation_elapsed_ms: u64,
    pub extract_elapsed_ms: u64,
    pub delivery_elapsed_ms: u64,
    pub total_elapsed_ms: u64,
}

impl RunMetrics {
    /// Merge the values from another metrics instance into this one.
    pub fn merge(&mut self, other: &RunMetrics) {
        self.popup_elapsed_ms += other.popup_elapsed_ms;
        self.session_elapsed_ms += other.session_elapsed_ms;
        self.navigation_elapsed_ms += other.navigation_elapsed_ms;
        self.extract_elapsed_ms += other.extract_elapsed_ms;
        self.delivery_elapsed_ms += other.delivery_elapsed_ms;
        self.total_elapsed_ms += other.total_elapsed_ms;
    }

    /// Record elapsed time for one stage and update the cumulative total.
    pub fn record(&mut self, stage: RunStage, elapsed_ms: u64) {
        match stage {
            RunStage::Popup => self.popup_elapsed_ms += elapsed_ms,
            RunStage::Session => self.session_elapsed_ms += elapsed_ms,
            RunStage::Navigation => self.navigation_elapsed_ms += elapsed_ms,
            RunStage::Extract => self.extract_elapsed_ms += elapsed_ms,
            RunStage::Delivery => self.delivery_elapsed_ms += elapsed_ms,
        }
        self.total_elapsed_ms += elapsed_ms;
    }
}

/// Start a stage timer using [`Instant::now`].
pub fn start_stage_timer() -> Instant {
    Instant::now()
}

/// Return the elapsed milliseconds since the provided start instant.
pub fn stage_elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}
