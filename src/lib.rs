//! Session-based extraction of a portfolio figure from an authenticated fund
//! portal.
//!
//! The crate drives a real Chrome instance through a fixed pipeline: land on
//! the login page, clear the consent popup, resolve the session, confirm the
//! portfolio page through a navigation gate, and extract the individual rate
//! of return.  A run always reduces to a single [`outcome::RunOutcome`],
//! which the sinks layer records and announces.

pub mod browser;
pub mod config;
pub mod dom;
pub mod extract;
pub mod logging;
pub mod metrics;
pub mod navigation;
pub mod outcome;
pub mod popup;
pub mod run;
pub mod runtime;
pub mod session;
pub mod sinks;
pub mod strategy;

#[cfg(test)]
pub(crate) mod testing;

pub use config::FundwatchConfig;
pub use outcome::{RunError, RunOutcome};
pub use run::run_once;
