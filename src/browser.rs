//! Browser session primitives.
//!
//! The run pipeline talks to the browser through the [`PortalDriver`] trait so
//! stage logic can be exercised against scripted fakes, while the production
//! implementation (see `runtime`) drives a real Chromium over CDP.  This module
//! also turns the high-level configuration into a strongly-typed launch plan.

use std::path::PathBuf;

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use thiserror::Error;

use crate::config::FundwatchConfig;

/// Error surfaced by a [`PortalDriver`] implementation.
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("browser driver error: {0}")]
    Message(String),
    #[error("browser driver not initialized")]
    NotInitialized,
}

/// Viewport dimensions.
#[derive(Debug, Clone, PartialEq)]
pub struct Viewport {
    pub width: u32,
    pub height: u32,
}

impl Default for Viewport {
    fn default() -> Self {
        Viewport {
            width: 1280,
            height: 720,
        }
    }
}

/// Launch arguments every portal session starts with.
pub fn default_launch_args() -> Vec<String> {
    vec![
        "--no-sandbox".to_string(),
        "--disable-dev-shm-usage".to_string(),
        "--disable-blink-features=AutomationControlled".to_string(),
    ]
}

/// Strongly-typed local launch plan derived from the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchPlan {
    pub headless: bool,
    pub args: Vec<String>,
    pub viewport: Viewport,
    pub chrome_executable: Option<PathBuf>,
    pub user_data_dir: Option<PathBuf>,
}

impl Default for LaunchPlan {
    fn default() -> Self {
        LaunchPlan {
            headless: true,
            args: default_launch_args(),
            viewport: Viewport::default(),
            chrome_executable: None,
            user_data_dir: None,
        }
    }
}

impl LaunchPlan {
    /// Build a launch plan from the configuration.
    pub fn from_config(config: &FundwatchConfig) -> Self {
        LaunchPlan {
            headless: config.headless,
            args: default_launch_args(),
            viewport: Viewport::default(),
            chrome_executable: config.chrome_executable.clone(),
            user_data_dir: config.user_data_dir.clone(),
        }
    }
}

/// The browser operations the run pipeline needs.
///
/// One instance corresponds to one browser session; `shutdown` releases it and
/// further calls may fail with [`DriverError::NotInitialized`].
#[async_trait]
pub trait PortalDriver: Send + Sync {
    /// Navigate the session's page to `url`.
    async fn goto(&self, url: &str) -> Result<(), DriverError>;

    /// Evaluate a JavaScript expression in the page and return its value.
    async fn evaluate(&self, expression: &str) -> Result<JsonValue, DriverError>;

    /// The page's current location.
    async fn current_url(&self) -> Result<String, DriverError>;

    /// Block until outstanding network activity settles or `timeout_ms`
    /// elapses.  Timing out is not an error.
    async fn wait_for_quiescence(&self, timeout_ms: u64) -> Result<(), DriverError>;

    /// Capture a full-page PNG of the current document.
    async fn capture_full_page(&self) -> Result<Vec<u8>, DriverError>;

    /// Release the browser session.  Must be safe to call more than once.
    async fn shutdown(&self) -> Result<(), DriverError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FundwatchConfig;

    #[test]
    fn launch_plan_copies_config_fields() {
        let mut config = FundwatchConfig::default();
        config.headless = false;
        config.chrome_executable = Some(PathBuf::from("/usr/bin/chromium"));
        config.user_data_dir = Some(PathBuf::from("/tmp/profile"));

        let plan = LaunchPlan::from_config(&config);
        assert!(!plan.headless);
        assert_eq!(
            plan.chrome_executable,
            Some(PathBuf::from("/usr/bin/chromium"))
        );
        assert_eq!(plan.user_data_dir, Some(PathBuf::from("/tmp/profile")));
        assert_eq!(plan.viewport, Viewport::default());
    }

    #[test]
    fn default_args_disarm_automation_detection() {
        let args = default_launch_args();
        assert!(args.contains(&"--no-sandbox".to_string()));
        assert!(args.contains(&"--disable-blink-features=AutomationControlled".to_string()));
    }
}
