//! Popup Resolver: dismiss the portal's consent popup when one appears.

use crate::browser::{DriverError, PortalDriver};
use crate::config::FundwatchConfig;
use crate::dom::{self, ControlRole};
use crate::logging::RunLogger;

/// Options for the popup stage.
#[derive(Debug, Clone)]
pub struct PopupOptions {
    pub label: String,
    pub wait_ms: u64,
    pub quiet_timeout_ms: u64,
}

impl PopupOptions {
    pub fn from_config(config: &FundwatchConfig) -> Self {
        PopupOptions {
            label: config.consent_label.clone(),
            wait_ms: config.popup_wait_ms,
            quiet_timeout_ms: config.quiet_timeout_ms,
        }
    }
}

/// What the resolver observed on the page.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PopupOutcome {
    Dismissed,
    Absent,
}

/// Click the consent control if it shows up within the budget.
///
/// Absence is a normal state, not an error: cold sessions get the popup,
/// warm ones do not, and both must leave the page in the same condition.
pub async fn resolve_popup(
    driver: &dyn PortalDriver,
    options: &PopupOptions,
    logger: &RunLogger,
) -> Result<PopupOutcome, DriverError> {
    let script = dom::click_labeled_script(ControlRole::Button, &options.label);
    match dom::poll_script(driver, &script, options.wait_ms).await? {
        Some(_) => {
            logger.info("consent popup dismissed", Some("popup"), None);
            driver.wait_for_quiescence(options.quiet_timeout_ms).await?;
            Ok(PopupOutcome::Dismissed)
        }
        None => {
            logger.debug(
                format!("no consent popup within {}ms", options.wait_ms),
                Some("popup"),
                None,
            );
            Ok(PopupOutcome::Absent)
        }
    }
}
