//! Session Resolver: choose between a remembered session and a fresh login.
//!
//! This is the only stage that handles credentials.  Values are injected into
//! the page and never placed in log records or error messages.

use serde_json::Value as JsonValue;

use crate::browser::{DriverError, PortalDriver};
use crate::config::{Credentials, FundwatchConfig};
use crate::dom::{self, ControlRole};
use crate::logging::RunLogger;

const USERNAME_FIELD: &str = "username";
const PASSWORD_FIELD: &str = "password";

/// Budget for the login form to become fillable once the fresh-login path is
/// chosen.
const DEFAULT_FORM_WAIT_MS: u64 = 2_000;

/// Options for the session stage.
#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub enter_label: String,
    pub button_wait_ms: u64,
    pub link_wait_ms: u64,
    pub form_wait_ms: u64,
    pub quiet_timeout_ms: u64,
}

impl SessionOptions {
    pub fn from_config(config: &FundwatchConfig) -> Self {
        SessionOptions {
            enter_label: config.enter_label.clone(),
            button_wait_ms: config.enter_button_wait_ms,
            link_wait_ms: config.enter_link_wait_ms,
            form_wait_ms: DEFAULT_FORM_WAIT_MS,
            quiet_timeout_ms: config.quiet_timeout_ms,
        }
    }
}

/// Which path authenticated the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPath {
    Remembered,
    FreshLogin,
}

/// Resolve the login state and execute exactly one path.
///
/// The remembered-session control is probed first with the button role, then
/// with the link role.  Only when both probes run out of budget is the
/// credential form filled and submitted.  Lookup timeouts are routing
/// signals, not errors, and a login that silently fails is caught downstream
/// by the navigation gate.
pub async fn resolve_session(
    driver: &dyn PortalDriver,
    options: &SessionOptions,
    credentials: &Credentials,
    logger: &RunLogger,
) -> Result<SessionPath, DriverError> {
    let button = dom::click_labeled_script(ControlRole::Button, &options.enter_label);
    if dom::poll_script(driver, &button, options.button_wait_ms)
        .await?
        .is_some()
    {
        logger.info(
            "remembered session entered via button",
            Some("session"),
            None,
        );
        driver.wait_for_quiescence(options.quiet_timeout_ms).await?;
        return Ok(SessionPath::Remembered);
    }

    let link = dom::click_labeled_script(ControlRole::Link, &options.enter_label);
    if dom::poll_script(driver, &link, options.link_wait_ms)
        .await?
        .is_some()
    {
        logger.info("remembered session entered via link", Some("session"), None);
        driver.wait_for_quiescence(options.quiet_timeout_ms).await?;
        return Ok(SessionPath::Remembered);
    }

    logger.info(
        "no remembered session, submitting credentials",
        Some("session"),
        None,
    );
    fill_login_form(driver, options, credentials, logger).await?;
    driver.wait_for_quiescence(options.quiet_timeout_ms).await?;
    Ok(SessionPath::FreshLogin)
}

async fn fill_login_form(
    driver: &dyn PortalDriver,
    options: &SessionOptions,
    credentials: &Credentials,
    logger: &RunLogger,
) -> Result<(), DriverError> {
    let username = dom::fill_named_script(USERNAME_FIELD, &credentials.username);
    let password = dom::fill_named_script(PASSWORD_FIELD, &credentials.password);

    let filled_username = dom::poll_script(driver, &username, options.form_wait_ms).await?;
    let filled_password = dom::poll_script(driver, &password, options.form_wait_ms).await?;
    if filled_username.is_none() || filled_password.is_none() {
        logger.error(
            "login form fields not found; the navigation gate will decide",
            Some("session"),
            None,
        );
    }

    match dom::poll_script(driver, &dom::submit_form_script(), options.form_wait_ms).await? {
        Some(JsonValue::String(control)) => {
            logger.info(
                format!("login form submitted via {control} control"),
                Some("session"),
                None,
            );
        }
        Some(_) => {}
        None => {
            logger.error("no submit control found", Some("session"), None);
        }
    }
    Ok(())
}
