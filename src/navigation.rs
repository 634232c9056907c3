//! Navigation Gate: confirm the browser actually reached the portfolio page.
//!
//! Reaching the portfolio URL is the only reliable signal that the session is
//! authenticated.  A silently failed login parks the browser on the login
//! page, so this gate is also the indirect detector for credential problems.

use std::time::Duration;

use tokio::time::{Instant, sleep};

use crate::browser::PortalDriver;
use crate::config::FundwatchConfig;
use crate::dom::POLL_INTERVAL;
use crate::logging::RunLogger;
use crate::outcome::RunError;

/// Options for the navigation stage.
#[derive(Debug, Clone)]
pub struct GateOptions {
    pub pattern: String,
    pub timeout_ms: u64,
    pub quiet_timeout_ms: u64,
}

impl GateOptions {
    pub fn from_config(config: &FundwatchConfig) -> Self {
        GateOptions {
            pattern: config.destination_pattern.clone(),
            timeout_ms: config.nav_timeout_ms,
            quiet_timeout_ms: config.quiet_timeout_ms,
        }
    }
}

/// Navigate to `url`, then block until the browser location matches the
/// destination pattern or the budget runs out.
pub async fn confirm_navigation(
    driver: &dyn PortalDriver,
    url: &str,
    options: &GateOptions,
    logger: &RunLogger,
) -> Result<(), RunError> {
    driver.goto(url).await?;

    let deadline = Instant::now() + Duration::from_millis(options.timeout_ms);
    loop {
        let location = driver.current_url().await?;
        if pattern_matches(&options.pattern, &location) {
            logger.info(
                format!("portfolio page confirmed at {location}"),
                Some("navigation"),
                None,
            );
            driver.wait_for_quiescence(options.quiet_timeout_ms).await?;
            return Ok(());
        }
        if Instant::now() >= deadline {
            logger.error(
                format!(
                    "location '{location}' never matched '{}' within {}ms",
                    options.pattern, options.timeout_ms
                ),
                Some("navigation"),
                None,
            );
            return Err(RunError::NavigationTimeout {
                pattern: options.pattern.clone(),
                timeout_ms: options.timeout_ms,
            });
        }
        sleep(POLL_INTERVAL).await;
    }
}

/// Glob match over the full URL.  `*` matches within a path segment, `**`
/// matches across segments.
pub fn pattern_matches(pattern: &str, value: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let value: Vec<char> = value.chars().collect();
    glob_match(&pattern, &value)
}

fn glob_match(pattern: &[char], value: &[char]) -> bool {
    let Some(&head) = pattern.first() else {
        return value.is_empty();
    };

    if head == '*' {
        let crosses_segments = pattern.get(1) == Some(&'*');
        let rest = if crosses_segments {
            &pattern[2..]
        } else {
            &pattern[1..]
        };
        let mut consumed = 0;
        loop {
            if glob_match(rest, &value[consumed..]) {
                return true;
            }
            if consumed >= value.len() {
                return false;
            }
            if !crosses_segments && value[consumed] == '/' {
                return false;
            }
            consumed += 1;
        }
    }

    match value.first() {
        Some(&first) if first == head => glob_match(&pattern[1..], &value[1..]),
        _ => false,
    }
}
