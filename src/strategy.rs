//! Ordered selector strategies for locating the rate-of-return figure.
//!
//! The portal renders the figure in slightly different structures depending on
//! release and account state, so the table walks from the most specific markup
//! to the loosest text anchor.  Order is the disambiguation policy: the first
//! rule whose element carries non-empty text wins and later rules are never
//! consulted.

use serde_json::{Value as JsonValue, json};

use crate::browser::{DriverError, PortalDriver};
use crate::dom;
use crate::logging::RunLogger;

/// Label the portal places next to the personal rate-of-return figure.
const METRIC_LABEL: &str = "อัตราผลตอบแทนรายบุคคล";

/// How a strategy addresses its element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Css(String),
    XPath(String),
}

/// One prioritized heuristic for locating the target value.
#[derive(Debug, Clone)]
pub struct ExtractionRule {
    pub name: &'static str,
    pub locator: Locator,
    pub wait_ms: u64,
}

/// The winning rule and the text it produced.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleMatch {
    pub rule: &'static str,
    pub text: String,
}

/// The built-in strategy table for the portfolio page.
pub fn default_rules() -> Vec<ExtractionRule> {
    vec![
        ExtractionRule {
            name: "sibling-exact",
            locator: Locator::XPath(format!(
                "//p[contains(normalize-space(.), '{METRIC_LABEL}')]/following-sibling::h4[1]"
            )),
            wait_ms: 3_000,
        },
        ExtractionRule {
            name: "class-anchored",
            locator: Locator::XPath(format!(
                "//p[contains(@class, 'c-gray2')][contains(normalize-space(.), '{METRIC_LABEL}')]/following-sibling::h4[1]"
            )),
            wait_ms: 3_000,
        },
        ExtractionRule {
            name: "card-scoped",
            locator: Locator::XPath(format!(
                "(//div[contains(@class, 'border-card')][.//p[contains(@class, 'c-gray2')][contains(normalize-space(.), '{METRIC_LABEL}')]]//h4)[2]"
            )),
            wait_ms: 3_000,
        },
        ExtractionRule {
            name: "ytd-loose",
            locator: Locator::XPath(
                "//p[contains(., 'อัตราผลตอบแทน') and contains(., 'YTD')]/following-sibling::h4[1]"
                    .to_string(),
            ),
            wait_ms: 3_000,
        },
    ]
}

/// Walk `rules` in priority order and return the first non-empty trimmed text.
/// `Ok(None)` means every rule ran out of budget without producing text.
pub async fn find_first_match(
    driver: &dyn PortalDriver,
    rules: &[ExtractionRule],
    logger: &RunLogger,
) -> Result<Option<RuleMatch>, DriverError> {
    for rule in rules {
        let script = dom::read_text_script(&rule.locator);
        match dom::poll_script(driver, &script, rule.wait_ms).await? {
            Some(JsonValue::String(text)) => {
                logger.info(
                    format!("strategy '{}' matched", rule.name),
                    Some("extract"),
                    Some(json!({ "text": text })),
                );
                return Ok(Some(RuleMatch {
                    rule: rule.name,
                    text,
                }));
            }
            Some(other) => {
                logger.debug(
                    format!("strategy '{}' returned a non-text value", rule.name),
                    Some("extract"),
                    Some(json!({ "value": other })),
                );
            }
            None => {
                logger.debug(
                    format!(
                        "strategy '{}' found nothing within {}ms",
                        rule.name, rule.wait_ms
                    ),
                    Some("extract"),
                    None,
                );
            }
        }
    }
    Ok(None)
}
