//! Value Extractor: walk the strategy table and normalize what it finds.

use std::path::{Path, PathBuf};

use serde_json::json;
use tokio::fs;

use crate::browser::{DriverError, PortalDriver};
use crate::config::FundwatchConfig;
use crate::logging::RunLogger;
use crate::outcome::{ExtractedValue, RunError};
use crate::strategy::{self, ExtractionRule};

/// Options for the extraction stage.
#[derive(Debug, Clone)]
pub struct ExtractOptions {
    pub rules: Vec<ExtractionRule>,
    pub screenshot_path: PathBuf,
}

impl ExtractOptions {
    pub fn from_config(config: &FundwatchConfig) -> Self {
        ExtractOptions {
            rules: strategy::default_rules(),
            screenshot_path: config.screenshot_path.clone(),
        }
    }
}

/// Extract the figure, or capture a full-page diagnostic and fail.
///
/// The diagnostic capture is best effort: a failed screenshot downgrades the
/// error message but never masks the extraction failure itself.
pub async fn extract_value(
    driver: &dyn PortalDriver,
    options: &ExtractOptions,
    logger: &RunLogger,
) -> Result<ExtractedValue, RunError> {
    if let Some(matched) = strategy::find_first_match(driver, &options.rules, logger).await? {
        let value = ExtractedValue::from_raw(matched.text);
        logger.info(
            format!("extracted '{}' via strategy '{}'", value.raw, matched.rule),
            Some("extract"),
            Some(json!({ "numeric": value.numeric })),
        );
        return Ok(value);
    }

    let screenshot = match capture_diagnostic(driver, &options.screenshot_path).await {
        Ok(()) => {
            logger.error(
                format!(
                    "no strategy matched; full-page diagnostic saved to {}",
                    options.screenshot_path.display()
                ),
                Some("extract"),
                None,
            );
            Some(options.screenshot_path.clone())
        }
        Err(err) => {
            logger.error(
                format!("no strategy matched and the diagnostic capture failed: {err}"),
                Some("extract"),
                None,
            );
            None
        }
    };
    Err(RunError::ExtractionNotFound { screenshot })
}

async fn capture_diagnostic(driver: &dyn PortalDriver, path: &Path) -> Result<(), DriverError> {
    let bytes = driver.capture_full_page().await?;
    fs::write(path, &bytes)
        .await
        .map_err(|err| DriverError::Message(format!("failed to write {}: {err}", path.display())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Verbosity;
    use crate::outcome::ErrorKind;
    use crate::strategy::Locator;
    use crate::testing::ScriptedDriver;
    use serde_json::Value as JsonValue;

    fn rules() -> Vec<ExtractionRule> {
        vec![
            ExtractionRule {
                name: "primary",
                locator: Locator::Css("#primary".to_string()),
                wait_ms: 10,
            },
            ExtractionRule {
                name: "fallback",
                locator: Locator::Css("#fallback".to_string()),
                wait_ms: 10,
            },
        ]
    }

    fn quiet_logger() -> RunLogger {
        RunLogger::new(Verbosity::Minimal)
    }

    #[tokio::test]
    async fn extraction_normalizes_the_matched_text() {
        let options = ExtractOptions {
            rules: rules(),
            screenshot_path: PathBuf::from("unused.png"),
        };
        let driver = ScriptedDriver::with_eval(|script| {
            if script.contains("#primary") {
                Ok(JsonValue::String("12.34%".to_string()))
            } else {
                Ok(JsonValue::Null)
            }
        });

        let value = extract_value(&driver, &options, &quiet_logger())
            .await
            .expect("extraction");
        assert_eq!(value.raw, "12.34%");
        assert_eq!(value.numeric, Some(12.34));
        assert_eq!(driver.log().capture_count(), 0);
    }

    #[tokio::test]
    async fn total_miss_writes_the_diagnostic_and_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug.png");
        let options = ExtractOptions {
            rules: rules(),
            screenshot_path: path.clone(),
        };
        let driver = ScriptedDriver::with_eval(|_| Ok(JsonValue::Null))
            .with_screenshot(b"PNGDATA".to_vec());

        let err = extract_value(&driver, &options, &quiet_logger())
            .await
            .expect_err("extraction must fail");
        assert_eq!(err.kind(), ErrorKind::ExtractionNotFound);
        match err {
            RunError::ExtractionNotFound { screenshot } => {
                assert_eq!(screenshot, Some(path.clone()));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(driver.log().capture_count(), 1);
        assert_eq!(std::fs::read(&path).expect("diagnostic file"), b"PNGDATA");
    }

    #[tokio::test]
    async fn failed_capture_still_reports_the_miss() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("debug.png");
        let options = ExtractOptions {
            rules: rules(),
            screenshot_path: path.clone(),
        };
        let driver = ScriptedDriver::with_eval(|_| Ok(JsonValue::Null)).failing_screenshot();

        let err = extract_value(&driver, &options, &quiet_logger())
            .await
            .expect_err("extraction must fail");
        match err {
            RunError::ExtractionNotFound { screenshot } => assert!(screenshot.is_none()),
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn probe_errors_propagate_unchanged() {
        let options = ExtractOptions {
            rules: rules(),
            screenshot_path: PathBuf::from("unused.png"),
        };
        let driver =
            ScriptedDriver::with_eval(|_| Err(DriverError::Message("tab crashed".to_string())));

        let err = extract_value(&driver, &options, &quiet_logger())
            .await
            .expect_err("driver error");
        assert_eq!(err.kind(), ErrorKind::Browser);
    }
}
