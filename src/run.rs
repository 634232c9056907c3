//! Run orchestrator: one linear pass from login page to delivered outcome.
//!
//! Stage order is fixed: land on the login page, clear the consent popup,
//! resolve the session, pass the navigation gate, extract the value.  The
//! pass is reduced to exactly one [`RunOutcome`], the browser is released on
//! every exit path, and sink trouble is contained here: delivery failures are
//! logged under the `sink` category but never overturn the browser work.

use chrono::SecondsFormat;
use serde_json::json;

use crate::browser::PortalDriver;
use crate::config::{FundwatchConfig, RunTarget};
use crate::extract::{self, ExtractOptions};
use crate::logging::RunLogger;
use crate::metrics::{self, RunMetrics, RunStage};
use crate::navigation::{self, GateOptions};
use crate::outcome::{ErrorKind, ExtractedValue, RunError, RunOutcome};
use crate::popup::{self, PopupOptions};
use crate::session::{self, SessionOptions};
use crate::sinks::{MessageSink, RecordSink, SinkRecord};

/// Downstream recipients of a finished run.
pub struct RunSinks {
    pub records: Vec<Box<dyn RecordSink>>,
    pub messenger: Option<Box<dyn MessageSink>>,
}

impl RunSinks {
    pub fn none() -> Self {
        Self {
            records: Vec::new(),
            messenger: None,
        }
    }
}

/// Drive one full portal pass and deliver whatever it produced.
pub async fn run_once(
    driver: Box<dyn PortalDriver>,
    target: &RunTarget,
    config: &FundwatchConfig,
    sinks: &RunSinks,
    logger: &RunLogger,
) -> (RunOutcome, RunMetrics) {
    let mut metrics = RunMetrics::default();
    let result = drive_portal(driver.as_ref(), target, config, logger, &mut metrics).await;

    if let Err(err) = driver.shutdown().await {
        logger.error(
            format!("browser shutdown failed: {err}"),
            Some("run"),
            None,
        );
    }

    let outcome = match result {
        Ok(value) => {
            logger.info(
                format!("run extracted '{}'", value.raw),
                Some("run"),
                Some(json!({ "numeric": value.numeric })),
            );
            RunOutcome::success(value)
        }
        Err(err) => {
            logger.error(
                format!("run failed: {err}"),
                Some("run"),
                Some(json!({ "kind": err.kind() })),
            );
            RunOutcome::failure(&err)
        }
    };

    let timer = metrics::start_stage_timer();
    deliver(&outcome, sinks, logger).await;
    metrics.record(RunStage::Delivery, metrics::stage_elapsed_ms(timer));

    logger.debug(
        "run finished",
        Some("run"),
        serde_json::to_value(&metrics).ok(),
    );

    (outcome, metrics)
}

async fn drive_portal(
    driver: &dyn PortalDriver,
    target: &RunTarget,
    config: &FundwatchConfig,
    logger: &RunLogger,
    metrics: &mut RunMetrics,
) -> Result<ExtractedValue, RunError> {
    let timer = metrics::start_stage_timer();
    logger.info(
        format!("opening login page {}", target.login_url),
        Some("run"),
        None,
    );
    driver.goto(target.login_url.as_str()).await?;
    driver.wait_for_quiescence(config.quiet_timeout_ms).await?;
    popup::resolve_popup(driver, &PopupOptions::from_config(config), logger).await?;
    metrics.record(RunStage::Popup, metrics::stage_elapsed_ms(timer));

    let timer = metrics::start_stage_timer();
    session::resolve_session(
        driver,
        &SessionOptions::from_config(config),
        &target.credentials,
        logger,
    )
    .await?;
    metrics.record(RunStage::Session, metrics::stage_elapsed_ms(timer));

    let timer = metrics::start_stage_timer();
    navigation::confirm_navigation(
        driver,
        target.portfolio_url.as_str(),
        &GateOptions::from_config(config),
        logger,
    )
    .await?;
    metrics.record(RunStage::Navigation, metrics::stage_elapsed_ms(timer));

    let timer = metrics::start_stage_timer();
    let value = extract::extract_value(driver, &ExtractOptions::from_config(config), logger).await;
    metrics.record(RunStage::Extract, metrics::stage_elapsed_ms(timer));
    value
}

async fn deliver(outcome: &RunOutcome, sinks: &RunSinks, logger: &RunLogger) {
    match outcome {
        RunOutcome::Success { value, timestamp } => {
            let record = SinkRecord::new(value, *timestamp);
            for sink in &sinks.records {
                match sink.record(&record).await {
                    Ok(()) => logger.info(
                        format!("{} sink recorded '{}'", sink.name(), record.raw),
                        Some("sink"),
                        None,
                    ),
                    Err(err) => logger.error(
                        format!("{} sink failed: {err}", sink.name()),
                        Some("sink"),
                        Some(json!({ "kind": ErrorKind::SinkFailure })),
                    ),
                }
            }
            if let Some(messenger) = &sinks.messenger {
                let message = format!(
                    "fund portal value {} at {}",
                    record.raw,
                    record.timestamp.to_rfc3339_opts(SecondsFormat::Secs, true)
                );
                push_message(messenger.as_ref(), &message, logger).await;
            }
        }
        RunOutcome::Failure { diagnostic, .. } => {
            if let Some(messenger) = &sinks.messenger {
                let message = format!("fund portal run failed: {diagnostic}");
                push_message(messenger.as_ref(), &message, logger).await;
            }
        }
    }
}

async fn push_message(messenger: &dyn MessageSink, message: &str, logger: &RunLogger) {
    match messenger.push(message).await {
        Ok(()) => logger.debug(
            format!("{} push delivered", messenger.name()),
            Some("sink"),
            None,
        ),
        Err(err) => logger.error(
            format!("{} push failed: {err}", messenger.name()),
            Some("sink"),
            Some(json!({ "kind": ErrorKind::SinkFailure })),
        ),
    }
}
