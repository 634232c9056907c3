//! Scripted [`PortalDriver`] used by unit tests across the crate.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value as JsonValue;

use crate::browser::{DriverError, PortalDriver};

type EvalFn = dyn Fn(&str) -> Result<JsonValue, DriverError> + Send + Sync;
type UrlFn = dyn Fn(usize) -> String + Send + Sync;

/// Call log shared between a [`ScriptedDriver`] and the test that owns it, so
/// assertions remain possible after the driver has been moved into the run.
#[derive(Default)]
pub(crate) struct DriverLog {
    pub evaluated: Mutex<Vec<String>>,
    pub visited: Mutex<Vec<String>>,
    pub url_probes: Mutex<usize>,
    pub quiescence_waits: Mutex<usize>,
    pub captures: Mutex<usize>,
    pub shutdown_calls: Mutex<usize>,
}

impl DriverLog {
    pub fn evaluation_count(&self) -> usize {
        self.evaluated.lock().unwrap().len()
    }

    pub fn visited_urls(&self) -> Vec<String> {
        self.visited.lock().unwrap().clone()
    }

    pub fn shutdown_count(&self) -> usize {
        *self.shutdown_calls.lock().unwrap()
    }

    pub fn quiescence_count(&self) -> usize {
        *self.quiescence_waits.lock().unwrap()
    }

    pub fn capture_count(&self) -> usize {
        *self.captures.lock().unwrap()
    }

    pub fn url_probe_count(&self) -> usize {
        *self.url_probes.lock().unwrap()
    }

    /// True when any evaluated script contains `needle`.
    pub fn saw(&self, needle: &str) -> bool {
        self.evaluated
            .lock()
            .unwrap()
            .iter()
            .any(|script| script.contains(needle))
    }
}

pub(crate) struct ScriptedDriver {
    eval: Arc<EvalFn>,
    url: Arc<UrlFn>,
    log: Arc<DriverLog>,
    screenshot: Option<Vec<u8>>,
    fail_goto: bool,
    fail_shutdown: bool,
}

impl ScriptedDriver {
    /// Driver whose `evaluate` answers come from `eval`.
    pub fn with_eval<F>(eval: F) -> Self
    where
        F: Fn(&str) -> Result<JsonValue, DriverError> + Send + Sync + 'static,
    {
        ScriptedDriver {
            eval: Arc::new(eval),
            url: Arc::new(|_| "about:blank".to_string()),
            log: Arc::new(DriverLog::default()),
            screenshot: Some(vec![0x89, b'P', b'N', b'G']),
            fail_goto: false,
            fail_shutdown: false,
        }
    }

    /// Fixed current URL for every probe.
    pub fn with_url(self, url: &str) -> Self {
        let fixed = url.to_string();
        self.with_url_fn(move |_| fixed.clone())
    }

    /// Current URL as a function of how many times it has been probed.
    pub fn with_url_fn<F>(mut self, url: F) -> Self
    where
        F: Fn(usize) -> String + Send + Sync + 'static,
    {
        self.url = Arc::new(url);
        self
    }

    pub fn with_screenshot(mut self, bytes: Vec<u8>) -> Self {
        self.screenshot = Some(bytes);
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.screenshot = None;
        self
    }

    pub fn failing_goto(mut self) -> Self {
        self.fail_goto = true;
        self
    }

    pub fn failing_shutdown(mut self) -> Self {
        self.fail_shutdown = true;
        self
    }

    pub fn log(&self) -> Arc<DriverLog> {
        Arc::clone(&self.log)
    }

    pub fn evaluation_count(&self) -> usize {
        self.log.evaluation_count()
    }
}

#[async_trait]
impl PortalDriver for ScriptedDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        self.log.visited.lock().unwrap().push(url.to_string());
        if self.fail_goto {
            return Err(DriverError::Message("navigation refused".to_string()));
        }
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<JsonValue, DriverError> {
        self.log
            .evaluated
            .lock()
            .unwrap()
            .push(expression.to_string());
        (self.eval)(expression)
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let mut probes = self.log.url_probes.lock().unwrap();
        let index = *probes;
        *probes += 1;
        Ok((self.url)(index))
    }

    async fn wait_for_quiescence(&self, _timeout_ms: u64) -> Result<(), DriverError> {
        *self.log.quiescence_waits.lock().unwrap() += 1;
        Ok(())
    }

    async fn capture_full_page(&self) -> Result<Vec<u8>, DriverError> {
        *self.log.captures.lock().unwrap() += 1;
        self.screenshot
            .clone()
            .ok_or_else(|| DriverError::Message("screenshot failed".to_string()))
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        *self.log.shutdown_calls.lock().unwrap() += 1;
        if self.fail_shutdown {
            return Err(DriverError::Message("browser already gone".to_string()));
        }
        Ok(())
    }
}
