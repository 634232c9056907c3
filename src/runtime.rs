//! Chromiumoxide-backed implementation of [`PortalDriver`].
//!
//! Owns a single launched Chrome instance and the one tab the run drives.
//! Besides the plain CDP plumbing (navigate, evaluate, screenshot) this module
//! hosts the settled-network wait: a CDP-event bookkeeping loop that treats
//! the page as quiescent once no tracked request has been open for a short
//! quiet window.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    self, EventLoadingFailed, EventLoadingFinished, EventRequestServedFromCache,
    EventRequestWillBeSent, EventResponseReceived, ResourceType,
};
use chromiumoxide::cdp::browser_protocol::page::{
    self as page_domain, CaptureScreenshotFormat, EventFrameStoppedLoading,
};
use chromiumoxide::cdp::IntoEventKind;
use chromiumoxide::handler::viewport::Viewport as ChromiumViewport;
use chromiumoxide::listeners::EventStream;
use chromiumoxide::page::{Page as ChromiumPage, ScreenshotParams};
use futures_util::StreamExt;
use serde_json::{json, Value as JsonValue};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio::time::{self, Duration, MissedTickBehavior, Sleep};

use crate::browser::{DriverError, LaunchPlan, PortalDriver};
use crate::logging::RunLogger;

/// Idle stretch after which tracked network traffic counts as settled.
const QUIET_WINDOW: Duration = Duration::from_millis(500);
/// Cadence of the sweep that force-completes stalled requests.
const STALL_SWEEP_INTERVAL: Duration = Duration::from_millis(500);
/// Age past which an open request is considered stalled.
const STALL_THRESHOLD: Duration = Duration::from_secs(2);

/// Live, single-tab Chrome session.
pub struct ChromiumDriver {
    state: Arc<Mutex<Option<DriverState>>>,
    logger: RunLogger,
}

struct DriverState {
    browser: Browser,
    handler: JoinHandle<()>,
    page: ChromiumPage,
}

impl ChromiumDriver {
    /// Launch Chrome per the plan and open the tab the run will drive.
    ///
    /// Dropping the returned driver without calling [`PortalDriver::shutdown`]
    /// still releases the process; shutdown only makes the release eager.
    pub async fn launch(plan: &LaunchPlan, logger: RunLogger) -> Result<Self, DriverError> {
        let config = build_config(plan)?;
        let (browser, handler) = Browser::launch(config).await.map_err(driver_error)?;
        let handler = spawn_handler(handler);

        let page = match browser.new_page("about:blank").await {
            Ok(page) => page,
            Err(err) => {
                handler.abort();
                drop(browser);
                return Err(driver_error(err));
            }
        };

        Ok(Self {
            state: Arc::new(Mutex::new(Some(DriverState {
                browser,
                handler,
                page,
            }))),
            logger,
        })
    }

    async fn page(&self) -> Result<ChromiumPage, DriverError> {
        let guard = self.state.lock().await;
        let state = guard.as_ref().ok_or(DriverError::NotInitialized)?;
        Ok(state.page.clone())
    }
}

#[async_trait]
impl PortalDriver for ChromiumDriver {
    async fn goto(&self, url: &str) -> Result<(), DriverError> {
        let page = self.page().await?;
        page.goto(url).await.map_err(driver_error)?;
        Ok(())
    }

    async fn evaluate(&self, expression: &str) -> Result<JsonValue, DriverError> {
        let page = self.page().await?;
        let result = page.evaluate(expression).await.map_err(driver_error)?;
        Ok(result.value().cloned().unwrap_or(JsonValue::Null))
    }

    async fn current_url(&self) -> Result<String, DriverError> {
        let page = self.page().await?;
        let url = page.url().await.map_err(driver_error)?;
        url.ok_or_else(|| DriverError::Message("page reported no URL".to_string()))
    }

    async fn wait_for_quiescence(&self, timeout_ms: u64) -> Result<(), DriverError> {
        let page = self.page().await?;
        wait_for_settled_network(&page, timeout_ms, &self.logger).await
    }

    async fn capture_full_page(&self) -> Result<Vec<u8>, DriverError> {
        let page = self.page().await?;
        let params = ScreenshotParams::builder()
            .format(CaptureScreenshotFormat::Png)
            .full_page(true)
            .build();
        page.screenshot(params).await.map_err(driver_error)
    }

    async fn shutdown(&self) -> Result<(), DriverError> {
        let state = {
            let mut guard = self.state.lock().await;
            guard.take()
        };

        if let Some(state) = state {
            state.handler.abort();
            drop(state.browser);
            self.logger.debug("browser released", Some("driver"), None);
        }
        Ok(())
    }
}

fn build_config(plan: &LaunchPlan) -> Result<BrowserConfig, DriverError> {
    let viewport = ChromiumViewport {
        width: plan.viewport.width,
        height: plan.viewport.height,
        device_scale_factor: None,
        emulating_mobile: false,
        is_landscape: plan.viewport.width >= plan.viewport.height,
        has_touch: false,
    };

    let mut builder = BrowserConfig::builder();
    if let Some(path) = &plan.chrome_executable {
        builder = builder.chrome_executable(path);
    }

    let builder = builder.viewport(viewport).args(plan.args.clone());
    let builder = if plan.headless {
        builder
    } else {
        builder.with_head()
    };
    let builder = match &plan.user_data_dir {
        Some(dir) => builder.user_data_dir(dir),
        None => builder,
    };

    builder.build().map_err(DriverError::Message)
}

fn spawn_handler(mut handler: chromiumoxide::handler::Handler) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(result) = handler.next().await {
            if let Err(err) = result {
                eprintln!("chromiumoxide handler error: {err}");
            }
        }
    })
}

fn driver_error(err: impl std::fmt::Display) -> DriverError {
    DriverError::Message(err.to_string())
}

/// Block until page network traffic has been idle for [`QUIET_WINDOW`], or
/// until `timeout_ms` elapses. Timing out is not an error; the caller only
/// needs a best-effort settle point.
async fn wait_for_settled_network(
    page: &ChromiumPage,
    timeout_ms: u64,
    logger: &RunLogger,
) -> Result<(), DriverError> {
    if let Err(err) = page.execute(network::EnableParams::default()).await {
        logger.debug(
            format!("Network domain enable failed before settle wait: {err}"),
            Some("driver"),
            None,
        );
    }
    if let Err(err) = page.execute(page_domain::EnableParams::default()).await {
        logger.debug(
            format!("Page domain enable failed before settle wait: {err}"),
            Some("driver"),
            None,
        );
    }

    let (tx, mut rx) = mpsc::unbounded_channel();
    let mut listeners: Vec<JoinHandle<()>> = Vec::new();

    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventRequestWillBeSent>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::RequestStarted,
    ));
    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventLoadingFinished>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::LoadingFinished,
    ));
    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventLoadingFailed>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::LoadingFailed,
    ));
    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventRequestServedFromCache>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::ServedFromCache,
    ));
    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventResponseReceived>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::ResponseReceived,
    ));
    listeners.push(spawn_traffic_listener(
        page.event_listener::<EventFrameStoppedLoading>()
            .await
            .map_err(driver_error)?,
        tx.clone(),
        PageTraffic::FrameStopped,
    ));
    drop(tx);

    let mut watch = TrafficWatch::new();
    let mut quiet_timer: Option<Pin<Box<Sleep>>> = Some(Box::pin(time::sleep(QUIET_WINDOW)));
    let mut deadline = Box::pin(time::sleep(Duration::from_millis(timeout_ms)));
    let mut sweep_tick = time::interval(STALL_SWEEP_INTERVAL);
    sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            maybe_event = rx.recv() => {
                match maybe_event {
                    Some(PageTraffic::RequestStarted(ev)) => {
                        if !matches!(
                            ev.r#type.as_ref(),
                            Some(ResourceType::WebSocket | ResourceType::EventSource)
                        ) {
                            let document_frame = if matches!(ev.r#type.as_ref(), Some(ResourceType::Document)) {
                                ev.frame_id.as_ref().map(|id| id.as_ref().to_string())
                            } else {
                                None
                            };
                            watch.begin_request(
                                ev.request_id.as_ref().to_string(),
                                ev.request.url.clone(),
                                document_frame,
                            );
                            quiet_timer = None;
                        }
                    }
                    Some(PageTraffic::LoadingFinished(ev)) => {
                        if watch.finish_request(ev.request_id.as_ref()) {
                            quiet_timer = None;
                        }
                    }
                    Some(PageTraffic::LoadingFailed(ev)) => {
                        if watch.finish_request(ev.request_id.as_ref()) {
                            quiet_timer = None;
                        }
                    }
                    Some(PageTraffic::ServedFromCache(ev)) => {
                        if watch.finish_request(ev.request_id.as_ref()) {
                            quiet_timer = None;
                        }
                    }
                    Some(PageTraffic::ResponseReceived(ev)) => {
                        // data: responses never emit loadingFinished.
                        if ev.response.url.starts_with("data:")
                            && watch.finish_request(ev.request_id.as_ref())
                        {
                            quiet_timer = None;
                        }
                    }
                    Some(PageTraffic::FrameStopped(ev)) => {
                        if watch.finish_frame(ev.frame_id.as_ref()) {
                            quiet_timer = None;
                        }
                    }
                    None => break,
                }
            }
            _ = async {
                if let Some(timer) = quiet_timer.as_mut() {
                    timer.as_mut().await;
                }
            }, if quiet_timer.is_some() => {
                break;
            }
            _ = sweep_tick.tick() => {
                let forced = watch.sweep_stalled(STALL_THRESHOLD);
                if !forced.is_empty() {
                    for url in &forced {
                        logger.debug(
                            "forcing completion of stalled request",
                            Some("driver"),
                            Some(json!({ "url": url })),
                        );
                    }
                    quiet_timer = None;
                }
            }
            _ = &mut deadline => {
                if !watch.is_idle() {
                    logger.debug(
                        format!("settle wait timed out with {} open requests", watch.open_requests()),
                        Some("driver"),
                        None,
                    );
                }
                break;
            }
        }

        if watch.is_idle() && quiet_timer.is_none() {
            quiet_timer = Some(Box::pin(time::sleep(QUIET_WINDOW)));
        }
    }

    for listener in listeners {
        listener.abort();
    }

    Ok(())
}

enum PageTraffic {
    RequestStarted(EventRequestWillBeSent),
    LoadingFinished(EventLoadingFinished),
    LoadingFailed(EventLoadingFailed),
    ServedFromCache(EventRequestServedFromCache),
    ResponseReceived(EventResponseReceived),
    FrameStopped(EventFrameStoppedLoading),
}

fn spawn_traffic_listener<T, F>(
    mut stream: EventStream<T>,
    tx: mpsc::UnboundedSender<PageTraffic>,
    map: F,
) -> JoinHandle<()>
where
    T: IntoEventKind + Clone + Unpin + Send + 'static,
    F: Fn(T) -> PageTraffic + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(event) = stream.next().await {
            let owned = (*event).clone();
            if tx.send(map(owned)).is_err() {
                break;
            }
        }
    })
}

struct OpenRequest {
    url: String,
    started_at: Instant,
}

/// Bookkeeping for requests the settle wait still considers open.
struct TrafficWatch {
    inflight: HashMap<String, OpenRequest>,
    document_requests: HashMap<String, String>,
}

impl TrafficWatch {
    fn new() -> Self {
        Self {
            inflight: HashMap::new(),
            document_requests: HashMap::new(),
        }
    }

    fn begin_request(&mut self, request_id: String, url: String, document_frame: Option<String>) {
        if let Some(frame_id) = document_frame {
            self.document_requests.insert(frame_id, request_id.clone());
        }
        self.inflight.insert(
            request_id,
            OpenRequest {
                url,
                started_at: Instant::now(),
            },
        );
    }

    /// Close a request; true when it was still being tracked.
    fn finish_request(&mut self, request_id: &str) -> bool {
        let tracked = self.inflight.remove(request_id).is_some();
        self.document_requests.retain(|_, rid| rid != request_id);
        tracked
    }

    /// Close the document request of a frame that stopped loading.
    fn finish_frame(&mut self, frame_id: &str) -> bool {
        match self.document_requests.remove(frame_id) {
            Some(request_id) => self.finish_request(&request_id),
            None => false,
        }
    }

    /// Drop requests open longer than `threshold`, returning their URLs.
    fn sweep_stalled(&mut self, threshold: Duration) -> Vec<String> {
        let now = Instant::now();
        let stalled: Vec<String> = self
            .inflight
            .iter()
            .filter(|(_, req)| now.duration_since(req.started_at) > threshold)
            .map(|(id, _)| id.clone())
            .collect();

        let mut urls = Vec::with_capacity(stalled.len());
        for request_id in stalled {
            if let Some(req) = self.inflight.remove(&request_id) {
                urls.push(req.url);
            }
            self.document_requests.retain(|_, rid| rid != &request_id);
        }
        urls
    }

    fn is_idle(&self) -> bool {
        self.inflight.is_empty()
    }

    fn open_requests(&self) -> usize {
        self.inflight.len()
    }
}
