//! Camera session controller.
//!
//! A [`CameraSession`] is built once per connection and passed to whoever
//! needs the camera (CLI, intervalometer, UI layer). It owns:
//!
//! - the RPC client and its connection pool,
//! - the cached exposure settings ([`CameraSettingSet`]),
//! - the transient shooting state ([`ShootingSession`]),
//! - the live-view reader and the event poller tasks.
//!
//! Camera-mutating calls (mode switches, captures) take an async operation
//! lock, so two of them are never in flight for the same session.
//!
//! ## Connection handshake
//!
//! ```text
//! startRecMode          (not every model needs it; failure is logged)
//! getEvent ... IDLE     (bounded idle-wait)
//! getShootMode
//! getAvailable*         (once per connection, failures logged)
//! ```

pub mod capture;
pub mod content;
pub mod events;
pub mod settings;

#[cfg(test)]
pub(crate) mod stub;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use serde_json::{Value, json};
use tokio::sync::broadcast;
use tokio::time::Instant;

use crate::error::{CameraError, Result, TransportError};
use crate::media::{FrameSink, LiveViewStream};
use crate::rpc::{CameraEndpoint, HttpTransport, RpcClient, RpcRequest, RpcTransport, Service};
pub use capture::CaptureResult;
pub use content::{ContentItem, ContentKind};
pub use events::{BatteryLevel, CameraEvent, EventPoller, FocusStream};
pub use settings::{CameraSettingSet, ExposureSetting, parse_shutter_speed_ms};

/// `cameraStatus` value meaning ready for the next command.
pub const IDLE_STATUS: &str = "IDLE";
/// Reported by some firmware after switching to contents transfer.
pub const CONTENTS_TRANSFER_STATUS: &str = "ContentsTransfer";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShootMode {
    Still,
    Movie,
}

impl ShootMode {
    pub fn as_str(self) -> &'static str {
        match self {
            ShootMode::Still => "still",
            ShootMode::Movie => "movie",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "still" => Some(ShootMode::Still),
            "movie" => Some(ShootMode::Movie),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFunction {
    RemoteShooting,
    ContentsTransfer,
}

impl CameraFunction {
    pub fn as_str(self) -> &'static str {
        match self {
            CameraFunction::RemoteShooting => "Remote Shooting",
            CameraFunction::ContentsTransfer => "Contents Transfer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Remote Shooting" => Some(CameraFunction::RemoteShooting),
            "Contents Transfer" => Some(CameraFunction::ContentsTransfer),
            _ => None,
        }
    }
}

/// Transient per-connection state. `None` means not known yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShootingSession {
    pub shoot_mode: Option<ShootMode>,
    pub camera_function: Option<CameraFunction>,
    /// Set while a still capture or bulb/continuous exposure is running.
    pub capturing: bool,
    /// Preview URL while live view is streaming.
    pub liveview_url: Option<String>,
}

/// Timing and protocol-version knobs for a session.
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Sleep between `getEvent` polls while waiting for idle.
    pub idle_poll_interval: Duration,
    /// Default idle-wait deadline.
    pub idle_timeout: Duration,
    /// Idle-wait deadline while winding down a burst.
    pub shutdown_idle_timeout: Duration,
    pub focus_poll_interval: Duration,
    /// `getEvent` version for idle-wait and storage counts.
    pub idle_event_version: String,
    /// `getEvent` version for the focus poller; carries `focusStatus`.
    pub focus_event_version: String,
    /// `getContentList` version.
    pub content_version: String,
    /// Accept `ContentsTransfer` as idle.
    pub tolerate_contents_transfer_as_idle: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_poll_interval: Duration::from_millis(200),
            idle_timeout: Duration::from_secs(10),
            shutdown_idle_timeout: Duration::from_secs(30),
            focus_poll_interval: Duration::from_millis(500),
            idle_event_version: "1.0".to_string(),
            focus_event_version: "1.2".to_string(),
            content_version: "1.3".to_string(),
            tolerate_contents_transfer_as_idle: true,
        }
    }
}

/// One connection to one camera.
pub struct CameraSession {
    rpc: RpcClient,
    config: SessionConfig,
    state: RwLock<ShootingSession>,
    settings: Mutex<CameraSettingSet>,
    /// Serializes camera-mutating calls.
    operation: tokio::sync::Mutex<()>,
    liveview: LiveViewStream,
    poller: EventPoller,
}

impl CameraSession {
    /// Build a session over any transport. No request is sent.
    pub fn new(
        transport: Arc<dyn RpcTransport>,
        endpoint: CameraEndpoint,
        config: SessionConfig,
    ) -> Self {
        Self {
            rpc: RpcClient::new(transport, endpoint),
            config,
            state: RwLock::new(ShootingSession::default()),
            settings: Mutex::new(CameraSettingSet::default()),
            operation: tokio::sync::Mutex::new(()),
            liveview: LiveViewStream::new(),
            poller: EventPoller::new(),
        }
    }

    /// Connect over HTTP and run the handshake.
    pub async fn connect(endpoint: CameraEndpoint, config: SessionConfig) -> Result<Arc<Self>> {
        let session = Arc::new(Self::new(
            Arc::new(HttpTransport::new()),
            endpoint,
            config,
        ));
        session.handshake().await?;
        Ok(session)
    }

    /// Put the camera in remote shooting and load the settings cache.
    ///
    /// Only an idle-wait failure is fatal. Unsupported setting queries are
    /// normal on some models and are logged instead.
    pub async fn handshake(&self) -> Result<()> {
        if let Err(e) = self.start_rec_mode().await {
            tracing::debug!(error = %e, "startRecMode failed, continuing");
        }
        self.wait_for_idle(self.config.idle_timeout).await?;

        if let Err(e) = self.refresh_shoot_mode().await {
            tracing::warn!(error = %e, "could not read shoot mode");
        }
        for setting in ExposureSetting::ALL {
            if let Err(e) = self.refresh_available(setting).await {
                tracing::warn!(setting = setting.name(), error = %e, "setting unavailable");
            }
        }

        tracing::info!(
            control_url = self.rpc.endpoint().control_url(),
            shoot_mode = ?self.shoot_mode(),
            "camera session ready"
        );
        Ok(())
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        self.rpc.endpoint()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// Snapshot of the transient state.
    pub fn shooting_state(&self) -> ShootingSession {
        self.state.read().clone()
    }

    pub fn is_capturing(&self) -> bool {
        self.state.read().capturing
    }

    pub fn shoot_mode(&self) -> Option<ShootMode> {
        self.state.read().shoot_mode
    }

    pub fn camera_function(&self) -> Option<CameraFunction> {
        self.state.read().camera_function
    }

    pub(crate) async fn invoke_camera(&self, request: RpcRequest) -> Result<Value> {
        self.rpc.invoke(Service::Camera, request).await
    }

    // Mode control

    pub async fn start_rec_mode(&self) -> Result<()> {
        self.invoke_camera(RpcRequest::new("startRecMode")).await?;
        Ok(())
    }

    pub async fn stop_rec_mode(&self) -> Result<()> {
        self.invoke_camera(RpcRequest::new("stopRecMode")).await?;
        Ok(())
    }

    pub async fn set_camera_function(&self, function: CameraFunction) -> Result<()> {
        let _op = self.operation.lock().await;
        self.invoke_camera(RpcRequest::new("setCameraFunction").param(function.as_str()))
            .await?;
        self.state.write().camera_function = Some(function);
        tracing::info!(function = function.as_str(), "camera function set");
        Ok(())
    }

    pub async fn refresh_camera_function(&self) -> Result<CameraFunction> {
        let result = self
            .invoke_camera(RpcRequest::new("getCameraFunction"))
            .await?;
        let function = first_str(&result)
            .and_then(CameraFunction::parse)
            .ok_or_else(|| CameraError::unexpected("getCameraFunction", result.to_string()))?;
        self.state.write().camera_function = Some(function);
        Ok(function)
    }

    pub async fn enter_contents_transfer(&self) -> Result<()> {
        self.set_camera_function(CameraFunction::ContentsTransfer)
            .await
    }

    pub async fn enter_remote_shooting(&self) -> Result<()> {
        self.set_camera_function(CameraFunction::RemoteShooting)
            .await
    }

    pub async fn set_shoot_mode(&self, mode: ShootMode) -> Result<()> {
        let _op = self.operation.lock().await;
        self.apply_shoot_mode(mode).await
    }

    pub async fn refresh_shoot_mode(&self) -> Result<ShootMode> {
        let result = self.invoke_camera(RpcRequest::new("getShootMode")).await?;
        let mode = first_str(&result)
            .and_then(ShootMode::parse)
            .ok_or_else(|| CameraError::unexpected("getShootMode", result.to_string()))?;
        self.state.write().shoot_mode = Some(mode);
        Ok(mode)
    }

    /// Switch shoot mode unless the cached mode already matches.
    /// Caller must hold the operation lock.
    pub(crate) async fn ensure_shoot_mode(&self, mode: ShootMode) -> Result<()> {
        if self.shoot_mode() == Some(mode) {
            return Ok(());
        }
        self.apply_shoot_mode(mode).await
    }

    async fn apply_shoot_mode(&self, mode: ShootMode) -> Result<()> {
        self.invoke_camera(RpcRequest::new("setShootMode").param(mode.as_str()))
            .await?;
        self.state.write().shoot_mode = Some(mode);
        tracing::debug!(mode = mode.as_str(), "shoot mode set");
        Ok(())
    }

    /// Set the continuous-shooting sub-mode, e.g. `"Continuous"`,
    /// `"Spd Priority Cont."` or `"Single"`.
    pub async fn set_cont_shooting_mode(&self, mode: &str) -> Result<()> {
        let _op = self.operation.lock().await;
        self.invoke_camera(
            RpcRequest::new("setContShootingMode").param(json!({ "contShootingMode": mode })),
        )
        .await?;
        tracing::debug!(mode, "continuous shooting mode set");
        Ok(())
    }

    pub async fn cont_shooting_mode(&self) -> Result<String> {
        let result = self
            .invoke_camera(RpcRequest::new("getContShootingMode"))
            .await?;
        result
            .get(0)
            .and_then(|slot| slot.get("contShootingMode"))
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CameraError::unexpected("getContShootingMode", result.to_string()))
    }

    // Settings

    /// Generic single-value getter, e.g. `getShutterSpeed` -> `"1/250"`.
    pub async fn get_setting(&self, method: &str) -> Result<String> {
        let result = self.invoke_camera(RpcRequest::new(method)).await?;
        result
            .get(0)
            .and_then(settings::value_to_string)
            .ok_or_else(|| CameraError::unexpected(method, result.to_string()))
    }

    /// Generic setter. Rejected locally, without a request, unless `value`
    /// is one of `valid_values`.
    pub async fn set_setting(&self, method: &str, value: &str, valid_values: &[String]) -> Result<()> {
        settings::validate_choice(method, value, valid_values)?;
        let _op = self.operation.lock().await;
        self.invoke_camera(RpcRequest::new(method).param(value))
            .await?;
        Ok(())
    }

    /// Cached candidate list. Empty until [`refresh_available`](Self::refresh_available)
    /// has succeeded for `setting`.
    pub fn available(&self, setting: ExposureSetting) -> Vec<String> {
        self.settings.lock().available(setting).to_vec()
    }

    pub async fn refresh_available(&self, setting: ExposureSetting) -> Result<Vec<String>> {
        let result = self
            .invoke_camera(RpcRequest::new(&setting.available_method()))
            .await?;
        let (current, values) = setting.parse_available(&result)?;

        let mut cache = self.settings.lock();
        if let Some(current) = current {
            cache.set_current(setting, current);
        }
        cache.set_available(setting, values.clone());
        Ok(values)
    }

    /// Cached current value.
    pub fn current(&self, setting: ExposureSetting) -> Option<String> {
        self.settings.lock().current(setting).map(str::to_string)
    }

    pub async fn refresh_current(&self, setting: ExposureSetting) -> Result<String> {
        let value = self.get_setting(&setting.get_method()).await?;
        self.settings.lock().set_current(setting, value.clone());
        Ok(value)
    }

    pub async fn current_or_refresh(&self, setting: ExposureSetting) -> Result<String> {
        match self.current(setting) {
            Some(value) => Ok(value),
            None => self.refresh_current(setting).await,
        }
    }

    /// Validate against the candidate list (fetched on first use) and set.
    pub async fn set_exposure(&self, setting: ExposureSetting, value: &str) -> Result<()> {
        let has_list = self.settings.lock().has_available(setting);
        let valid = if has_list {
            self.available(setting)
        } else {
            self.refresh_available(setting).await?
        };
        let method = setting.set_method();
        settings::validate_choice(&method, value, &valid)?;

        let _op = self.operation.lock().await;
        self.invoke_camera(RpcRequest::new(&method).param(setting.param(value)))
            .await?;
        self.settings
            .lock()
            .set_current(setting, value.to_string());
        tracing::info!(setting = setting.name(), value, "exposure setting changed");
        Ok(())
    }

    // Events

    /// One `getEvent` call. A long poll blocks on the camera until
    /// something changes.
    pub async fn get_event(&self, long_poll: bool, version: &str) -> Result<Value> {
        self.invoke_camera(
            RpcRequest::new("getEvent")
                .param(long_poll)
                .version(version),
        )
        .await
    }

    pub async fn recordable_images(&self) -> Result<i64> {
        let result = self
            .get_event(false, &self.config.idle_event_version)
            .await?;
        events::recordable_images(&result)
            .ok_or_else(|| CameraError::unexpected("getEvent", "no numberOfRecordableImages"))
    }

    fn is_idle(&self, status: &str) -> bool {
        status == IDLE_STATUS
            || (self.config.tolerate_contents_transfer_as_idle
                && status == CONTENTS_TRANSFER_STATUS)
    }

    /// Poll `getEvent` until the camera reports idle.
    ///
    /// Failed polls are logged and retried; cameras answer errors for a
    /// moment around mode switches. Only the deadline produces
    /// [`CameraError::Timeout`], naming the last failure if there was one.
    /// A closed transport ends the wait at once.
    pub async fn wait_for_idle(&self, timeout: Duration) -> Result<()> {
        let deadline = Instant::now() + timeout;
        let mut polls = 0u32;
        let mut last_error: Option<CameraError> = None;
        loop {
            polls += 1;
            match self
                .get_event(false, &self.config.idle_event_version)
                .await
            {
                Ok(result) => {
                    let status = events::camera_status(&result);
                    if status.is_some_and(|s| self.is_idle(s)) {
                        tracing::debug!(polls, "camera idle");
                        return Ok(());
                    }
                    tracing::trace!(status = status.unwrap_or("none"), "waiting for idle");
                }
                Err(e @ CameraError::Transport(TransportError::Closed)) => return Err(e),
                Err(e) => {
                    tracing::debug!(polls, error = %e, "idle poll failed, retrying");
                    last_error = Some(e);
                }
            }

            if Instant::now() >= deadline {
                let awaited = match last_error {
                    Some(e) => format!("camera idle status (last poll error: {e})"),
                    None => "camera idle status".to_string(),
                };
                return Err(CameraError::Timeout {
                    awaited,
                    after: timeout,
                });
            }
            tokio::time::sleep(self.config.idle_poll_interval).await;
        }
    }

    // Live view

    /// Ask the camera for a preview URL and start reading frames into `sink`.
    pub async fn start_live_view(&self, sink: Arc<dyn FrameSink>) -> Result<String> {
        let result = self
            .invoke_camera(RpcRequest::new("startLiveview"))
            .await?;
        let url = first_str(&result)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .ok_or_else(|| CameraError::unexpected("startLiveview", result.to_string()))?;

        if let Err(e) = self.liveview.start(&url, sink).await {
            if let Err(stop_err) = self.invoke_camera(RpcRequest::new("stopLiveview")).await {
                tracing::warn!(error = %stop_err, "stopLiveview failed");
            }
            return Err(e);
        }
        self.state.write().liveview_url = Some(url.clone());
        Ok(url)
    }

    /// Stop the reader and tell the camera. Safe to call when not streaming.
    pub async fn stop_live_view(&self) {
        let was_streaming = self.liveview.stop();
        self.state.write().liveview_url = None;
        if was_streaming
            && let Err(e) = self.invoke_camera(RpcRequest::new("stopLiveview")).await
        {
            tracing::warn!(error = %e, "stopLiveview failed");
        }
    }

    pub fn is_live_view_active(&self) -> bool {
        self.liveview.is_active()
    }

    // Focus polling

    /// Start the background event poller. Returns `false` if it is
    /// already running.
    pub fn start_focus_poll(&self) -> bool {
        self.poller.start(
            self.rpc.clone(),
            &self.config.focus_event_version,
            self.config.focus_poll_interval,
        )
    }

    pub fn stop_focus_poll(&self) {
        self.poller.stop();
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<CameraEvent> {
        self.poller.subscribe()
    }

    pub fn focus_stream(&self) -> FocusStream {
        FocusStream::new(self.poller.subscribe())
    }

    /// Stop the poller and the stream, forget transient state and close
    /// the connection pool. Outstanding requests fail with
    /// [`TransportError::Closed`](crate::TransportError::Closed).
    pub fn disconnect(&self) {
        self.poller.stop();
        self.liveview.stop();
        *self.state.write() = ShootingSession::default();
        self.rpc.close();
        tracing::info!(control_url = self.rpc.endpoint().control_url(), "camera session closed");
    }
}

fn first_str(result: &Value) -> Option<&str> {
    result.get(0).and_then(Value::as_str)
}

#[cfg(test)]
mod tests {
    use super::stub::{StubCamera, camera_status_event, session_with};
    use super::*;
    use crate::rpc::RpcResponse;

    #[tokio::test(start_paused = true)]
    async fn idle_after_k_polls() {
        const K: usize = 4;
        let stub = StubCamera::new(|req, nth| match req.method.as_str() {
            "getEvent" if nth + 1 >= K => RpcResponse::Result(camera_status_event("IDLE")),
            "getEvent" => RpcResponse::Result(camera_status_event("StillCapturing")),
            _ => RpcResponse::Result(json!([0])),
        });
        let session = session_with(stub.clone());

        session.wait_for_idle(Duration::from_secs(10)).await.unwrap();
        assert_eq!(stub.count("getEvent"), K);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_wait_times_out() {
        let stub = StubCamera::new(|_, _| RpcResponse::Result(camera_status_event("NotReady")));
        let session = session_with(stub.clone());

        let started = Instant::now();
        let err = session
            .wait_for_idle(Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_secs(1));
        assert!(stub.count("getEvent") >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_wait_retries_after_failed_poll() {
        let stub = StubCamera::new(|req, nth| match req.method.as_str() {
            "getEvent" if nth == 0 => RpcResponse::Error {
                code: 1,
                message: "Any".to_string(),
            },
            "getEvent" => RpcResponse::Result(camera_status_event("IDLE")),
            _ => RpcResponse::Result(json!([0])),
        });
        let session = session_with(stub.clone());

        session.wait_for_idle(Duration::from_secs(10)).await.unwrap();
        assert_eq!(stub.count("getEvent"), 2);
        let times = stub.call_times("getEvent");
        assert!(times[1] - times[0] >= session.config().idle_poll_interval);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_wait_timeout_names_last_error() {
        let stub = StubCamera::new(|_, _| RpcResponse::Error {
            code: 40400,
            message: "Not available now".to_string(),
        });
        let session = session_with(stub.clone());

        let err = session
            .wait_for_idle(Duration::from_secs(1))
            .await
            .unwrap_err();
        match err {
            CameraError::Timeout { awaited, .. } => assert!(awaited.contains("40400"), "{awaited}"),
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(stub.count("getEvent") >= 5);
    }

    #[tokio::test(start_paused = true)]
    async fn idle_wait_stops_on_closed_transport() {
        let stub = StubCamera::ok();
        let session = session_with(stub.clone());
        session.disconnect();

        let err = session
            .wait_for_idle(Duration::from_secs(10))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Transport(TransportError::Closed)));
    }

    #[tokio::test(start_paused = true)]
    async fn contents_transfer_counts_as_idle_when_tolerated() {
        let stub =
            StubCamera::new(|_, _| RpcResponse::Result(camera_status_event("ContentsTransfer")));
        let session = session_with(stub.clone());
        session.wait_for_idle(Duration::from_secs(1)).await.unwrap();

        let strict = CameraSession::new(
            stub,
            CameraEndpoint::new("http://stub/camera", "http://stub/avContent"),
            SessionConfig {
                tolerate_contents_transfer_as_idle: false,
                ..SessionConfig::default()
            },
        );
        assert!(strict.wait_for_idle(Duration::from_secs(1)).await.is_err());
    }

    #[tokio::test]
    async fn set_setting_rejects_locally() {
        let stub = StubCamera::ok();
        let session = session_with(stub.clone());

        let valid = vec!["100".to_string(), "200".to_string()];
        let err = session
            .set_setting("setIsoSpeedRate", "6400", &valid)
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Validation(_)));
        assert!(stub.calls().is_empty());

        session
            .set_setting("setIsoSpeedRate", "200", &valid)
            .await
            .unwrap();
        assert_eq!(stub.calls(), vec!["setIsoSpeedRate"]);
    }

    #[tokio::test]
    async fn set_exposure_fetches_candidates_once() {
        let stub = StubCamera::new(|req, _| match req.method.as_str() {
            "getAvailableFNumber" => RpcResponse::Result(json!(["4.0", ["2.8", "4.0", "5.6"]])),
            _ => RpcResponse::Result(json!([0])),
        });
        let session = session_with(stub.clone());

        session
            .set_exposure(ExposureSetting::FNumber, "5.6")
            .await
            .unwrap();
        assert!(
            session
                .set_exposure(ExposureSetting::FNumber, "1.4")
                .await
                .is_err()
        );
        assert_eq!(stub.count("getAvailableFNumber"), 1);
        assert_eq!(stub.count("setFNumber"), 1);
        assert_eq!(
            session.current(ExposureSetting::FNumber).as_deref(),
            Some("5.6")
        );
    }

    #[tokio::test]
    async fn shoot_mode_switch_is_cached() {
        let stub = StubCamera::idle_camera();
        let session = session_with(stub.clone());

        session.capture_still().await.unwrap();
        session.capture_still().await.unwrap();
        assert_eq!(stub.count("setShootMode"), 1);
        assert_eq!(stub.count("actTakePicture"), 2);
        assert!(!session.is_capturing());
    }

    #[tokio::test]
    async fn long_shooting_follows_up_with_await() {
        let stub = StubCamera::new(|req, _| match req.method.as_str() {
            "actTakePicture" => RpcResponse::Error {
                code: capture::STILL_CAPTURE_NOT_FINISHED,
                message: "Long shooting".to_string(),
            },
            "awaitTakePicture" => RpcResponse::Result(json!([["http://cam/DSC0001.JPG"]])),
            _ => RpcResponse::Result(json!([0])),
        });
        let session = session_with(stub.clone());

        let result = session.capture_still().await.unwrap();
        assert_eq!(result.urls, vec!["http://cam/DSC0001.JPG"]);
        assert_eq!(stub.count("awaitTakePicture"), 1);
        assert!(!session.is_capturing());
    }

    #[tokio::test]
    async fn capturing_cleared_on_error() {
        let stub = StubCamera::new(|req, _| match req.method.as_str() {
            "actTakePicture" => RpcResponse::Error {
                code: 40400,
                message: "Not available now".to_string(),
            },
            _ => RpcResponse::Result(json!([0])),
        });
        let session = session_with(stub);

        let err = session.capture_still().await.unwrap_err();
        assert_eq!(err.protocol_code(), Some(40400));
        assert!(!session.is_capturing());
    }

    #[tokio::test]
    async fn bulb_stop_awaits_picture() {
        let stub = StubCamera::idle_camera();
        let session = session_with(stub.clone());

        session.start_bulb_exposure().await.unwrap();
        assert!(session.is_capturing());
        let result = session.stop_bulb_exposure().await.unwrap();
        assert!(!session.is_capturing());
        assert!(result.has_images());

        let calls = stub.calls();
        let stop = calls.iter().position(|m| m == "stopBulbShooting").unwrap();
        assert_eq!(calls[stop + 1], "awaitTakePicture");
    }

    #[tokio::test(start_paused = true)]
    async fn focus_poller_survives_failures_and_fans_out() {
        let versions = Arc::new(Mutex::new(Vec::new()));
        let seen = versions.clone();
        let stub = StubCamera::new(move |req, nth| {
            if req.method != "getEvent" {
                return RpcResponse::Result(json!([0]));
            }
            seen.lock().push(req.version.clone());
            match nth {
                1 => RpcResponse::Error {
                    code: 1,
                    message: "Any".to_string(),
                },
                _ => RpcResponse::Result(json!([
                    null,
                    {"type": "focusStatus", "focusStatus": format!("F{nth}")}
                ])),
            }
        });
        let session = session_with(stub.clone());
        let mut first = session.focus_stream();
        let mut second = session.focus_stream();

        assert!(session.start_focus_poll());
        assert!(!session.start_focus_poll());

        for stream in [&mut first, &mut second] {
            assert_eq!(stream.next().await.as_deref(), Some("F0"));
            assert_eq!(stream.next().await.as_deref(), Some("F2"));
        }
        assert!(versions.lock().iter().all(|v| v == "1.2"));

        session.stop_focus_poll();
        session.stop_focus_poll();
        let polls = stub.count("getEvent");
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(stub.count("getEvent"), polls);
    }

    #[tokio::test]
    async fn disconnect_closes_transport() {
        let stub = StubCamera::idle_camera();
        let session = session_with(stub.clone());
        session.start_focus_poll();

        session.disconnect();
        assert!(stub.is_closed());
        assert_eq!(session.shooting_state(), ShootingSession::default());
        assert!(session.capture_still().await.is_err());
    }
}
