//! Capture operations and their results.

use serde_json::{Value, json};
use tokio::time::Instant;

use super::{CameraSession, ShootMode};
use crate::error::{CameraError, Result};
use crate::rpc::{RpcRequest, RpcResponse, Service};

/// Camera error code meaning "picture not ready yet, call
/// `awaitTakePicture`".
pub const STILL_CAPTURE_NOT_FINISHED: i64 = 40403;

/// Outcome of a capture: success flag and the resulting media URLs in
/// camera order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CaptureResult {
    pub success: bool,
    pub urls: Vec<String>,
}

impl CaptureResult {
    /// Normalize a capture result payload.
    ///
    /// Both wire shapes give the same list:
    ///
    /// ```
    /// use camctl::CaptureResult;
    /// use serde_json::json;
    ///
    /// let flat = CaptureResult::from_result(&json!(["http://a/1.jpg", "http://a/2.jpg"]));
    /// let nested = CaptureResult::from_result(&json!([["http://a/1.jpg", "http://a/2.jpg"]]));
    /// assert_eq!(flat, nested);
    /// ```
    pub fn from_result(result: &Value) -> Self {
        let urls = result
            .as_array()
            .into_iter()
            .flatten()
            .flat_map(|slot| match slot {
                Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
                other => vec![other],
            })
            .filter_map(Value::as_str)
            .filter(|url| !url.is_empty())
            .map(str::to_string)
            .collect();

        CaptureResult {
            success: true,
            urls,
        }
    }

    pub fn failed() -> Self {
        Self::default()
    }

    pub fn has_images(&self) -> bool {
        self.success && !self.urls.is_empty()
    }
}

/// Clears the session's capturing flag when dropped, so early returns,
/// errors and cancellation all reset it.
struct CapturingGuard<'a> {
    session: &'a CameraSession,
}

impl<'a> CapturingGuard<'a> {
    fn set(session: &'a CameraSession) -> Self {
        session.state.write().capturing = true;
        Self { session }
    }
}

impl Drop for CapturingGuard<'_> {
    fn drop(&mut self) {
        self.session.state.write().capturing = false;
    }
}

impl CameraSession {
    /// Take one still picture.
    ///
    /// Switches to still mode first if needed. The capturing flag is set
    /// for the duration of the call.
    pub async fn capture_still(&self) -> Result<CaptureResult> {
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Still).await?;

        let _capturing = CapturingGuard::set(self);
        let response = self
            .rpc
            .call(Service::Camera, &RpcRequest::new("actTakePicture"))
            .await?;

        match response {
            RpcResponse::Result(result) => Ok(CaptureResult::from_result(&result)),
            RpcResponse::Error { code, .. } if code == STILL_CAPTURE_NOT_FINISHED => {
                tracing::debug!("still capture not finished, awaiting picture");
                self.await_picture().await
            }
            RpcResponse::Error { code, message } => Err(CameraError::Protocol {
                method: "actTakePicture".to_string(),
                code,
                message,
            }),
        }
    }

    /// Call `awaitTakePicture` until the camera hands over the file URLs.
    ///
    /// Retries while the camera answers "not finished", bounded by the
    /// configured idle timeout.
    pub async fn await_picture(&self) -> Result<CaptureResult> {
        let deadline = Instant::now() + self.config.idle_timeout;
        loop {
            let response = self
                .rpc
                .call(Service::Camera, &RpcRequest::new("awaitTakePicture"))
                .await?;
            match response {
                RpcResponse::Result(result) => return Ok(CaptureResult::from_result(&result)),
                RpcResponse::Error { code, .. }
                    if code == STILL_CAPTURE_NOT_FINISHED && Instant::now() < deadline =>
                {
                    tokio::time::sleep(self.config.idle_poll_interval).await;
                }
                RpcResponse::Error { code, .. } if code == STILL_CAPTURE_NOT_FINISHED => {
                    return Err(CameraError::Timeout {
                        awaited: "picture after capture".to_string(),
                        after: self.config.idle_timeout,
                    });
                }
                RpcResponse::Error { code, message } => {
                    return Err(CameraError::Protocol {
                        method: "awaitTakePicture".to_string(),
                        code,
                        message,
                    });
                }
            }
        }
    }

    pub async fn start_bulb_exposure(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Still).await?;
        self.invoke_camera(RpcRequest::new("startBulbShooting"))
            .await?;
        self.state.write().capturing = true;
        tracing::info!("bulb exposure started");
        Ok(())
    }

    /// Close the shutter and collect the picture.
    ///
    /// `stopBulbShooting` carries no URLs, so this is two sequential calls:
    /// the stop, then [`await_picture`](Self::await_picture).
    pub async fn stop_bulb_exposure(&self) -> Result<CaptureResult> {
        let _op = self.operation.lock().await;
        let stopped = self.invoke_camera(RpcRequest::new("stopBulbShooting")).await;
        self.state.write().capturing = false;
        stopped?;
        tracing::info!("bulb exposure stopped");
        self.await_picture().await
    }

    pub async fn start_movie_rec(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Movie).await?;
        self.invoke_camera(RpcRequest::new("startMovieRec")).await?;
        tracing::info!("movie recording started");
        Ok(())
    }

    /// Stop recording. Some models return the movie URL, most return `[""]`.
    pub async fn stop_movie_rec(&self) -> Result<CaptureResult> {
        let _op = self.operation.lock().await;
        let result = self.invoke_camera(RpcRequest::new("stopMovieRec")).await?;
        tracing::info!("movie recording stopped");
        Ok(CaptureResult::from_result(&result))
    }

    pub async fn start_continuous_shooting(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Still).await?;
        self.invoke_camera(RpcRequest::new("startContShooting"))
            .await?;
        self.state.write().capturing = true;
        tracing::info!("continuous shooting started");
        Ok(())
    }

    pub async fn stop_continuous_shooting(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        let stopped = self.invoke_camera(RpcRequest::new("stopContShooting")).await;
        self.state.write().capturing = false;
        stopped?;
        tracing::info!("continuous shooting stopped");
        Ok(())
    }

    /// Half-press: start autofocus.
    pub async fn start_auto_focus(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Still).await?;
        self.invoke_camera(RpcRequest::new("actHalfPressShutter"))
            .await?;
        Ok(())
    }

    pub async fn stop_auto_focus(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.invoke_camera(RpcRequest::new("cancelHalfPressShutter"))
            .await?;
        Ok(())
    }

    /// Focus on a point given in percent of the frame (0.0..=100.0).
    /// Returns whether the camera reported focus acquired.
    pub async fn set_touch_af_position(&self, x_percent: f64, y_percent: f64) -> Result<bool> {
        if !(0.0..=100.0).contains(&x_percent) || !(0.0..=100.0).contains(&y_percent) {
            return Err(CameraError::Validation(format!(
                "touch AF position ({x_percent}, {y_percent}) outside 0..=100"
            )));
        }
        let _op = self.operation.lock().await;
        self.ensure_shoot_mode(ShootMode::Still).await?;
        let result = self
            .invoke_camera(
                RpcRequest::new("setTouchAFPosition")
                    .param(json!(x_percent))
                    .param(json!(y_percent)),
            )
            .await?;

        // [0, {"AFResult": true, "AFType": "Touch"}]
        let focused = result
            .as_array()
            .into_iter()
            .flatten()
            .find_map(|slot| slot.get("AFResult").and_then(Value::as_bool))
            .unwrap_or(false);
        Ok(focused)
    }

    pub async fn cancel_touch_af_position(&self) -> Result<()> {
        let _op = self.operation.lock().await;
        self.invoke_camera(RpcRequest::new("cancelTouchAFPosition"))
            .await?;
        Ok(())
    }
}
