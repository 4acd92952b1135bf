//! In-process stand-in camera for unit tests.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::time::Instant;

use super::{CameraSession, SessionConfig};
use crate::error::TransportError;
use crate::rpc::{CameraEndpoint, RpcRequest, RpcResponse, RpcTransport};

type Handler = dyn Fn(&RpcRequest, usize) -> RpcResponse + Send + Sync;

/// Answers every request through `handler(request, nth)`, where `nth` is
/// how many times that method was called before.
pub(crate) struct StubCamera {
    handler: Box<Handler>,
    calls: Mutex<Vec<(String, Instant)>>,
    counts: Mutex<HashMap<String, usize>>,
    closed: AtomicBool,
}

impl StubCamera {
    pub fn new(
        handler: impl Fn(&RpcRequest, usize) -> RpcResponse + Send + Sync + 'static,
    ) -> Arc<Self> {
        Arc::new(Self {
            handler: Box::new(handler),
            calls: Mutex::new(Vec::new()),
            counts: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// `[0]` for everything.
    pub fn ok() -> Arc<Self> {
        Self::new(|_, _| RpcResponse::Result(json!([0])))
    }

    /// Always idle, captures instantly, shutter 1/100.
    pub fn idle_camera() -> Arc<Self> {
        Self::new(|req, nth| match req.method.as_str() {
            "getEvent" => RpcResponse::Result(camera_status_event("IDLE")),
            "actTakePicture" | "awaitTakePicture" => {
                RpcResponse::Result(json!([[format!("http://cam/DSC{nth:05}.JPG")]]))
            }
            "getShutterSpeed" => RpcResponse::Result(json!(["1/100"])),
            _ => RpcResponse::Result(json!([0])),
        })
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(m, _)| m.clone()).collect()
    }

    pub fn call_times(&self, method: &str) -> Vec<Instant> {
        self.calls
            .lock()
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, at)| *at)
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.counts.lock().get(method).copied().unwrap_or(0)
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl RpcTransport for StubCamera {
    async fn call(&self, _url: &str, request: &RpcRequest) -> Result<RpcResponse, TransportError> {
        if self.is_closed() {
            return Err(TransportError::Closed);
        }
        let nth = {
            let mut counts = self.counts.lock();
            let n = counts.entry(request.method.clone()).or_insert(0);
            let nth = *n;
            *n += 1;
            nth
        };
        self.calls
            .lock()
            .push((request.method.clone(), Instant::now()));
        Ok((self.handler)(request, nth))
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

pub(crate) fn session_with(stub: Arc<StubCamera>) -> CameraSession {
    CameraSession::new(
        stub,
        CameraEndpoint::new("http://stub/camera", "http://stub/avContent"),
        SessionConfig::default(),
    )
}

/// A `getEvent` result carrying only a camera status.
pub(crate) fn camera_status_event(status: &str) -> Value {
    json!([null, {"type": "cameraStatus", "cameraStatus": status}])
}
