//! `getEvent` result parsing and the background status poller.
//!
//! The `getEvent` result is a positional array whose slots hold an object,
//! an array of objects, or `null`, depending on model and API version:
//!
//! ```text
//! [ null,
//!   {"type": "cameraStatus", "cameraStatus": "IDLE"},
//!   ...
//!   [{"type": "storageInformation", "numberOfRecordableImages": 812, ...}],
//!   ...
//!   {"type": "focusStatus", "focusStatus": "Focused"} ]
//! ```
//!
//! Slot positions shift between versions, so lookups scan every slot for
//! the field name instead of indexing.

use std::time::Duration;

use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::rpc::{RpcClient, RpcRequest, Service};

const EVENT_CHANNEL_CAPACITY: usize = 64;

/// Objects carried by the result array, flattened one level.
fn objects(result: &Value) -> impl Iterator<Item = &serde_json::Map<String, Value>> {
    result
        .as_array()
        .into_iter()
        .flatten()
        .flat_map(|slot| match slot {
            Value::Array(inner) => inner.iter().collect::<Vec<_>>(),
            other => vec![other],
        })
        .filter_map(Value::as_object)
}

/// First value of `key` in any slot.
pub fn find_field<'a>(result: &'a Value, key: &str) -> Option<&'a Value> {
    objects(result).find_map(|obj| obj.get(key))
}

/// Every value of `key`, in slot order.
pub fn find_all<'a>(result: &'a Value, key: &str) -> Vec<&'a Value> {
    objects(result).filter_map(|obj| obj.get(key)).collect()
}

pub fn camera_status(result: &Value) -> Option<&str> {
    find_field(result, "cameraStatus").and_then(Value::as_str)
}

pub fn focus_statuses(result: &Value) -> Vec<String> {
    find_all(result, "focusStatus")
        .into_iter()
        .filter_map(Value::as_str)
        .map(str::to_string)
        .collect()
}

/// Recordable images on the first storage slot reporting a count.
/// Cameras report `-1` while the card is not ready.
pub fn recordable_images(result: &Value) -> Option<i64> {
    find_field(result, "numberOfRecordableImages").and_then(Value::as_i64)
}

pub fn liveview_status(result: &Value) -> Option<bool> {
    find_field(result, "liveviewStatus").and_then(Value::as_bool)
}

pub fn battery_level(result: &Value) -> Option<BatteryLevel> {
    objects(result).find_map(|obj| {
        let numerator = obj.get("levelNumer")?.as_i64()?;
        let denominator = obj.get("levelDenom")?.as_i64()?;
        Some(BatteryLevel {
            numerator,
            denominator,
        })
    })
}

/// Battery charge as reported, e.g. 3/4. Negative values mean unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryLevel {
    pub numerator: i64,
    pub denominator: i64,
}

impl BatteryLevel {
    pub fn percent(&self) -> Option<u8> {
        if self.numerator < 0 || self.denominator <= 0 {
            return None;
        }
        Some((self.numerator * 100 / self.denominator).clamp(0, 100) as u8)
    }
}

/// Status fragments republished by the [`EventPoller`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraEvent {
    /// `"Focused"`, `"Focusing"`, `"Failed"`, `"Not Focusing"` or a
    /// model-specific value.
    Focus(String),
    RecordableImages(i64),
    Battery(BatteryLevel),
}

/// Every event fragment present in one `getEvent` result.
pub fn parse_events(result: &Value) -> Vec<CameraEvent> {
    let mut events: Vec<CameraEvent> = focus_statuses(result)
        .into_iter()
        .map(CameraEvent::Focus)
        .collect();
    if let Some(count) = recordable_images(result) {
        events.push(CameraEvent::RecordableImages(count));
    }
    if let Some(level) = battery_level(result) {
        events.push(CameraEvent::Battery(level));
    }
    events
}

/// Short-polls `getEvent` and broadcasts what it finds.
///
/// Any number of subscribers may listen; slow ones lag and skip ahead
/// without affecting the poll cadence. A failed iteration is logged and
/// the loop carries on.
pub struct EventPoller {
    events: broadcast::Sender<CameraEvent>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl EventPoller {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self {
            events,
            task: Mutex::new(None),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CameraEvent> {
        self.events.subscribe()
    }

    /// Start polling. Returns `false` if already running.
    pub fn start(&self, rpc: RpcClient, version: &str, interval: Duration) -> bool {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return false;
        }

        let events = self.events.clone();
        let version = version.to_string();
        *task = Some(tokio::spawn(async move {
            poll_loop(rpc, events, version, interval).await;
        }));

        tracing::info!(interval_ms = interval.as_millis() as u64, "event poller started");
        true
    }

    /// Cancel the poll loop. Safe to call when not running.
    pub fn stop(&self) {
        if let Some(task) = self.task.lock().take() {
            task.abort();
            tracing::info!("event poller stopped");
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .as_ref()
            .is_some_and(|t| !t.is_finished())
    }
}

impl Default for EventPoller {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for EventPoller {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn poll_loop(
    rpc: RpcClient,
    events: broadcast::Sender<CameraEvent>,
    version: String,
    interval: Duration,
) {
    loop {
        let request = RpcRequest::new("getEvent").param(false).version(&version);
        match rpc.invoke(Service::Camera, request).await {
            Ok(result) => {
                for event in parse_events(&result) {
                    tracing::trace!(?event, "camera event");
                    // No subscribers is fine.
                    let _ = events.send(event);
                }
            }
            Err(e) => tracing::warn!(error = %e, "event poll failed"),
        }
        tokio::time::sleep(interval).await;
    }
}

/// Focus-status values only, filtered from a [`CameraEvent`] subscription.
pub struct FocusStream {
    rx: broadcast::Receiver<CameraEvent>,
}

impl FocusStream {
    pub fn new(rx: broadcast::Receiver<CameraEvent>) -> Self {
        Self { rx }
    }

    /// Next focus status, or `None` once the poller is gone.
    pub async fn next(&mut self) -> Option<String> {
        loop {
            match self.rx.recv().await {
                Ok(CameraEvent::Focus(status)) => return Some(status),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "focus subscriber lagged");
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}
