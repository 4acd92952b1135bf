//! Remote control client for cameras speaking the JSON-RPC-over-HTTP
//! remote API.
//!
//! ```no_run
//! # async fn run() -> camctl::Result<()> {
//! use camctl::{CameraEndpoint, CameraSession, Intervalometer, IntervalPlan, SessionConfig};
//!
//! let url = camctl::discovery::discover(std::time::Duration::from_secs(8)).await?;
//! let session = CameraSession::connect(
//!     CameraEndpoint::from_action_list_url(&url)?,
//!     SessionConfig::default(),
//! )
//! .await?;
//!
//! let (intervalometer, mut events) = Intervalometer::new(session.clone());
//! intervalometer.start(IntervalPlan::interval(2_000, Some(10)));
//! while let Some(event) = events.recv().await {
//!     println!("{event:?}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod discovery;
pub mod error;
pub mod intervalometer;
pub mod media;
pub mod rpc;
pub mod session;

pub use discovery::{DiscoveredCamera, DiscoveryConfig};
pub use error::{CameraError, DiscoveryErrorKind, Result, TransportError};
pub use intervalometer::{IntervalEvent, IntervalPlan, Intervalometer};
pub use media::{FrameSink, LiveFrame};
pub use rpc::{CameraEndpoint, HttpTransport, RpcRequest, RpcResponse, RpcTransport};
pub use session::{
    CameraEvent, CameraFunction, CameraSession, CaptureResult, ContentItem, ContentKind,
    ExposureSetting, SessionConfig, ShootMode, ShootingSession,
};
