//! JSON-RPC transport.
//!
//! Every camera operation is an HTTP POST of a small JSON envelope to one
//! of two endpoint URLs (control or content, see
//! [`CameraEndpoint`]):
//!
//! ```text
//! POST /sony/camera HTTP/1.1
//! Content-Type: application/json
//!
//! {"method": "actTakePicture", "params": [], "id": 1, "version": "1.0"}
//! ```
//!
//! The transport only moves envelopes. A reply with an `error` field is a
//! successful call as far as this layer is concerned; deciding what a
//! camera error means is left to [`crate::session`].

pub mod endpoint;
pub mod request;
pub mod response;

use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde_json::Value;

use crate::error::{Result, TransportError};
pub use endpoint::{CameraEndpoint, Service};
pub use request::{DEFAULT_VERSION, RpcRequest};
pub use response::RpcResponse;

/// Per-request timeout for [`HttpTransport::new`]. Long-polling `getEvent`
/// calls can legitimately hold the connection for tens of seconds.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(35);

/// Something that can deliver an [`RpcRequest`] to a URL.
///
/// [`HttpTransport`] is the real implementation; tests substitute a stub
/// camera.
#[async_trait::async_trait]
pub trait RpcTransport: Send + Sync {
    async fn call(&self, url: &str, request: &RpcRequest) -> std::result::Result<RpcResponse, TransportError>;

    /// Release pooled connections. Later calls fail with
    /// [`TransportError::Closed`].
    fn close(&self) {}
}

/// `reqwest`-backed transport.
pub struct HttpTransport {
    client: RwLock<Option<reqwest::Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self::with_timeout(DEFAULT_RPC_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_default();
        Self {
            client: RwLock::new(Some(client)),
        }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RpcTransport for HttpTransport {
    async fn call(&self, url: &str, request: &RpcRequest) -> std::result::Result<RpcResponse, TransportError> {
        let client = self.client.read().clone().ok_or(TransportError::Closed)?;

        tracing::trace!(method = %request.method, version = %request.version, url, "rpc request");

        let response = client.post(url).json(request).send().await?;
        let status = response.status();
        if !status.is_success() {
            tracing::debug!(method = %request.method, status = status.as_u16(), "rpc HTTP failure");
            return Err(TransportError::Status(status.as_u16()));
        }

        let body = response.bytes().await?;
        let parsed = RpcResponse::parse(&body)?;

        if let RpcResponse::Error { code, message } = &parsed {
            tracing::debug!(method = %request.method, code, reason = %message, "camera returned error");
        }

        Ok(parsed)
    }

    fn close(&self) {
        if self.client.write().take().is_some() {
            tracing::debug!("rpc transport closed");
        }
    }
}

/// A transport bound to one camera's endpoints.
///
/// Cheap to clone; background tasks (event poller) hold their own copy.
#[derive(Clone)]
pub struct RpcClient {
    transport: Arc<dyn RpcTransport>,
    endpoint: CameraEndpoint,
}

impl RpcClient {
    pub fn new(transport: Arc<dyn RpcTransport>, endpoint: CameraEndpoint) -> Self {
        Self {
            transport,
            endpoint,
        }
    }

    pub fn endpoint(&self) -> &CameraEndpoint {
        &self.endpoint
    }

    /// Send `request` and return the raw response, error payloads included.
    pub async fn call(&self, service: Service, request: &RpcRequest) -> Result<RpcResponse> {
        let response = self
            .transport
            .call(self.endpoint.url(service), request)
            .await?;
        tracing::debug!(method = %request.method, ok = response.is_ok(), "rpc");
        Ok(response)
    }

    /// Send `request` and return its result payload. Error payloads become
    /// [`CameraError::Protocol`](crate::CameraError::Protocol).
    pub async fn invoke(&self, service: Service, request: RpcRequest) -> Result<Value> {
        self.call(service, &request)
            .await?
            .into_result(&request.method)
    }

    pub fn close(&self) {
        self.transport.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::CameraError;
    use serde_json::json;

    /// Answers every call with the same response, or fails once closed.
    struct FixedTransport {
        response: RpcResponse,
        closed: parking_lot::Mutex<bool>,
    }

    #[async_trait::async_trait]
    impl RpcTransport for FixedTransport {
        async fn call(
            &self,
            _url: &str,
            _request: &RpcRequest,
        ) -> std::result::Result<RpcResponse, TransportError> {
            if *self.closed.lock() {
                return Err(TransportError::Closed);
            }
            Ok(self.response.clone())
        }

        fn close(&self) {
            *self.closed.lock() = true;
        }
    }

    fn client(response: RpcResponse) -> RpcClient {
        let transport = Arc::new(FixedTransport {
            response,
            closed: parking_lot::Mutex::new(false),
        });
        RpcClient::new(
            transport,
            CameraEndpoint::new("http://cam/camera", "http://cam/avContent"),
        )
    }

    #[tokio::test]
    async fn invoke_maps_error_payload_to_protocol() {
        let rpc = client(RpcResponse::Error {
            code: 40400,
            message: "Not available now".to_string(),
        });
        let err = rpc
            .invoke(Service::Camera, RpcRequest::new("actTakePicture"))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Protocol { ref method, code: 40400, .. } if method == "actTakePicture"));

        // The raw call still succeeds at the transport level.
        let raw = rpc
            .call(Service::Camera, &RpcRequest::new("actTakePicture"))
            .await
            .unwrap();
        assert!(!raw.is_ok());
    }

    #[tokio::test]
    async fn closed_transport_surfaces_as_transport_error() {
        let rpc = client(RpcResponse::Result(json!([0])));
        assert_eq!(
            rpc.invoke(Service::AvContent, RpcRequest::new("getSourceList"))
                .await
                .unwrap(),
            json!([0])
        );

        rpc.close();
        let err = rpc
            .invoke(Service::Camera, RpcRequest::new("getEvent"))
            .await
            .unwrap_err();
        assert!(matches!(err, CameraError::Transport(TransportError::Closed)));
    }
}
