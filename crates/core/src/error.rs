//! Error types for the camera client library.

use std::fmt;
use std::time::Duration;

/// Errors that can occur while talking to a camera.
///
/// Variants map to specific failure modes across the stack:
///
/// - **Transport**: [`Transport`](Self::Transport): network, HTTP status or
///   JSON decode failures. Always recoverable; retry by re-invoking.
/// - **Protocol**: [`Protocol`](Self::Protocol): the camera answered with an
///   `error` payload. The operation failed, the session is still usable.
/// - **Timing**: [`Timeout`](Self::Timeout): idle-wait or discovery deadline.
/// - **Local guards**: [`Validation`](Self::Validation): rejected before any
///   request was sent.
/// - **Discovery**: [`Discovery`](Self::Discovery).
/// - **Live view**: [`StreamDecode`](Self::StreamDecode): a single corrupt
///   frame. The reader logs and drops these; they never end a stream.
#[derive(Debug, thiserror::Error)]
pub enum CameraError {
    /// The request never produced a usable response.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// The camera returned `{"error": [code, message]}` for `method`.
    #[error("{method} failed with camera error {code}: {message}")]
    Protocol {
        method: String,
        code: i64,
        message: String,
    },

    /// A bounded wait elapsed. `awaited` names what was being waited for.
    #[error("timed out after {after:?} waiting for {awaited}")]
    Timeout { awaited: String, after: Duration },

    /// A local guard rejected the request; nothing reached the network.
    #[error("validation error: {0}")]
    Validation(String),

    /// SSDP search or device description lookup failed.
    #[error("discovery failed: {kind}")]
    Discovery { kind: DiscoveryErrorKind },

    /// The response was well-formed JSON but not the shape `method` returns.
    #[error("unexpected response to {method}: {detail}")]
    UnexpectedResponse { method: String, detail: String },

    /// A live-view frame could not be decoded as JPEG.
    #[error("frame decode failed: {0}")]
    StreamDecode(String),

    /// Socket error outside an RPC call, e.g. while binding for discovery.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CameraError {
    pub(crate) fn unexpected(method: &str, detail: impl Into<String>) -> Self {
        Self::UnexpectedResponse {
            method: method.to_string(),
            detail: detail.into(),
        }
    }

    /// Camera error code, when this is a [`Protocol`](Self::Protocol) error.
    pub fn protocol_code(&self) -> Option<i64> {
        match self {
            Self::Protocol { code, .. } => Some(*code),
            _ => None,
        }
    }
}

/// Failures of a single RPC round-trip.
///
/// A body that parses as JSON is never a transport error, even when it
/// carries an `error` field.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("malformed JSON response: {0}")]
    Json(#[from] serde_json::Error),

    /// The transport was closed by [`disconnect`](crate::CameraSession::disconnect).
    #[error("transport closed")]
    Closed,
}

/// Specific kind of discovery failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryErrorKind {
    /// The SSDP reply carried no `LOCATION` header.
    MissingLocation,
    /// The reply was not an HTTP-style header block.
    MalformedResponse,
    /// The device description document was empty.
    EmptyDescription,
    /// No service entry of type `camera` was listed.
    NoCameraService,
}

impl fmt::Display for DiscoveryErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingLocation => write!(f, "no LOCATION header in SSDP reply"),
            Self::MalformedResponse => write!(f, "malformed SSDP reply"),
            Self::EmptyDescription => write!(f, "empty device description"),
            Self::NoCameraService => write!(f, "no camera service in device description"),
        }
    }
}

impl From<DiscoveryErrorKind> for CameraError {
    fn from(kind: DiscoveryErrorKind) -> Self {
        CameraError::Discovery { kind }
    }
}

/// Convenience alias for `Result<T, CameraError>`.
pub type Result<T> = std::result::Result<T, CameraError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_failure() {
        let err: CameraError = DiscoveryErrorKind::NoCameraService.into();
        assert_eq!(
            err.to_string(),
            "discovery failed: no camera service in device description"
        );

        let err: CameraError = TransportError::Status(503).into();
        assert_eq!(err.to_string(), "transport error: HTTP status 503");

        let err = CameraError::StreamDecode("truncated".to_string());
        assert_eq!(err.to_string(), "frame decode failed: truncated");
        assert_eq!(err.protocol_code(), None);
    }
}
