//! Camera discovery over SSDP.
//!
//! One round-trip, no internal retries:
//!
//! 1. Send an `M-SEARCH` for the vendor service URN to the multicast group.
//! 2. Wait (bounded) for a single reply and read its `LOCATION` header.
//! 3. Fetch the device description and pick the `camera` service's action
//!    list URL.
//!
//! Retry policy belongs to the caller.

pub mod description;
pub mod ssdp;

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::net::UdpSocket;

use crate::error::{CameraError, Result, TransportError};
use crate::rpc::CameraEndpoint;
pub use description::{ApiService, DeviceDescription};
pub use ssdp::SsdpResponse;

/// Search target advertised by cameras exposing the remote API.
pub const SCALAR_WEB_API_URN: &str = "urn:schemas-sony-com:service:ScalarWebAPI:1";

pub const DEFAULT_DISCOVERY_TIMEOUT: Duration = Duration::from_secs(8);

#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    /// Where the `M-SEARCH` is sent. Also written into its `HOST` header.
    pub multicast_addr: SocketAddr,
    /// Local bind address for the search socket.
    pub bind_addr: SocketAddr,
    pub search_target: String,
    /// Response-wait hint sent as `MX`.
    pub mx: Duration,
    /// Bound on the reply wait and on the description fetch.
    pub timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            multicast_addr: SocketAddr::from(([239, 255, 255, 250], 1900)),
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 0)),
            search_target: SCALAR_WEB_API_URN.to_string(),
            mx: Duration::from_secs(1),
            timeout: DEFAULT_DISCOVERY_TIMEOUT,
        }
    }
}

/// Everything learned from a successful discovery.
#[derive(Debug, Clone)]
pub struct DiscoveredCamera {
    /// Description document URL from the SSDP reply.
    pub location: String,
    /// Address the SSDP reply came from.
    pub responder: SocketAddr,
    pub description: DeviceDescription,
    /// Action list URL of the `camera` service.
    pub action_list_url: String,
}

impl DiscoveredCamera {
    pub fn endpoint(&self) -> Result<CameraEndpoint> {
        CameraEndpoint::from_action_list_url(&self.action_list_url)
    }
}

/// Discover the camera's action list URL with default settings.
pub async fn discover(timeout: Duration) -> Result<String> {
    let config = DiscoveryConfig {
        timeout,
        ..DiscoveryConfig::default()
    };
    Ok(discover_with(&config).await?.action_list_url)
}

pub async fn discover_with(config: &DiscoveryConfig) -> Result<DiscoveredCamera> {
    let socket = UdpSocket::bind(config.bind_addr).await?;
    if let IpAddr::V4(ip) = config.multicast_addr.ip()
        && ip.is_multicast()
    {
        socket.set_multicast_ttl_v4(4)?;
    }

    let request = ssdp::search_request(config.multicast_addr, config.mx, &config.search_target);
    socket
        .send_to(request.as_bytes(), config.multicast_addr)
        .await?;
    tracing::debug!(target_addr = %config.multicast_addr, st = %config.search_target, "M-SEARCH sent");

    let mut buf = vec![0u8; 2048];
    let (len, responder) = tokio::time::timeout(config.timeout, socket.recv_from(&mut buf))
        .await
        .map_err(|_| CameraError::Timeout {
            awaited: "SSDP search reply".to_string(),
            after: config.timeout,
        })??;

    let reply = SsdpResponse::parse(&String::from_utf8_lossy(&buf[..len]))?;
    let location = reply.location()?.to_string();
    tracing::info!(%responder, location, "camera answered SSDP search");

    let description = fetch_description(&location, config.timeout).await?;
    let action_list_url = description.camera_action_list_url()?.to_string();

    tracing::info!(
        model = description.model_name.as_deref().unwrap_or("unknown"),
        name = description.friendly_name.as_deref().unwrap_or("unknown"),
        action_list_url,
        "camera discovered"
    );

    Ok(DiscoveredCamera {
        location,
        responder,
        description,
        action_list_url,
    })
}

async fn fetch_description(location: &str, timeout: Duration) -> Result<DeviceDescription> {
    let client = reqwest::Client::builder()
        .timeout(timeout)
        .build()
        .unwrap_or_default();

    let response = client
        .get(location)
        .send()
        .await
        .map_err(TransportError::from)?;
    let status = response.status();
    if !status.is_success() {
        return Err(TransportError::Status(status.as_u16()).into());
    }
    let body = response.text().await.map_err(TransportError::from)?;

    DeviceDescription::parse(&body)
}
