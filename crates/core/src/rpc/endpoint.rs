use crate::error::{CameraError, Result};

/// Which of the camera's two RPC services a method belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    /// Modes, settings, capture, events, live view.
    Camera,
    /// Memory card listing, thumbnails, deletion.
    AvContent,
}

/// Base URLs for one camera connection.
///
/// Derived once from the discovered action list URL by appending the
/// service name:
///
/// ```
/// use camctl::CameraEndpoint;
///
/// let ep = CameraEndpoint::from_action_list_url("http://192.168.122.1:8080/sony").unwrap();
/// assert_eq!(ep.control_url(), "http://192.168.122.1:8080/sony/camera");
/// assert_eq!(ep.content_url(), "http://192.168.122.1:8080/sony/avContent");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CameraEndpoint {
    control_url: String,
    content_url: String,
}

impl CameraEndpoint {
    pub fn from_action_list_url(action_list_url: &str) -> Result<Self> {
        let base = action_list_url.trim().trim_end_matches('/');
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(CameraError::Validation(format!(
                "action list URL must be http(s): {action_list_url:?}"
            )));
        }
        Ok(Self {
            control_url: format!("{base}/camera"),
            content_url: format!("{base}/avContent"),
        })
    }

    /// Explicit URLs, for cameras that host the services elsewhere.
    pub fn new(control_url: &str, content_url: &str) -> Self {
        Self {
            control_url: control_url.to_string(),
            content_url: content_url.to_string(),
        }
    }

    pub fn control_url(&self) -> &str {
        &self.control_url
    }

    pub fn content_url(&self) -> &str {
        &self.content_url
    }

    pub fn url(&self, service: Service) -> &str {
        match service {
            Service::Camera => &self.control_url,
            Service::AvContent => &self.content_url,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_tolerated() {
        let ep = CameraEndpoint::from_action_list_url("http://10.0.0.1:8080/sony/").unwrap();
        assert_eq!(ep.url(Service::Camera), "http://10.0.0.1:8080/sony/camera");
        assert_eq!(ep.url(Service::AvContent), "http://10.0.0.1:8080/sony/avContent");
    }

    #[test]
    fn rejects_non_http() {
        assert!(CameraEndpoint::from_action_list_url("").is_err());
        assert!(CameraEndpoint::from_action_list_url("ftp://10.0.0.1/sony").is_err());
    }
}
