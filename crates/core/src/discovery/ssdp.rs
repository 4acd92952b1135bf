use std::net::SocketAddr;
use std::time::Duration;

use crate::error::{DiscoveryErrorKind, Result};

/// Build an SSDP `M-SEARCH` datagram (UPnP Device Architecture §1.3.2).
///
/// ```text
/// M-SEARCH * HTTP/1.1
/// HOST: 239.255.255.250:1900
/// MAN: "ssdp:discover"
/// MX: 1
/// ST: urn:schemas-sony-com:service:ScalarWebAPI:1
/// ```
///
/// `MX` is the responder's maximum random delay before answering; it is
/// rounded up to whole seconds and never below 1.
pub fn search_request(host: SocketAddr, mx: Duration, search_target: &str) -> String {
    let mx_secs = (mx.as_secs() + u64::from(mx.subsec_nanos() > 0)).max(1);
    format!(
        "M-SEARCH * HTTP/1.1\r\n\
         HOST: {host}\r\n\
         MAN: \"ssdp:discover\"\r\n\
         MX: {mx_secs}\r\n\
         ST: {search_target}\r\n\r\n"
    )
}

/// A parsed SSDP search reply.
///
/// Replies use HTTP/1.1 response syntax over UDP:
///
/// ```text
/// HTTP/1.1 200 OK
/// CACHE-CONTROL: max-age=1800
/// LOCATION: http://192.168.122.1:64321/DmsRmtDesc.xml
/// ST: urn:schemas-sony-com:service:ScalarWebAPI:1
/// ```
///
/// Header lookup is case-insensitive; cameras disagree on `LOCATION` vs
/// `Location`.
#[derive(Debug)]
pub struct SsdpResponse {
    pub status_line: String,
    /// Headers as ordered (name, value) pairs, names as received.
    pub headers: Vec<(String, String)>,
}

impl SsdpResponse {
    pub fn parse(raw: &str) -> Result<Self> {
        let mut lines = raw.lines();

        let status_line = lines
            .next()
            .map(str::trim)
            .filter(|l| l.starts_with("HTTP/"))
            .ok_or(DiscoveryErrorKind::MalformedResponse)?
            .to_string();

        let mut headers = Vec::new();
        for line in lines {
            if line.trim().is_empty() {
                break;
            }
            // Some responders emit stray lines; skip them instead of
            // rejecting the whole reply.
            let Some(colon_pos) = line.find(':') else {
                tracing::trace!(line, "ignoring SSDP line without colon");
                continue;
            };
            let name = line[..colon_pos].trim().to_string();
            let value = line[colon_pos + 1..].trim().to_string();
            headers.push((name, value));
        }

        Ok(SsdpResponse {
            status_line,
            headers,
        })
    }

    pub fn get_header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// The device description URL. Required.
    pub fn location(&self) -> Result<&str> {
        self.get_header("LOCATION")
            .filter(|v| !v.is_empty())
            .ok_or_else(|| DiscoveryErrorKind::MissingLocation.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CameraError;

    const REPLY: &str = "HTTP/1.1 200 OK\r\n\
                         CACHE-CONTROL: max-age=1800\r\n\
                         EXT:\r\n\
                         LOCATION: http://192.168.122.1:64321/DmsRmtDesc.xml\r\n\
                         SERVER: UPnP/1.0 SonyImagingDevice/1.0\r\n\
                         ST: urn:schemas-sony-com:service:ScalarWebAPI:1\r\n\r\n";

    #[test]
    fn search_request_lines() {
        let req = search_request(
            "239.255.255.250:1900".parse().unwrap(),
            Duration::from_secs(1),
            "urn:schemas-sony-com:service:ScalarWebAPI:1",
        );
        assert!(req.starts_with("M-SEARCH * HTTP/1.1\r\n"));
        assert!(req.contains("HOST: 239.255.255.250:1900\r\n"));
        assert!(req.contains("MAN: \"ssdp:discover\"\r\n"));
        assert!(req.contains("MX: 1\r\n"));
        assert!(req.ends_with("ST: urn:schemas-sony-com:service:ScalarWebAPI:1\r\n\r\n"));
    }

    #[test]
    fn mx_rounds_up() {
        let req = search_request(
            "239.255.255.250:1900".parse().unwrap(),
            Duration::from_millis(1500),
            "ssdp:all",
        );
        assert!(req.contains("MX: 2\r\n"));
    }

    #[test]
    fn parse_location() {
        let resp = SsdpResponse::parse(REPLY).unwrap();
        assert_eq!(resp.status_line, "HTTP/1.1 200 OK");
        assert_eq!(
            resp.location().unwrap(),
            "http://192.168.122.1:64321/DmsRmtDesc.xml"
        );
        assert_eq!(resp.get_header("ext"), Some(""));
    }

    #[test]
    fn location_lookup_case_insensitive() {
        let resp = SsdpResponse::parse("HTTP/1.1 200 OK\r\nLocation: http://a/b.xml\r\n\r\n").unwrap();
        assert_eq!(resp.location().unwrap(), "http://a/b.xml");
    }

    #[test]
    fn missing_location() {
        let resp = SsdpResponse::parse("HTTP/1.1 200 OK\r\nST: x\r\n\r\n").unwrap();
        assert!(matches!(
            resp.location(),
            Err(CameraError::Discovery {
                kind: DiscoveryErrorKind::MissingLocation
            })
        ));
    }

    #[test]
    fn not_an_http_reply() {
        assert!(SsdpResponse::parse("NOTIFY * HTTP/1.1\r\n\r\n").is_err());
        assert!(SsdpResponse::parse("").is_err());
    }
}
