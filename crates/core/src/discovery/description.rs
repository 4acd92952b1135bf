//! Device description document parsing.
//!
//! The SSDP `LOCATION` points at a UPnP description whose vendor block
//! lists the JSON-RPC services:
//!
//! ```text
//! <av:X_ScalarWebAPI_ServiceList>
//!   <av:X_ScalarWebAPI_Service>
//!     <av:X_ScalarWebAPI_ServiceType>camera</av:X_ScalarWebAPI_ServiceType>
//!     <av:X_ScalarWebAPI_ActionList_URL>http://192.168.122.1:8080/sony</av:X_ScalarWebAPI_ActionList_URL>
//!   </av:X_ScalarWebAPI_Service>
//! </av:X_ScalarWebAPI_ServiceList>
//! ```
//!
//! Matching is on local element names so any namespace prefix works.

use crate::error::{DiscoveryErrorKind, Result};

const SERVICE_TAG: &str = "X_ScalarWebAPI_Service";
const SERVICE_TYPE_TAG: &str = "X_ScalarWebAPI_ServiceType";
const ACTION_LIST_TAG: &str = "X_ScalarWebAPI_ActionList_URL";

/// The service type whose action list hosts the control methods.
pub const CAMERA_SERVICE_TYPE: &str = "camera";

/// One `X_ScalarWebAPI_Service` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiService {
    pub service_type: String,
    pub action_list_url: String,
}

#[derive(Debug, Clone, Default)]
pub struct DeviceDescription {
    pub friendly_name: Option<String>,
    pub model_name: Option<String>,
    pub services: Vec<ApiService>,
}

impl DeviceDescription {
    pub fn parse(xml: &str) -> Result<Self> {
        if xml.trim().is_empty() {
            return Err(DiscoveryErrorKind::EmptyDescription.into());
        }

        let services = elements(xml, SERVICE_TAG)
            .into_iter()
            .filter_map(|block| {
                let service_type = first_text(block, SERVICE_TYPE_TAG)?;
                let action_list_url = first_text(block, ACTION_LIST_TAG)?;
                Some(ApiService {
                    service_type,
                    action_list_url,
                })
            })
            .collect();

        Ok(DeviceDescription {
            friendly_name: first_text(xml, "friendlyName"),
            model_name: first_text(xml, "modelName"),
            services,
        })
    }

    /// Action list URL of the `camera` service.
    pub fn camera_action_list_url(&self) -> Result<&str> {
        self.services
            .iter()
            .find(|s| s.service_type == CAMERA_SERVICE_TYPE)
            .map(|s| s.action_list_url.as_str())
            .filter(|url| !url.is_empty())
            .ok_or_else(|| DiscoveryErrorKind::NoCameraService.into())
    }
}

fn local_name(name: &str) -> &str {
    name.rsplit(':').next().unwrap_or(name)
}

/// Inner text of every element named `local` (any prefix), in document order.
fn elements<'a>(xml: &'a str, local: &str) -> Vec<&'a str> {
    let mut found = Vec::new();
    let mut pos = 0;

    while let Some(rel) = xml[pos..].find('<') {
        let start = pos + rel;
        let Some(rel_end) = xml[start..].find('>') else {
            break;
        };
        let tag_end = start + rel_end;
        let tag = &xml[start + 1..tag_end];
        pos = tag_end + 1;

        if tag.starts_with(['/', '?', '!']) || tag.ends_with('/') {
            continue;
        }
        let name = tag.split_whitespace().next().unwrap_or_default();
        if local_name(name) != local {
            continue;
        }

        let mut search = pos;
        while let Some(rel_close) = xml[search..].find("</") {
            let close_start = search + rel_close;
            let Some(rel_gt) = xml[close_start..].find('>') else {
                return found;
            };
            let close_name = xml[close_start + 2..close_start + rel_gt].trim();
            if local_name(close_name) == local {
                found.push(&xml[pos..close_start]);
                pos = close_start + rel_gt + 1;
                break;
            }
            search = close_start + rel_gt + 1;
        }
    }

    found
}

fn first_text(xml: &str, local: &str) -> Option<String> {
    elements(xml, local)
        .into_iter()
        .map(|text| unescape(text.trim()))
        .find(|text| !text.is_empty())
}

fn unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CameraError;

    const DESCRIPTION: &str = r#"<?xml version="1.0"?>
<root xmlns="urn:schemas-upnp-org:device-1-0">
  <device>
    <deviceType>urn:schemas-upnp-org:device:Basic:1</deviceType>
    <friendlyName>ILCE-6000</friendlyName>
    <modelName>SonyImagingDevice</modelName>
    <av:X_ScalarWebAPI_DeviceInfo xmlns:av="urn:schemas-sony-com:av">
      <av:X_ScalarWebAPI_Version>1.0</av:X_ScalarWebAPI_Version>
      <av:X_ScalarWebAPI_ServiceList>
        <av:X_ScalarWebAPI_Service>
          <av:X_ScalarWebAPI_ServiceType>guide</av:X_ScalarWebAPI_ServiceType>
          <av:X_ScalarWebAPI_ActionList_URL>http://192.168.122.1:8080/sony</av:X_ScalarWebAPI_ActionList_URL>
          <av:X_ScalarWebAPI_AccessType />
        </av:X_ScalarWebAPI_Service>
        <av:X_ScalarWebAPI_Service>
          <av:X_ScalarWebAPI_ServiceType>camera</av:X_ScalarWebAPI_ServiceType>
          <av:X_ScalarWebAPI_ActionList_URL>http://192.168.122.1:8080/sony</av:X_ScalarWebAPI_ActionList_URL>
          <av:X_ScalarWebAPI_AccessType />
        </av:X_ScalarWebAPI_Service>
        <av:X_ScalarWebAPI_Service>
          <av:X_ScalarWebAPI_ServiceType>avContent</av:X_ScalarWebAPI_ServiceType>
          <av:X_ScalarWebAPI_ActionList_URL>http://192.168.122.1:8080/sony</av:X_ScalarWebAPI_ActionList_URL>
        </av:X_ScalarWebAPI_Service>
      </av:X_ScalarWebAPI_ServiceList>
    </av:X_ScalarWebAPI_DeviceInfo>
  </device>
</root>"#;

    #[test]
    fn parse_services() {
        let desc = DeviceDescription::parse(DESCRIPTION).unwrap();
        assert_eq!(desc.friendly_name.as_deref(), Some("ILCE-6000"));
        assert_eq!(desc.model_name.as_deref(), Some("SonyImagingDevice"));
        let types: Vec<_> = desc.services.iter().map(|s| s.service_type.as_str()).collect();
        assert_eq!(types, vec!["guide", "camera", "avContent"]);
        assert_eq!(
            desc.camera_action_list_url().unwrap(),
            "http://192.168.122.1:8080/sony"
        );
    }

    #[test]
    fn service_list_is_not_a_service() {
        // ServiceList shares a prefix with Service; only exact local names match.
        let xml = "<X_ScalarWebAPI_ServiceList></X_ScalarWebAPI_ServiceList>";
        let desc = DeviceDescription::parse(xml).unwrap();
        assert!(desc.services.is_empty());
    }

    #[test]
    fn unprefixed_elements() {
        let xml = "<X_ScalarWebAPI_Service><X_ScalarWebAPI_ServiceType>camera</X_ScalarWebAPI_ServiceType>\
                   <X_ScalarWebAPI_ActionList_URL>http://10.0.0.1/sony?a=1&amp;b=2</X_ScalarWebAPI_ActionList_URL>\
                   </X_ScalarWebAPI_Service>";
        let desc = DeviceDescription::parse(xml).unwrap();
        assert_eq!(
            desc.camera_action_list_url().unwrap(),
            "http://10.0.0.1/sony?a=1&b=2"
        );
    }

    #[test]
    fn no_camera_service() {
        let xml = DESCRIPTION.replace(">camera<", ">system<");
        let desc = DeviceDescription::parse(&xml).unwrap();
        assert!(matches!(
            desc.camera_action_list_url(),
            Err(CameraError::Discovery {
                kind: DiscoveryErrorKind::NoCameraService
            })
        ));
    }

    #[test]
    fn empty_body() {
        assert!(matches!(
            DeviceDescription::parse("  \n"),
            Err(CameraError::Discovery {
                kind: DiscoveryErrorKind::EmptyDescription
            })
        ));
    }
}
