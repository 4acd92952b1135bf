use serde::Serialize;
use serde_json::Value;

/// Protocol version sent when a method does not ask for another one.
pub const DEFAULT_VERSION: &str = "1.0";

/// A JSON-RPC method call.
///
/// Serializes to the camera's request envelope:
///
/// ```text
/// {"method": "setShootMode", "params": ["still"], "id": 1, "version": "1.0"}
/// ```
///
/// The id is fixed at 1; the camera answers one request per HTTP exchange
/// so there is nothing to correlate. Chain
/// [`param`](Self::param) and [`version`](Self::version).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[must_use]
pub struct RpcRequest {
    pub method: String,
    pub params: Vec<Value>,
    pub id: u32,
    pub version: String,
}

impl RpcRequest {
    pub fn new(method: &str) -> Self {
        RpcRequest {
            method: method.to_string(),
            params: Vec::new(),
            id: 1,
            version: DEFAULT_VERSION.to_string(),
        }
    }

    /// Append a positional parameter. Object parameters are plain
    /// string-keyed maps (`serde_json::json!({"uri": ...})`).
    pub fn param(mut self, value: impl Into<Value>) -> Self {
        self.params.push(value.into());
        self
    }

    pub fn version(mut self, version: &str) -> Self {
        self.version = version.to_string();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_envelope() {
        let req = RpcRequest::new("setShootMode").param("still");
        let body = serde_json::to_value(&req).unwrap();
        assert_eq!(
            body,
            json!({"method": "setShootMode", "params": ["still"], "id": 1, "version": "1.0"})
        );
    }

    #[test]
    fn empty_params_serialize_as_array() {
        let body = serde_json::to_string(&RpcRequest::new("startRecMode")).unwrap();
        assert!(body.contains("\"params\":[]"));
    }

    #[test]
    fn mixed_params_keep_order() {
        let req = RpcRequest::new("getContentList")
            .param(json!({"uri": "storage:memoryCard1", "stIdx": 0}))
            .param(12)
            .version("1.3");
        assert_eq!(req.params[0]["uri"], "storage:memoryCard1");
        assert_eq!(req.params[1], 12);
        assert_eq!(req.version, "1.3");
    }
}
