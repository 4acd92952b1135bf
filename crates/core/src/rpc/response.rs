use serde_json::Value;

use crate::error::{CameraError, TransportError};

/// A parsed JSON-RPC response: a result payload or an error payload,
/// never both.
///
/// ```text
/// {"result": [0]}
/// {"error": [40403, "Long shooting"]}
/// ```
///
/// Bodies carrying both fields are treated as errors. Bodies carrying
/// neither become an error with code `-1`, so "has a result" is always the
/// success test.
#[derive(Debug, Clone, PartialEq)]
pub enum RpcResponse {
    Result(Value),
    Error { code: i64, message: String },
}

impl RpcResponse {
    /// Parse a raw HTTP body. Only malformed JSON is an error here.
    pub fn parse(body: &[u8]) -> Result<Self, TransportError> {
        let value: Value = serde_json::from_slice(body)?;
        Ok(Self::from_value(value))
    }

    pub fn from_value(mut value: Value) -> Self {
        if let Some(error) = value.get_mut("error").map(Value::take) {
            let (code, message) = match &error {
                Value::Array(parts) => (
                    parts.first().and_then(Value::as_i64).unwrap_or(-1),
                    parts
                        .get(1)
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_string(),
                ),
                other => (-1, other.to_string()),
            };
            return RpcResponse::Error { code, message };
        }

        match value.get_mut("result").map(Value::take) {
            Some(result) => RpcResponse::Result(result),
            None => RpcResponse::Error {
                code: -1,
                message: "response carried neither result nor error".to_string(),
            },
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, RpcResponse::Result(_))
    }

    /// Convert into the result payload, mapping an error payload to
    /// [`CameraError::Protocol`].
    pub fn into_result(self, method: &str) -> crate::Result<Value> {
        match self {
            RpcResponse::Result(value) => Ok(value),
            RpcResponse::Error { code, message } => Err(CameraError::Protocol {
                method: method.to_string(),
                code,
                message,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_result() {
        let resp = RpcResponse::parse(br#"{"result":[0],"id":1}"#).unwrap();
        assert_eq!(resp, RpcResponse::Result(json!([0])));
        assert!(resp.is_ok());
    }

    #[test]
    fn parse_error_pair() {
        let resp = RpcResponse::parse(br#"{"error":[40403,"Long shooting"],"id":1}"#).unwrap();
        assert_eq!(
            resp,
            RpcResponse::Error {
                code: 40403,
                message: "Long shooting".to_string()
            }
        );
        let err = resp.into_result("actTakePicture").unwrap_err();
        assert_eq!(err.protocol_code(), Some(40403));
    }

    #[test]
    fn error_wins_over_result() {
        let resp = RpcResponse::from_value(json!({"result": [0], "error": [1, "Any"]}));
        assert!(!resp.is_ok());
    }

    #[test]
    fn neither_field_is_not_success() {
        let resp = RpcResponse::from_value(json!({"id": 1}));
        assert!(!resp.is_ok());
    }

    #[test]
    fn malformed_json_is_transport_error() {
        assert!(matches!(
            RpcResponse::parse(b"<html>"),
            Err(TransportError::Json(_))
        ));
    }
}
