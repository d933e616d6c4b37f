// Inspector protocol definitions
//
// The WebKit inspector protocol is JSON-RPC shaped: requests carry an id,
// a dotted method name and a params object; responses echo the id with
// either a result object or an error. Events are id-less notifications.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

pub type InspectorResult<T> = Result<T, InspectorError>;

#[derive(Debug, Error)]
pub enum InspectorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Inspector error: {0}")]
    Remote(String),

    #[error("Not connected to an inspector endpoint")]
    NotConnected,

    #[error("Connection closed")]
    ConnectionClosed,
}

impl InspectorError {
    /// Whether the error message contains any of the given substrings.
    ///
    /// Some inspector calls are expected to fail harmlessly (e.g. removing
    /// a breakpoint the backend already dropped); callers pass the
    /// substrings they are willing to treat as success.
    pub fn matches_any(&self, substrings: &[&str]) -> bool {
        let message = self.to_string();
        substrings.iter().any(|s| message.contains(s))
    }
}

/// Outgoing request envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorRequest {
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Value::is_null", default)]
    pub params: Value,
}

/// Incoming response envelope, correlated by id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InspectorResponse {
    pub id: u64,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseError {
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<i64>,
}

impl InspectorResponse {
    /// Collapse the result/error alternative into an `InspectorResult`.
    pub fn into_result(self) -> InspectorResult<Value> {
        if let Some(error) = self.error {
            return Err(InspectorError::Remote(error.message));
        }
        Ok(self.result.unwrap_or(Value::Null))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = InspectorRequest {
            id: 7,
            method: "Debugger.enable".to_string(),
            params: Value::Null,
        };

        let encoded = serde_json::to_value(&request).unwrap();
        assert_eq!(encoded, json!({"id": 7, "method": "Debugger.enable"}));
    }

    #[test]
    fn test_response_result() {
        let response: InspectorResponse =
            serde_json::from_value(json!({"id": 3, "result": {"breakpointId": "bp:1"}})).unwrap();

        let result = response.into_result().unwrap();
        assert_eq!(result["breakpointId"], "bp:1");
    }

    #[test]
    fn test_response_error() {
        let response: InspectorResponse = serde_json::from_value(
            json!({"id": 3, "error": {"message": "Breakpoint at specified location already exists"}}),
        )
        .unwrap();

        let err = response.into_result().unwrap_err();
        assert!(err.matches_any(&["already exists"]));
        assert!(!err.matches_any(&["not found"]));
    }
}
