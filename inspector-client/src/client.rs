// Inspector client wrapper
//
// Wraps a transport with the calling conventions every domain shares:
// typed parameter encoding and per-call ignorable-error handling.

use crate::protocol::{InspectorError, InspectorResult};
use crate::transport::InspectorTransport;
use serde_json::Value;
use std::sync::Arc;
use tracing::debug;

/// Typed facade over an `InspectorTransport`.
///
/// Cloning is cheap; clones share the underlying connection.
#[derive(Clone)]
pub struct InspectorClient {
    transport: Arc<dyn InspectorTransport>,
}

impl InspectorClient {
    pub fn new(transport: Arc<dyn InspectorTransport>) -> Self {
        Self { transport }
    }

    pub async fn connect(&self, url: &str) -> InspectorResult<()> {
        self.transport.connect(url).await
    }

    pub async fn close(&self) {
        self.transport.close().await;
    }

    /// Send one request and await its result payload.
    pub async fn request(&self, method: &str, params: Value) -> InspectorResult<Value> {
        debug!("Inspector request: {}", method);
        self.transport.request(method, params).await
    }

    /// Send a request whose failure is expected and harmless when the
    /// error message contains one of `ignorable`; such failures are
    /// reported as a null success.
    pub async fn request_ignoring(
        &self,
        method: &str,
        params: Value,
        ignorable: &[&str],
    ) -> InspectorResult<Value> {
        match self.request(method, params).await {
            Ok(result) => Ok(result),
            Err(e) if e.matches_any(ignorable) => {
                debug!("Ignoring expected {} failure: {}", method, e);
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    /// Decode a result payload into a typed value.
    pub(crate) fn decode<T: serde::de::DeserializeOwned>(
        method: &str,
        result: Value,
    ) -> InspectorResult<T> {
        serde_json::from_value(result).map_err(|e| {
            InspectorError::Protocol(format!("Malformed {} result: {}", method, e))
        })
    }
}

impl std::fmt::Debug for InspectorClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InspectorClient").finish_non_exhaustive()
    }
}
