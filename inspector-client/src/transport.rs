// Inspector transport contract
//
// The wire layer (WebSocket framing, reconnects, request/response
// correlation) lives outside this crate. Implementations only have to
// expose "send one request, await the correlated response" plus a stream
// of `InspectorEvent` notifications; everything typed is layered on top.

use crate::events::InspectorEvent;
use crate::protocol::InspectorResult;
use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

/// Channel half a transport pushes decoded events into.
pub type EventSender = mpsc::UnboundedSender<InspectorEvent>;

/// Channel half the session consumes events from.
pub type EventReceiver = mpsc::UnboundedReceiver<InspectorEvent>;

/// Create the event channel shared between a transport and its consumer.
pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// One correlated request/response connection to an inspector endpoint.
///
/// Lifecycle notifications (`Connected`, `Disconnected`) and protocol
/// events travel through the `EventSender` handed to the implementation
/// at construction time.
#[async_trait]
pub trait InspectorTransport: Send + Sync {
    /// Establish the connection to a `ws://` / `wss://` endpoint.
    async fn connect(&self, url: &str) -> InspectorResult<()>;

    /// Send one request and await its correlated response payload.
    async fn request(&self, method: &str, params: Value) -> InspectorResult<Value>;

    /// Tear the connection down. Must be idempotent.
    async fn close(&self);
}
