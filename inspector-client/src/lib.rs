// WebKit inspector protocol client library
//
// Implements the typed surface of the inspector protocol used for
// JavaScript debugging:
// - Transport contract (request/response plus event notifications)
// - Debugger domain: breakpoints, stepping, script access
// - Runtime domain: object inspection, evaluation
// - Console domain: message events
//
// Wire framing and connection management are intentionally not part of
// this crate; any correlated request/response transport plugs in via the
// `InspectorTransport` trait.

pub mod client;
pub mod debugger;
pub mod events;
pub mod protocol;
pub mod runtime;
pub mod transport;
pub mod types;

pub use client::InspectorClient;
pub use debugger::{PauseOnExceptions, SetBreakpointResult};
pub use events::{parse_event, InspectorEvent};
pub use protocol::{InspectorError, InspectorResult};
pub use runtime::ObjectProperties;
pub use transport::{event_channel, EventReceiver, EventSender, InspectorTransport};
