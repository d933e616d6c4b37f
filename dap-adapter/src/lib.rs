// Debug Adapter Protocol bridge for WebKit-inspector runtimes
//
// Sits between a DAP client (an editor) and a JavaScript runtime that
// speaks the WebKit inspector protocol:
// - adapter: the session orchestrator, one instance per debug session
// - protocol: DAP envelope and body types
// - registry: loaded-source and breakpoint bookkeeping
// - variables: lazily-expandable variable references
// - sourcemap: authored <-> executed position translation
// - launch: debuggee spawning and inspector endpoint discovery
//
// Both outer transports are collaborator concerns: DAP framing on one
// side and the inspector WebSocket on the other plug in through
// `EventSink` and `inspector_client::InspectorTransport`.

pub mod adapter;
pub mod eval;
pub mod launch;
pub mod protocol;
pub mod registry;
pub mod sourcemap;
pub mod variables;

pub use adapter::{DebugAdapter, EventSink, THREAD_ID};
