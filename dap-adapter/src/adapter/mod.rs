// Debug session orchestrator
//
// Receives decoded DAP requests, dispatches them to per-command handlers,
// talks to the inspector, and re-emits inspector events as DAP events.
// Owns all the session state neither protocol keeps by itself.

mod events;
mod requests;

use crate::launch::LaunchedProcess;
use crate::protocol::{Event, Request, Response};
use crate::registry::{BreakpointRegistry, SourceRegistry};
use crate::variables::VariableStore;
use anyhow::{anyhow, Result};
use inspector_client::transport::{EventReceiver, InspectorTransport};
use inspector_client::InspectorClient;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// The single thread this adapter reports; the target runtime executes
/// JavaScript on one thread.
pub const THREAD_ID: i64 = 1;

/// Outbound half of the control protocol: the collaborator-supplied
/// function that carries encoded events to the client.
pub trait EventSink: Send + Sync {
    fn send_event(&self, event: Event);
}

impl EventSink for tokio::sync::mpsc::UnboundedSender<Event> {
    fn send_event(&self, event: Event) {
        // A dropped receiver means the client is gone; nothing to do.
        self.send(event).ok();
    }
}

/// Session lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Uninitialized,
    Initializing,
    Running,
    Paused(PauseReason),
    Terminated,
}

/// Closed set of pause reasons surfaced to the client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum PauseReason {
    Breakpoint,
    FunctionBreakpoint,
    Step,
    Pause,
    Exception,
}

impl PauseReason {
    pub(crate) fn as_dap(self) -> &'static str {
        match self {
            PauseReason::Breakpoint => "breakpoint",
            PauseReason::FunctionBreakpoint => "function breakpoint",
            PauseReason::Step => "step",
            PauseReason::Pause => "pause",
            PauseReason::Exception => "exception",
        }
    }
}

/// One frame of the pause snapshot. Rebuilt in full on every pause.
#[derive(Debug, Clone)]
pub(crate) struct FrameSnapshot {
    pub id: i64,
    /// Inspector handle; absent for synthetic async-causality frames.
    pub call_frame_id: Option<String>,
    pub name: String,
    pub source: Option<crate::registry::Source>,
    /// Authored coordinates, 1-based for the DAP boundary.
    pub line: i64,
    pub column: i64,
    pub scopes: Vec<crate::protocol::Scope>,
    pub synthetic: bool,
}

/// Mutable session state. Every collection here is owned exclusively by
/// the orchestrator; critical sections stay short and never span an
/// inspector round-trip.
pub(crate) struct SessionState {
    pub phase: Phase,
    pub terminated: bool,
    /// Client announced it will send `configurationDone`.
    pub expects_configuration_done: bool,
    pub sources: SourceRegistry,
    pub breakpoints: BreakpointRegistry,
    pub variables: VariableStore,
    pub frames: Vec<FrameSnapshot>,
    pub process: Option<LaunchedProcess>,
    /// A step command is in flight; the next pause is attributed to it.
    pub step_in_flight: bool,
}

impl SessionState {
    fn new() -> Self {
        Self {
            phase: Phase::Uninitialized,
            terminated: false,
            expects_configuration_done: false,
            sources: SourceRegistry::new(),
            breakpoints: BreakpointRegistry::new(),
            variables: VariableStore::new(),
            frames: Vec::new(),
            process: None,
            step_in_flight: false,
        }
    }

    /// Atomic reset: all registries cleared, variable store truncated to
    /// its sentinel, breakpoint ids restart.
    fn reset(&mut self) -> Option<LaunchedProcess> {
        self.phase = Phase::Terminated;
        self.sources.clear();
        self.breakpoints.clear();
        self.variables.reset();
        self.frames.clear();
        self.step_in_flight = false;
        self.process.take()
    }
}

/// The adapter proper: one instance per debug session.
pub struct DebugAdapter {
    pub(crate) inspector: InspectorClient,
    pub(crate) sink: Arc<dyn EventSink>,
    /// Capability-negotiation payload, supplied by the embedder.
    pub(crate) capabilities: Value,
    pub(crate) state: Mutex<SessionState>,
}

impl DebugAdapter {
    pub fn new(
        transport: Arc<dyn InspectorTransport>,
        sink: Arc<dyn EventSink>,
        capabilities: Value,
    ) -> Self {
        Self {
            inspector: InspectorClient::new(transport),
            sink,
            capabilities,
            state: Mutex::new(SessionState::new()),
        }
    }

    /// Drive inspector events into the session until the channel closes.
    pub async fn pump_events(&self, mut events: EventReceiver) {
        while let Some(event) = events.recv().await {
            self.handle_inspector_event(event).await;
        }
        debug!("Inspector event channel closed");
    }

    /// Dispatch one DAP request to its handler.
    ///
    /// Handler errors never escape: they become a failed response here,
    /// leaving the session alive.
    pub async fn handle_request(&self, request: Request) -> Response {
        debug!("Handling {} request", request.command);

        match self.dispatch(&request).await {
            Ok(body) => Response::success(&request, body),
            Err(e) => {
                warn!("{} request failed: {:#}", request.command, e);
                Response::failure(&request, format!("{:#}", e))
            }
        }
    }

    async fn dispatch(&self, request: &Request) -> Result<Option<Value>> {
        match request.command.as_str() {
            "initialize" => self.initialize(args(request)?).await,
            "launch" => self.launch(args(request)?).await,
            "attach" => self.attach(args(request)?).await,
            "configurationDone" => self.configuration_done().await,
            "setBreakpoints" => self.set_breakpoints(args(request)?).await,
            "setFunctionBreakpoints" => self.set_function_breakpoints(args(request)?).await,
            "setExceptionBreakpoints" => self.set_exception_breakpoints(args(request)?).await,
            "pause" => self.pause().await,
            "continue" => self.resume().await,
            "next" => self.step_over().await,
            "stepIn" => self.step_in().await,
            "stepOut" => self.step_out().await,
            "stackTrace" => self.stack_trace(args(request)?).await,
            "scopes" => self.scopes(args(request)?).await,
            "variables" => self.variables(args(request)?).await,
            "evaluate" => self.evaluate(args(request)?).await,
            "threads" => self.threads().await,
            "loadedSources" => self.loaded_sources().await,
            "source" => self.source(args(request)?).await,
            "breakpointLocations" => self.breakpoint_locations(args(request)?).await,
            "terminate" | "disconnect" => self.close().await,
            unknown => Err(anyhow!("Unsupported command: {}", unknown)),
        }
    }

    /// Idempotent session teardown: mark terminated, kill any spawned
    /// child, close the inspector transport, reset every registry.
    pub(crate) async fn shutdown(&self) {
        let process = {
            let mut state = self.state.lock().await;
            if state.terminated {
                return;
            }
            state.terminated = true;
            state.reset()
        };

        if let Some(mut process) = process {
            process.terminate().await;
        }
        self.inspector.close().await;

        self.emit("terminated", None::<Value>);
        info!("Session terminated");
    }

    /// Push one DAP event to the client.
    pub(crate) fn emit<B: serde::Serialize>(&self, event: &'static str, body: Option<B>) {
        let body = body.and_then(|b| serde_json::to_value(b).ok());
        self.sink.send_event(Event::new(event, body));
    }

    pub(crate) fn emit_output(&self, category: &'static str, output: impl Into<String>) {
        let mut output = output.into();
        if !output.ends_with('\n') {
            output.push('\n');
        }
        self.emit(
            "output",
            Some(crate::protocol::OutputEventBody { category, output }),
        );
    }
}

/// Decode a request's arguments, treating absent arguments as `{}` so
/// commands with all-optional arguments tolerate a missing payload.
fn args<T: DeserializeOwned>(request: &Request) -> Result<T> {
    let value = if request.arguments.is_null() {
        Value::Object(serde_json::Map::new())
    } else {
        request.arguments.clone()
    };
    serde_json::from_value(value)
        .map_err(|e| anyhow!("Invalid {} arguments: {}", request.command, e))
}
