// Inspector event handlers
//
// Translates the inspector's push notifications into session state
// transitions and DAP events. Everything arrives on the single event
// pump, so handlers run strictly in arrival order.

use super::{DebugAdapter, FrameSnapshot, PauseReason, Phase, SessionState, THREAD_ID};
use crate::protocol::{
    ContinuedEventBody, LoadedSourceEventBody, Scope, StoppedEventBody,
};
use crate::registry::{BreakpointRegistry, SourceRegistry};
use crate::sourcemap::PositionTranslator;
use crate::variables::VariableStore;
use inspector_client::types::{
    CallFrame, ConsoleMessage, PausedEvent, ScopeDescriptor, ScriptParsedEvent,
};
use inspector_client::{InspectorEvent, InspectorResult, PauseOnExceptions};
use serde_json::Value;
use tracing::{debug, info, warn};

impl DebugAdapter {
    pub(crate) async fn handle_inspector_event(&self, event: InspectorEvent) {
        // A terminated session ignores everything still in flight.
        {
            let state = self.state.lock().await;
            if state.terminated {
                debug!("Dropping inspector event after termination");
                return;
            }
        }

        match event {
            InspectorEvent::Connected => self.on_connected().await,
            InspectorEvent::Disconnected { error } => self.on_disconnected(error).await,
            InspectorEvent::ScriptParsed(script) => self.on_script_parsed(script).await,
            InspectorEvent::ScriptFailedToParse(script) => {
                self.on_script_failed_to_parse(script)
            }
            InspectorEvent::Paused(paused) => self.on_paused(paused).await,
            InspectorEvent::Resumed => self.on_resumed().await,
            InspectorEvent::ConsoleMessageAdded(message) => self.on_console_message(message),
        }
    }

    async fn on_connected(&self) {
        info!("Inspector connected");

        if let Err(e) = self.configure_inspector().await {
            warn!("Inspector configuration failed: {}", e);
            self.emit_output("stderr", format!("Failed to configure the debugger: {}", e));
            self.shutdown().await;
            return;
        }

        let expects_configuration_done = {
            let mut state = self.state.lock().await;
            state.phase = Phase::Running;
            state.expects_configuration_done
        };

        // The client answers with its breakpoint configuration; its
        // `configurationDone` then releases the held debuggee. Clients
        // that never send one get the release right away.
        self.emit("initialized", None::<Value>);
        if !expects_configuration_done {
            if let Err(e) = self.inspector.inspector_initialized().await {
                warn!("Inspector.initialized failed: {}", e);
            }
        }
    }

    async fn configure_inspector(&self) -> InspectorResult<()> {
        self.inspector.debugger_enable().await?;
        self.inspector.runtime_enable().await?;
        self.inspector.console_enable().await?;
        self.inspector
            .set_pause_on_exceptions(PauseOnExceptions::None)
            .await?;
        Ok(())
    }

    async fn on_disconnected(&self, error: Option<String>) {
        if let Some(error) = error {
            self.emit_output("stderr", format!("Debugger connection lost: {}", error));
        }
        self.shutdown().await;
    }

    async fn on_script_parsed(&self, script: ScriptParsedEvent) {
        let translator = script
            .source_map_url
            .as_deref()
            .map(PositionTranslator::from_source_map_url)
            .unwrap_or_else(PositionTranslator::identity);

        let registered = {
            let mut state = self.state.lock().await;
            state.sources.register(script.script_id, &script.url, translator)
        };

        // A reload displaces the old entry before announcing the new one.
        if let Some(old) = registered.superseded {
            self.emit(
                "loadedSource",
                Some(LoadedSourceEventBody {
                    reason: "removed",
                    source: old.to_dap(),
                }),
            );
            self.emit(
                "loadedSource",
                Some(LoadedSourceEventBody {
                    reason: "changed",
                    source: registered.source.to_dap(),
                }),
            );
        } else {
            self.emit(
                "loadedSource",
                Some(LoadedSourceEventBody {
                    reason: "new",
                    source: registered.source.to_dap(),
                }),
            );
        }
    }

    fn on_script_failed_to_parse(&self, script: ScriptParsedEvent) {
        let what = if script.url.is_empty() {
            "script".to_string()
        } else {
            script.url
        };
        let message = script
            .error_message
            .unwrap_or_else(|| "SyntaxError".to_string());
        self.emit_output("stderr", format!("Failed to parse {}: {}", what, message));
    }

    async fn on_paused(&self, paused: PausedEvent) {
        let (reason, hit_breakpoint_ids) = {
            let mut state = self.state.lock().await;

            let reason = classify_pause(&paused.reason, state.step_in_flight);
            state.step_in_flight = false;

            let SessionState {
                sources,
                variables,
                frames,
                ..
            } = &mut *state;

            frames.clear();
            let mut next_id = 1;
            for frame in &paused.call_frames {
                frames.push(snapshot_frame(sources, variables, next_id, frame, false));
                next_id += 1;
            }

            // Async causality: frames of the scheduling stacks, oldest
            // last, shown below the live stack.
            let mut chain = paused.async_stack_trace.as_ref();
            while let Some(trace) = chain {
                for frame in &trace.call_frames {
                    frames.push(snapshot_frame(sources, variables, next_id, frame, true));
                    next_id += 1;
                }
                chain = trace.parent.as_deref();
            }

            let hit = hit_breakpoint_ids(&state.breakpoints, reason, paused.data.as_ref());
            state.phase = Phase::Paused(reason);
            (reason, hit)
        };

        debug!("Paused: {:?}", reason);
        self.emit(
            "stopped",
            Some(StoppedEventBody {
                reason: reason.as_dap(),
                thread_id: THREAD_ID,
                all_threads_stopped: true,
                description: None,
                hit_breakpoint_ids,
            }),
        );
    }

    async fn on_resumed(&self) {
        {
            let mut state = self.state.lock().await;
            // Variable references from the ended pause dangle rather than
            // being recycled; stale lookups degrade to the empty sentinel.
            state.frames.clear();
            state.phase = Phase::Running;
        }
        self.emit(
            "continued",
            Some(ContinuedEventBody {
                thread_id: THREAD_ID,
                all_threads_continued: true,
            }),
        );
    }

    fn on_console_message(&self, message: ConsoleMessage) {
        let category = if message.level == "error" {
            "stderr"
        } else {
            "stdout"
        };
        self.emit_output(category, message.text);
    }
}

fn snapshot_frame(
    sources: &SourceRegistry,
    variables: &mut VariableStore,
    id: i64,
    frame: &CallFrame,
    synthetic: bool,
) -> FrameSnapshot {
    let source = sources.by_script_id(&frame.location.script_id);

    // Executed 0-based -> authored 1-based.
    let executed_line = frame.location.line_number;
    let executed_column = frame.location.column_number.unwrap_or(0);
    let (line, column) = match &source {
        Some(source) => {
            let authored = source.translator().to_authored(executed_line, executed_column);
            (authored.line + 1, authored.column + 1)
        }
        None => (executed_line + 1, executed_column + 1),
    };

    let scopes = if synthetic {
        Vec::new()
    } else {
        frame
            .scope_chain
            .iter()
            .map(|scope| scope_to_dap(variables, scope))
            .collect()
    };

    FrameSnapshot {
        id,
        call_frame_id: (!synthetic).then(|| frame.call_frame_id.clone()),
        name: if frame.function_name.is_empty() {
            "(anonymous)".to_string()
        } else {
            frame.function_name.clone()
        },
        source,
        line,
        column,
        scopes,
        synthetic,
    }
}

fn scope_to_dap(variables: &mut VariableStore, scope: &ScopeDescriptor) -> Scope {
    Scope {
        name: scope
            .name
            .clone()
            .unwrap_or_else(|| scope_title(&scope.scope_type).to_string()),
        presentation_hint: scope_hint(&scope.scope_type),
        variables_reference: variables.reference_for(&scope.object),
        expensive: scope.scope_type == "global",
    }
}

fn scope_title(scope_type: &str) -> &str {
    match scope_type {
        "closure" => "Closure",
        "functionName" => "Function",
        "catch" => "Catch",
        "with" => "With",
        "global" => "Global",
        "globalLexicalEnvironment" => "Global Lexical Environment",
        "nestedLexical" => "Block",
        other => other,
    }
}

fn scope_hint(scope_type: &str) -> Option<&'static str> {
    match scope_type {
        "closure" | "functionName" | "nestedLexical" | "catch" => Some("locals"),
        _ => None,
    }
}

/// Map the inspector's pause reason onto the closed DAP set. A step that
/// lands on an explicit breakpoint or exception reports that instead of
/// "step".
fn classify_pause(reason: &str, step_in_flight: bool) -> PauseReason {
    match reason {
        "Breakpoint" => PauseReason::Breakpoint,
        "FunctionCall" => PauseReason::FunctionBreakpoint,
        "exception" | "assert" => PauseReason::Exception,
        "PauseOnNextStatement" | "Pause" | "DebuggerStatement" => {
            if step_in_flight {
                PauseReason::Step
            } else {
                PauseReason::Pause
            }
        }
        _ if step_in_flight => PauseReason::Step,
        _ => PauseReason::Breakpoint,
    }
}

/// Session ids of the breakpoints that caused a stop, resolved from the
/// reason-specific pause payload.
fn hit_breakpoint_ids(
    breakpoints: &BreakpointRegistry,
    reason: PauseReason,
    data: Option<&Value>,
) -> Vec<i64> {
    let Some(data) = data else {
        return Vec::new();
    };

    let id = match reason {
        PauseReason::Breakpoint => data
            .get("breakpointId")
            .and_then(Value::as_str)
            .and_then(|inspector_id| breakpoints.find_by_inspector_id(inspector_id)),
        PauseReason::FunctionBreakpoint => data
            .get("name")
            .and_then(Value::as_str)
            .and_then(|name| breakpoints.find_function_by_name(name)),
        _ => None,
    };
    id.into_iter().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::LocationBreakpoint;
    use serde_json::json;

    #[test]
    fn test_classify_pause() {
        assert_eq!(classify_pause("Breakpoint", false), PauseReason::Breakpoint);
        assert_eq!(
            classify_pause("FunctionCall", false),
            PauseReason::FunctionBreakpoint
        );
        assert_eq!(classify_pause("exception", false), PauseReason::Exception);
        assert_eq!(classify_pause("PauseOnNextStatement", false), PauseReason::Pause);
        assert_eq!(classify_pause("DebuggerStatement", false), PauseReason::Pause);
    }

    #[test]
    fn test_step_attribution() {
        // A pending step claims the generic pause reasons...
        assert_eq!(classify_pause("PauseOnNextStatement", true), PauseReason::Step);
        assert_eq!(classify_pause("Microtask", true), PauseReason::Step);
        // ...but never an explicit breakpoint or exception.
        assert_eq!(classify_pause("Breakpoint", true), PauseReason::Breakpoint);
        assert_eq!(classify_pause("exception", true), PauseReason::Exception);
    }

    #[test]
    fn test_hit_breakpoint_ids_resolve_session_ids() {
        let mut breakpoints = BreakpointRegistry::new();
        breakpoints.replace_for_source(
            crate::registry::SourceKey::Path("/a.js".to_string()),
            vec![LocationBreakpoint {
                id: 5,
                inspector_id: Some("42".to_string()),
                requested_line: 3,
                requested_column: None,
                line: 3,
                column: None,
                verified: true,
                message: None,
            }],
        );

        let hit = hit_breakpoint_ids(
            &breakpoints,
            PauseReason::Breakpoint,
            Some(&json!({"breakpointId": "42"})),
        );
        assert_eq!(hit, vec![5]);

        // Unknown handles and missing payloads resolve to nothing.
        assert!(hit_breakpoint_ids(
            &breakpoints,
            PauseReason::Breakpoint,
            Some(&json!({"breakpointId": "7"}))
        )
        .is_empty());
        assert!(hit_breakpoint_ids(&breakpoints, PauseReason::Breakpoint, None).is_empty());
    }
}
