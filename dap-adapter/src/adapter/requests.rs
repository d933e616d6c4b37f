// DAP request handlers
//
// One method per command, dispatched from the orchestrator. Handlers
// never hold the session lock across an inspector round-trip or a
// pending-source wait.

use super::{DebugAdapter, FrameSnapshot, Phase, THREAD_ID};
use crate::eval::sanitize_expression;
use crate::launch::{is_supported_script, prefer_ipv6_loopback, LaunchedProcess, RetryPolicy};
use crate::protocol::{
    AttachArguments, BreakpointEventBody, BreakpointLocation, BreakpointLocationsArguments,
    EvaluateArguments, InitializeArguments, LaunchArguments, ScopesArguments,
    SetBreakpointsArguments, SetExceptionBreakpointsArguments, SetFunctionBreakpointsArguments,
    SourceArguments, SourceBreakpoint, StackTraceArguments, Thread, Variable,
    VariablesArguments,
};
use crate::registry::{FunctionBreakpoint, LocationBreakpoint, Source, SourceKey};
use crate::variables::{
    empty_variable, sort_variables, variable_for, VariablesEntry, NO_VARIABLES,
};
use anyhow::{anyhow, bail, Result};
use inspector_client::types::{Location, RemoteObject};
use inspector_client::PauseOnExceptions;
use serde_json::{json, Value};
use tracing::{info, warn};

impl DebugAdapter {
    pub(super) async fn initialize(
        &self,
        arguments: InitializeArguments,
    ) -> Result<Option<Value>> {
        let mut state = self.state.lock().await;
        state.phase = Phase::Initializing;
        state.expects_configuration_done = arguments
            .supports_configuration_done_request
            .unwrap_or(false);
        info!(
            "Initialized by client {}",
            arguments.client_id.as_deref().unwrap_or("unknown")
        );
        Ok(Some(self.capabilities.clone()))
    }

    /// Launch the debuggee.
    ///
    /// The response is always a success: spawn and attach failures are
    /// reported through output and terminated events instead, so the
    /// client observes them the same way it observes a crash at runtime.
    pub(super) async fn launch(&self, arguments: LaunchArguments) -> Result<Option<Value>> {
        if let Err(e) = self.try_launch(arguments).await {
            warn!("Launch failed: {:#}", e);
            self.emit_output("stderr", format!("{:#}", e));
            self.shutdown().await;
        }
        Ok(None)
    }

    async fn try_launch(&self, arguments: LaunchArguments) -> Result<()> {
        if !is_supported_script(&arguments.program) {
            bail!("{} is not a debuggable script", arguments.program);
        }

        let runtime = arguments.runtime.as_deref().unwrap_or("bun");
        let mut launch_args = vec!["--inspect-wait=127.0.0.1:0".to_string()];
        launch_args.push(arguments.program.clone());
        launch_args.extend(arguments.args);

        let mut process = LaunchedProcess::spawn(
            runtime,
            &launch_args,
            arguments.cwd.as_deref(),
            &arguments.env,
        )?;

        let url = match process.await_inspector_url(RetryPolicy::default()).await {
            Ok(url) => url,
            Err(e) => {
                // Replay whatever the process printed before dying so the
                // user sees its own error message, not just ours.
                if let Some(output) = e.captured_output().filter(|o| !o.is_empty()) {
                    self.emit_output("stdout", output.to_string());
                }
                return Err(e.into());
            }
        };
        let url = prefer_ipv6_loopback(&url);

        {
            let mut state = self.state.lock().await;
            state.process = Some(process);
        }

        self.inspector.connect(&url).await?;
        Ok(())
    }

    pub(super) async fn attach(&self, arguments: AttachArguments) -> Result<Option<Value>> {
        let url = prefer_ipv6_loopback(&arguments.url);
        self.inspector.connect(&url).await?;
        Ok(None)
    }

    /// The client is done configuring breakpoints; release the debuggee,
    /// which has been held at its first statement since launch.
    pub(super) async fn configuration_done(&self) -> Result<Option<Value>> {
        self.inspector.inspector_initialized().await?;
        Ok(None)
    }

    /// Install the full breakpoint set for one source, last writer wins.
    ///
    /// Breakpoints at a position that already carries a binding are
    /// reused as-is: a repeated identical request is a no-op and emits no
    /// breakpoint events. Dropped positions are unbound and reported as
    /// removed; new positions are bound and reported as changed.
    pub(super) async fn set_breakpoints(
        &self,
        arguments: SetBreakpointsArguments,
    ) -> Result<Option<Value>> {
        let key = SourceKey::from_dap(&arguments.source)
            .ok_or_else(|| anyhow!("Source has neither a path nor a reference"))?;
        let source = self.resolve_source(&key).await?;

        let previous = {
            let state = self.state.lock().await;
            state.breakpoints.for_source(&source.key()).to_vec()
        };

        let mut bound = Vec::with_capacity(arguments.breakpoints.len());
        let mut created = Vec::new();
        for requested in &arguments.breakpoints {
            let existing = previous.iter().find(|bp| {
                bp.requested_line == requested.line && bp.requested_column == requested.column
            });
            if let Some(existing) = existing {
                bound.push(existing.clone());
                continue;
            }

            let id = self.state.lock().await.breakpoints.next_id();
            let breakpoint = self.bind_breakpoint(&source, id, requested).await;
            created.push(breakpoint.clone());
            bound.push(breakpoint);
        }

        let removed: Vec<LocationBreakpoint> = {
            let mut state = self.state.lock().await;
            state
                .breakpoints
                .replace_for_source(source.key(), bound.clone())
                .into_iter()
                .filter(|old| !bound.iter().any(|new| new.id == old.id))
                .collect()
        };

        for old in &removed {
            if let Some(inspector_id) = &old.inspector_id {
                self.inspector.remove_breakpoint(inspector_id).await.ok();
            }
            self.emit(
                "breakpoint",
                Some(BreakpointEventBody {
                    reason: "removed",
                    breakpoint: old.to_dap(None),
                }),
            );
        }
        for new in &created {
            self.emit(
                "breakpoint",
                Some(BreakpointEventBody {
                    reason: "changed",
                    breakpoint: new.to_dap(Some(source.to_dap())),
                }),
            );
        }

        let breakpoints: Vec<_> = bound
            .iter()
            .map(|bp| bp.to_dap(Some(source.to_dap())))
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    /// Resolve a client-addressed source, waiting for a path-addressed
    /// script that has not been parsed yet.
    async fn resolve_source(&self, key: &SourceKey) -> Result<Source> {
        match key {
            SourceKey::Path(path) => {
                let pending = {
                    let mut state = self.state.lock().await;
                    state.sources.resolve_or_wait(path)
                };
                match pending {
                    Ok(source) => Ok(source),
                    Err(waiter) => waiter
                        .await
                        .map_err(|_| anyhow!("Session ended before {} loaded", path)),
                }
            }
            SourceKey::Reference(reference) => {
                let state = self.state.lock().await;
                state
                    .sources
                    .by_reference(*reference)
                    .ok_or_else(|| anyhow!("Unknown source reference {}", reference))
            }
        }
    }

    async fn bind_breakpoint(
        &self,
        source: &Source,
        id: i64,
        requested: &SourceBreakpoint,
    ) -> LocationBreakpoint {
        let unbound = |verified: bool, message: Option<String>, inspector_id| LocationBreakpoint {
            id,
            inspector_id,
            requested_line: requested.line,
            requested_column: requested.column,
            line: requested.line,
            column: requested.column,
            verified,
            message,
        };

        let url = match source.path() {
            Some(path) => format!("file://{}", path),
            None => {
                return unbound(
                    false,
                    Some("Breakpoints are not supported in this source".to_string()),
                    None,
                )
            }
        };

        // Authored 1-based -> executed 0-based.
        let executed = source.translator().to_executed(
            requested.line - 1,
            requested.column.map(|c| c - 1).unwrap_or(0),
            source.path(),
        );

        match self
            .inspector
            .set_breakpoint_by_url(
                &url,
                executed.line,
                Some(executed.column),
                requested.condition.as_deref(),
            )
            .await
        {
            Ok(result) => match result.locations.first() {
                Some(location) => {
                    let authored = source.translator().to_authored(
                        location.line_number,
                        location.column_number.unwrap_or(0),
                    );
                    LocationBreakpoint {
                        id,
                        inspector_id: Some(result.breakpoint_id),
                        requested_line: requested.line,
                        requested_column: requested.column,
                        line: authored.line + 1,
                        column: Some(authored.column + 1),
                        verified: true,
                        message: None,
                    }
                }
                // Bound but not yet resolved to a location.
                None => unbound(false, None, Some(result.breakpoint_id)),
            },
            Err(e) => unbound(false, Some(e.to_string()), None),
        }
    }

    pub(super) async fn set_function_breakpoints(
        &self,
        arguments: SetFunctionBreakpointsArguments,
    ) -> Result<Option<Value>> {
        let previous = {
            let state = self.state.lock().await;
            state.breakpoints.functions().to_vec()
        };

        let mut bound = Vec::with_capacity(arguments.breakpoints.len());
        let mut created = Vec::new();
        for requested in &arguments.breakpoints {
            if let Some(existing) = previous.iter().find(|bp| bp.name == requested.name) {
                bound.push(existing.clone());
                continue;
            }

            let id = self.state.lock().await.breakpoints.next_id();
            let breakpoint = match self.inspector.add_symbolic_breakpoint(&requested.name).await
            {
                Ok(()) => FunctionBreakpoint {
                    id,
                    name: requested.name.clone(),
                    verified: true,
                    message: None,
                },
                Err(e) => FunctionBreakpoint {
                    id,
                    name: requested.name.clone(),
                    verified: false,
                    message: Some(e.to_string()),
                },
            };
            created.push(breakpoint.clone());
            bound.push(breakpoint);
        }

        let removed: Vec<FunctionBreakpoint> = {
            let mut state = self.state.lock().await;
            state
                .breakpoints
                .replace_functions(bound.clone())
                .into_iter()
                .filter(|old| !bound.iter().any(|new| new.id == old.id))
                .collect()
        };
        for old in &removed {
            self.inspector.remove_symbolic_breakpoint(&old.name).await.ok();
            self.emit(
                "breakpoint",
                Some(BreakpointEventBody {
                    reason: "removed",
                    breakpoint: old.to_dap(),
                }),
            );
        }
        for new in &created {
            self.emit(
                "breakpoint",
                Some(BreakpointEventBody {
                    reason: "changed",
                    breakpoint: new.to_dap(),
                }),
            );
        }

        let breakpoints: Vec<_> = bound.iter().map(FunctionBreakpoint::to_dap).collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    pub(super) async fn set_exception_breakpoints(
        &self,
        arguments: SetExceptionBreakpointsArguments,
    ) -> Result<Option<Value>> {
        let filters: Vec<&str> = arguments.filters.iter().map(String::as_str).collect();
        let state = if filters.contains(&"all") {
            PauseOnExceptions::All
        } else if filters.contains(&"uncaught") {
            PauseOnExceptions::Uncaught
        } else {
            PauseOnExceptions::None
        };

        self.inspector.set_pause_on_exceptions(state).await?;
        Ok(None)
    }

    pub(super) async fn pause(&self) -> Result<Option<Value>> {
        self.inspector.pause().await?;
        Ok(None)
    }

    pub(super) async fn resume(&self) -> Result<Option<Value>> {
        self.inspector.resume().await?;
        Ok(Some(json!({ "allThreadsContinued": true })))
    }

    pub(super) async fn step_over(&self) -> Result<Option<Value>> {
        self.begin_step().await;
        if let Err(e) = self.inspector.step_over().await {
            self.cancel_step().await;
            return Err(e.into());
        }
        Ok(None)
    }

    pub(super) async fn step_in(&self) -> Result<Option<Value>> {
        self.begin_step().await;
        if let Err(e) = self.inspector.step_into().await {
            self.cancel_step().await;
            return Err(e.into());
        }
        Ok(None)
    }

    pub(super) async fn step_out(&self) -> Result<Option<Value>> {
        self.begin_step().await;
        if let Err(e) = self.inspector.step_out().await {
            self.cancel_step().await;
            return Err(e.into());
        }
        Ok(None)
    }

    async fn begin_step(&self) {
        self.state.lock().await.step_in_flight = true;
    }

    async fn cancel_step(&self) {
        self.state.lock().await.step_in_flight = false;
    }

    pub(super) async fn stack_trace(
        &self,
        arguments: StackTraceArguments,
    ) -> Result<Option<Value>> {
        let state = self.state.lock().await;
        if !matches!(state.phase, Phase::Paused(_)) {
            bail!("Not paused");
        }

        let start = arguments.start_frame.unwrap_or(0).max(0) as usize;
        let levels = arguments
            .levels
            .filter(|levels| *levels > 0)
            .map(|levels| levels as usize)
            .unwrap_or(usize::MAX);

        let frames: Vec<_> = state
            .frames
            .iter()
            .skip(start)
            .take(levels)
            .map(frame_to_dap)
            .collect();
        Ok(Some(json!({
            "stackFrames": frames,
            "totalFrames": state.frames.len(),
        })))
    }

    pub(super) async fn scopes(&self, arguments: ScopesArguments) -> Result<Option<Value>> {
        let state = self.state.lock().await;
        let frame = state
            .frames
            .iter()
            .find(|frame| frame.id == arguments.frame_id)
            .ok_or_else(|| anyhow!("Unknown frame {}", arguments.frame_id))?;
        Ok(Some(json!({ "scopes": frame.scopes })))
    }

    pub(super) async fn variables(
        &self,
        arguments: VariablesArguments,
    ) -> Result<Option<Value>> {
        let entry = {
            let state = self.state.lock().await;
            state.variables.get(arguments.variables_reference).clone()
        };

        let variables = match entry {
            VariablesEntry::Empty => Vec::new(),
            VariablesEntry::List(list) => page(list, arguments.start, arguments.count),
            VariablesEntry::Object(object) => {
                self.expand_object(&object, arguments.start, arguments.count)
                    .await?
            }
        };
        Ok(Some(json!({ "variables": variables })))
    }

    /// Fetch one object's children from the inspector and materialize
    /// them as variables.
    async fn expand_object(
        &self,
        object: &RemoteObject,
        start: Option<i64>,
        count: Option<i64>,
    ) -> Result<Vec<Variable>> {
        let object_id = object
            .object_id
            .clone()
            .ok_or_else(|| anyhow!("Value has no remote handle"))?;
        let fetch_start = start.unwrap_or(0).max(0);
        // 0 asks the inspector for everything.
        let fetch_count = count.filter(|c| *c > 0).unwrap_or(0);

        let properties = self
            .inspector
            .get_displayable_properties(&object_id, fetch_start, fetch_count)
            .await?;
        let entries = if object.is_collection() {
            self.inspector
                .get_collection_entries(&object_id, fetch_start, fetch_count)
                .await?
        } else {
            Vec::new()
        };

        let mut state = self.state.lock().await;
        let store = &mut state.variables;
        let mut variables = Vec::new();

        for property in &properties.properties {
            if let Some(value) = &property.value {
                variables.push(variable_for(store, property.name.clone(), value));
            } else if let Some(getter) = &property.get {
                variables.push(variable_for(store, format!("get {}", property.name), getter));
            } else if let Some(setter) = &property.set {
                variables.push(variable_for(store, format!("set {}", property.name), setter));
            } else if let Some(symbol) = &property.symbol {
                variables.push(variable_for(store, property.name.clone(), symbol));
            } else {
                variables.push(empty_variable(property.name.clone()));
            }
        }
        for (ordinal, entry) in entries.iter().enumerate() {
            let name = entry
                .key
                .as_ref()
                .map(|key| key.display())
                .unwrap_or_else(|| ordinal.to_string());
            variables.push(variable_for(store, name, &entry.value));
        }
        for internal in &properties.internal_properties {
            if let Some(value) = &internal.value {
                variables.push(variable_for(store, internal.name.clone(), value));
            }
        }

        sort_variables(&mut variables);
        Ok(variables)
    }

    pub(super) async fn evaluate(&self, arguments: EvaluateArguments) -> Result<Option<Value>> {
        let expression = sanitize_expression(&arguments.expression);

        let call_frame_id = match arguments.frame_id {
            Some(frame_id) => {
                let state = self.state.lock().await;
                state
                    .frames
                    .iter()
                    .find(|frame| frame.id == frame_id)
                    .and_then(|frame| frame.call_frame_id.clone())
            }
            None => None,
        };

        let evaluated = match call_frame_id {
            Some(call_frame_id) => {
                self.inspector
                    .evaluate_on_call_frame(&call_frame_id, &expression)
                    .await?
            }
            None => self.inspector.evaluate(&expression).await?,
        };

        if evaluated.was_thrown {
            // Hover evaluations run speculatively on whatever token is
            // under the cursor; their parse and resolution noise is
            // swallowed instead of surfaced.
            let hover = arguments.context.as_deref() == Some("hover");
            if hover && is_soft_error(&evaluated.result) {
                return Ok(Some(json!({
                    "result": "",
                    "variablesReference": NO_VARIABLES,
                })));
            }
            bail!("{}", evaluated.result.display());
        }

        let mut state = self.state.lock().await;
        let reference = state.variables.reference_for(&evaluated.result);
        Ok(Some(json!({
            "result": evaluated.result.display(),
            "variablesReference": reference,
        })))
    }

    pub(super) async fn threads(&self) -> Result<Option<Value>> {
        Ok(Some(json!({
            "threads": [Thread { id: THREAD_ID, name: "main".to_string() }],
        })))
    }

    pub(super) async fn loaded_sources(&self) -> Result<Option<Value>> {
        let state = self.state.lock().await;
        let sources: Vec<_> = state.sources.all().iter().map(Source::to_dap).collect();
        Ok(Some(json!({ "sources": sources })))
    }

    /// Serve the text of a reference-addressed source. Path-addressed
    /// sources are read from disk by the client itself.
    pub(super) async fn source(&self, arguments: SourceArguments) -> Result<Option<Value>> {
        let reference = arguments
            .source_reference
            .or_else(|| arguments.source.as_ref().and_then(|s| s.source_reference))
            .ok_or_else(|| anyhow!("Only reference-addressed sources are served"))?;

        let source = {
            let state = self.state.lock().await;
            state.sources.by_reference(reference)
        }
        .ok_or_else(|| anyhow!("Unknown source reference {}", reference))?;

        let content = self.inspector.get_script_source(source.script_id()).await?;
        Ok(Some(json!({ "content": content })))
    }

    pub(super) async fn breakpoint_locations(
        &self,
        arguments: BreakpointLocationsArguments,
    ) -> Result<Option<Value>> {
        let key = SourceKey::from_dap(&arguments.source)
            .ok_or_else(|| anyhow!("Source has neither a path nor a reference"))?;
        let source = {
            let state = self.state.lock().await;
            state.sources.by_key(&key)
        }
        .ok_or_else(|| anyhow!("Unknown source"))?;

        let end_line = arguments.end_line.unwrap_or(arguments.line);
        let start = source
            .translator()
            .to_executed(arguments.line - 1, 0, source.path());
        let end = source
            .translator()
            .to_executed(end_line - 1, 0, source.path());

        let locations = self
            .inspector
            .get_possible_breakpoints(
                &Location {
                    script_id: source.script_id().clone(),
                    line_number: start.line,
                    column_number: Some(start.column),
                },
                Some(&Location {
                    script_id: source.script_id().clone(),
                    // End is exclusive.
                    line_number: end.line + 1,
                    column_number: Some(0),
                }),
            )
            .await?;

        let breakpoints: Vec<BreakpointLocation> = locations
            .iter()
            .map(|location| {
                let authored = source.translator().to_authored(
                    location.line_number,
                    location.column_number.unwrap_or(0),
                );
                BreakpointLocation {
                    line: authored.line + 1,
                    column: Some(authored.column + 1),
                }
            })
            .collect();
        Ok(Some(json!({ "breakpoints": breakpoints })))
    }

    pub(super) async fn close(&self) -> Result<Option<Value>> {
        self.shutdown().await;
        Ok(None)
    }
}

fn frame_to_dap(frame: &FrameSnapshot) -> crate::protocol::StackFrame {
    crate::protocol::StackFrame {
        id: frame.id,
        name: frame.name.clone(),
        source: frame.source.as_ref().map(Source::to_dap),
        line: frame.line,
        column: frame.column,
        can_restart: false,
        presentation_hint: frame.synthetic.then_some("subtle"),
    }
}

fn page(list: Vec<Variable>, start: Option<i64>, count: Option<i64>) -> Vec<Variable> {
    let start = start.unwrap_or(0).max(0) as usize;
    let count = count
        .filter(|count| *count > 0)
        .map(|count| count as usize)
        .unwrap_or(usize::MAX);
    list.into_iter().skip(start).take(count).collect()
}

fn is_soft_error(result: &RemoteObject) -> bool {
    matches!(
        result.class_name.as_deref(),
        Some("SyntaxError") | Some("ReferenceError")
    )
}
