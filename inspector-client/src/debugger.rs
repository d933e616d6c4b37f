// Debugger domain command implementations
//
// Execution control, breakpoint binding and script access.

use crate::client::InspectorClient;
use crate::protocol::InspectorResult;
use crate::types::{BreakpointId, EvaluateResult, Location, ScriptId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Result of `Debugger.setBreakpointByUrl`: the inspector handle plus the
/// locations the breakpoint actually bound to (empty until the script
/// loads).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetBreakpointResult {
    pub breakpoint_id: BreakpointId,
    #[serde(default)]
    pub locations: Vec<Location>,
}

/// `state` argument of `Debugger.setPauseOnExceptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PauseOnExceptions {
    None,
    Uncaught,
    All,
}

impl PauseOnExceptions {
    pub fn as_str(self) -> &'static str {
        match self {
            PauseOnExceptions::None => "none",
            PauseOnExceptions::Uncaught => "uncaught",
            PauseOnExceptions::All => "all",
        }
    }
}

impl InspectorClient {
    /// Enable the Debugger domain (Debugger.enable)
    pub async fn debugger_enable(&self) -> InspectorResult<()> {
        self.request("Debugger.enable", Value::Null).await?;
        Ok(())
    }

    /// Bind a breakpoint by script URL (Debugger.setBreakpointByUrl)
    ///
    /// Binding by URL rather than script id lets the breakpoint survive
    /// script reloads and apply before the script is parsed.
    pub async fn set_breakpoint_by_url(
        &self,
        url: &str,
        line_number: i64,
        column_number: Option<i64>,
        condition: Option<&str>,
    ) -> InspectorResult<SetBreakpointResult> {
        let mut params = json!({
            "url": url,
            "lineNumber": line_number,
        });
        if let Some(column) = column_number {
            params["columnNumber"] = json!(column);
        }
        if let Some(condition) = condition {
            params["options"] = json!({"condition": condition});
        }

        let result = self.request("Debugger.setBreakpointByUrl", params).await?;
        Self::decode("Debugger.setBreakpointByUrl", result)
    }

    /// Unbind a breakpoint (Debugger.removeBreakpoint)
    ///
    /// The backend may have dropped the binding already (script unloaded),
    /// which is not worth failing over.
    pub async fn remove_breakpoint(&self, breakpoint_id: &BreakpointId) -> InspectorResult<()> {
        self.request_ignoring(
            "Debugger.removeBreakpoint",
            json!({"breakpointId": breakpoint_id}),
            &["not found", "Breakpoint"],
        )
        .await?;
        Ok(())
    }

    /// Bind a symbolic breakpoint on a function name
    /// (Debugger.addSymbolicBreakpoint)
    pub async fn add_symbolic_breakpoint(&self, symbol: &str) -> InspectorResult<()> {
        self.request(
            "Debugger.addSymbolicBreakpoint",
            json!({"symbol": symbol, "caseSensitive": true, "isRegex": false}),
        )
        .await?;
        Ok(())
    }

    /// Remove a symbolic breakpoint (Debugger.removeSymbolicBreakpoint)
    pub async fn remove_symbolic_breakpoint(&self, symbol: &str) -> InspectorResult<()> {
        self.request_ignoring(
            "Debugger.removeSymbolicBreakpoint",
            json!({"symbol": symbol, "caseSensitive": true, "isRegex": false}),
            &["not found"],
        )
        .await?;
        Ok(())
    }

    /// Resume execution (Debugger.resume)
    pub async fn resume(&self) -> InspectorResult<()> {
        self.request("Debugger.resume", Value::Null).await?;
        Ok(())
    }

    /// Pause at the next statement (Debugger.pause)
    pub async fn pause(&self) -> InspectorResult<()> {
        self.request("Debugger.pause", Value::Null).await?;
        Ok(())
    }

    /// Step over the current statement (Debugger.stepOver)
    pub async fn step_over(&self) -> InspectorResult<()> {
        self.request("Debugger.stepOver", Value::Null).await?;
        Ok(())
    }

    /// Step into the next call (Debugger.stepInto)
    pub async fn step_into(&self) -> InspectorResult<()> {
        self.request("Debugger.stepInto", Value::Null).await?;
        Ok(())
    }

    /// Step out of the current frame (Debugger.stepOut)
    pub async fn step_out(&self) -> InspectorResult<()> {
        self.request("Debugger.stepOut", Value::Null).await?;
        Ok(())
    }

    /// Configure exception pausing (Debugger.setPauseOnExceptions)
    pub async fn set_pause_on_exceptions(
        &self,
        state: PauseOnExceptions,
    ) -> InspectorResult<()> {
        self.request(
            "Debugger.setPauseOnExceptions",
            json!({"state": state.as_str()}),
        )
        .await?;
        Ok(())
    }

    /// Fetch the text of a loaded script (Debugger.getScriptSource)
    pub async fn get_script_source(&self, script_id: &ScriptId) -> InspectorResult<String> {
        let result = self
            .request("Debugger.getScriptSource", json!({"scriptId": script_id}))
            .await?;

        #[derive(Deserialize)]
        #[serde(rename_all = "camelCase")]
        struct ScriptSource {
            script_source: String,
        }
        let decoded: ScriptSource = Self::decode("Debugger.getScriptSource", result)?;
        Ok(decoded.script_source)
    }

    /// List valid breakpoint positions in a script range
    /// (Debugger.getPossibleBreakpoints)
    pub async fn get_possible_breakpoints(
        &self,
        start: &Location,
        end: Option<&Location>,
    ) -> InspectorResult<Vec<Location>> {
        let mut params = json!({"start": start});
        if let Some(end) = end {
            params["end"] = json!(end);
        }

        let result = self
            .request("Debugger.getPossibleBreakpoints", params)
            .await?;

        #[derive(Deserialize)]
        struct Locations {
            #[serde(default)]
            locations: Vec<Location>,
        }
        let decoded: Locations = Self::decode("Debugger.getPossibleBreakpoints", result)?;
        Ok(decoded.locations)
    }

    /// Evaluate an expression in a paused frame
    /// (Debugger.evaluateOnCallFrame)
    pub async fn evaluate_on_call_frame(
        &self,
        call_frame_id: &str,
        expression: &str,
    ) -> InspectorResult<EvaluateResult> {
        let result = self
            .request(
                "Debugger.evaluateOnCallFrame",
                json!({
                    "callFrameId": call_frame_id,
                    "expression": expression,
                    "generatePreview": true,
                }),
            )
            .await?;
        Self::decode("Debugger.evaluateOnCallFrame", result)
    }

    /// Signal that frontend configuration is complete
    /// (Inspector.initialized); the runtime will not start running the
    /// target until it receives this.
    pub async fn inspector_initialized(&self) -> InspectorResult<()> {
        self.request("Inspector.initialized", Value::Null).await?;
        Ok(())
    }
}
