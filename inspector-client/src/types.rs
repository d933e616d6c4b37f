// Inspector type definitions
//
// Wire types shared by the Debugger, Runtime and Console domains.
// Field names follow the protocol's camelCase spelling.

use serde::{Deserialize, Serialize};

/// Opaque script handle assigned by the inspector on parse.
pub type ScriptId = String;

/// Opaque handle for a live object in the debuggee heap.
pub type RemoteObjectId = String;

/// Opaque handle for one frame of a paused call stack.
pub type CallFrameId = String;

/// Opaque handle for a breakpoint bound in the inspector.
pub type BreakpointId = String;

/// A position in executed coordinates. Lines and columns are 0-based.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Location {
    pub script_id: ScriptId,
    pub line_number: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub column_number: Option<i64>,
}

/// A value mirrored out of the debuggee.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteObject {
    #[serde(rename = "type", default)]
    pub object_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub object_id: Option<RemoteObjectId>,
    /// For array-likes: number of indexed entries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i64>,
}

impl RemoteObject {
    /// Whether the mirrored value can be expanded further.
    pub fn is_expandable(&self) -> bool {
        self.object_id.is_some() && self.object_type == "object"
    }

    /// Whether the value is a keyed/indexed container with its own
    /// collection-entries accessor (Map, Set and friends).
    pub fn is_collection(&self) -> bool {
        matches!(
            self.subtype.as_deref(),
            Some("map") | Some("set") | Some("weakmap") | Some("weakset") | Some("iterator")
        )
    }

    /// Best-effort display string.
    pub fn display(&self) -> String {
        if let Some(description) = &self.description {
            return description.clone();
        }
        if let Some(value) = &self.value {
            return match value {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
        }
        self.object_type.clone()
    }
}

/// One frame of a paused call stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallFrame {
    pub call_frame_id: CallFrameId,
    #[serde(default)]
    pub function_name: String,
    pub location: Location,
    #[serde(default)]
    pub scope_chain: Vec<ScopeDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub this: Option<RemoteObject>,
}

/// One scope in a call frame's scope chain.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScopeDescriptor {
    /// global | with | closure | catch | functionName | globalLexicalEnvironment | nestedLexical
    #[serde(rename = "type")]
    pub scope_type: String,
    pub object: RemoteObject,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

/// An asynchronous causality chain attached to a pause.
///
/// `parent` links to the stack that scheduled this one, recursively.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StackTrace {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<Box<StackTrace>>,
}

/// One property of an inspected object.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub get: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub set: Option<RemoteObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub symbol: Option<RemoteObject>,
    #[serde(default)]
    pub enumerable: bool,
    #[serde(default)]
    pub writable: bool,
}

/// An engine-internal property such as `[[Prototype]]` or `[[PromiseState]]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InternalPropertyDescriptor {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<RemoteObject>,
}

/// One entry of a Map/Set-like collection.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionEntry {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<RemoteObject>,
    pub value: RemoteObject,
}

/// Payload of `Debugger.scriptParsed` / `Debugger.scriptFailedToParse`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptParsedEvent {
    pub script_id: ScriptId,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub start_line: i64,
    #[serde(default)]
    pub end_line: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_map_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

/// Payload of `Debugger.paused`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PausedEvent {
    #[serde(default)]
    pub call_frames: Vec<CallFrame>,
    #[serde(default)]
    pub reason: String,
    /// Reason-specific payload; for breakpoints, carries `breakpointId`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub async_stack_trace: Option<StackTrace>,
}

/// Payload of `Console.messageAdded`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConsoleMessage {
    #[serde(default)]
    pub level: String,
    #[serde(default)]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
}

/// Result of evaluating an expression.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EvaluateResult {
    pub result: RemoteObject,
    #[serde(default)]
    pub was_thrown: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_call_frame_deserialization() {
        let frame: CallFrame = serde_json::from_value(json!({
            "callFrameId": "frame:0",
            "functionName": "main",
            "location": {"scriptId": "12", "lineNumber": 4, "columnNumber": 2},
            "scopeChain": [
                {"type": "closure", "object": {"type": "object", "objectId": "obj:1"}}
            ],
            "this": {"type": "undefined"}
        }))
        .unwrap();

        assert_eq!(frame.function_name, "main");
        assert_eq!(frame.location.line_number, 4);
        assert_eq!(frame.scope_chain.len(), 1);
        assert_eq!(frame.scope_chain[0].scope_type, "closure");
    }

    #[test]
    fn test_remote_object_expandable() {
        let plain = RemoteObject {
            object_type: "number".to_string(),
            value: Some(json!(3)),
            ..Default::default()
        };
        assert!(!plain.is_expandable());
        assert_eq!(plain.display(), "3");

        let map = RemoteObject {
            object_type: "object".to_string(),
            subtype: Some("map".to_string()),
            object_id: Some("obj:9".to_string()),
            description: Some("Map(2)".to_string()),
            ..Default::default()
        };
        assert!(map.is_expandable());
        assert!(map.is_collection());
        assert_eq!(map.display(), "Map(2)");
    }

    #[test]
    fn test_async_stack_trace_nesting() {
        let trace: StackTrace = serde_json::from_value(json!({
            "description": "setTimeout",
            "callFrames": [],
            "parent": {"description": "Promise.then", "callFrames": []}
        }))
        .unwrap();

        assert_eq!(trace.parent.unwrap().description.as_deref(), Some("Promise.then"));
    }
}
