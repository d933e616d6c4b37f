// Inspector event handling
//
// Events are pushed by the inspector endpoint to report script loads,
// pauses and console output. Transport lifecycle changes (connected /
// disconnected) are folded into the same stream so consumers observe one
// ordered sequence of notifications.

use crate::types::{ConsoleMessage, PausedEvent, ScriptParsedEvent};
use serde_json::Value;
use tracing::warn;

/// One notification out of the inspector connection.
#[derive(Debug, Clone)]
pub enum InspectorEvent {
    /// The transport established its connection.
    Connected,
    /// The transport dropped, with the causing error when there was one.
    Disconnected { error: Option<String> },
    ScriptParsed(ScriptParsedEvent),
    ScriptFailedToParse(ScriptParsedEvent),
    Paused(PausedEvent),
    Resumed,
    ConsoleMessageAdded(ConsoleMessage),
}

/// Decode a protocol notification into an `InspectorEvent`.
///
/// Unknown methods return `None`; they are logged and dropped rather than
/// failing the stream, since the endpoint may speak a newer protocol
/// revision than this client.
pub fn parse_event(method: &str, params: Value) -> Option<InspectorEvent> {
    let event = match method {
        "Debugger.scriptParsed" => {
            InspectorEvent::ScriptParsed(decode(method, params)?)
        }
        "Debugger.scriptFailedToParse" => {
            InspectorEvent::ScriptFailedToParse(decode(method, params)?)
        }
        "Debugger.paused" => InspectorEvent::Paused(decode(method, params)?),
        "Debugger.resumed" => InspectorEvent::Resumed,
        "Console.messageAdded" => {
            // The payload nests the message under a `message` key.
            let message = params.get("message").cloned().unwrap_or(params);
            InspectorEvent::ConsoleMessageAdded(decode(method, message)?)
        }
        _ => {
            warn!("Unsupported inspector event: {}", method);
            return None;
        }
    };

    Some(event)
}

fn decode<T: serde::de::DeserializeOwned>(method: &str, params: Value) -> Option<T> {
    match serde_json::from_value(params) {
        Ok(decoded) => Some(decoded),
        Err(e) => {
            warn!("Failed to decode {} payload: {}", method, e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_script_parsed() {
        let event = parse_event(
            "Debugger.scriptParsed",
            json!({"scriptId": "3", "url": "file:///app/main.js", "startLine": 0, "endLine": 120}),
        )
        .unwrap();

        match event {
            InspectorEvent::ScriptParsed(script) => {
                assert_eq!(script.script_id, "3");
                assert_eq!(script.url, "file:///app/main.js");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_paused_with_breakpoint_data() {
        let event = parse_event(
            "Debugger.paused",
            json!({
                "callFrames": [],
                "reason": "Breakpoint",
                "data": {"breakpointId": "bp:42"}
            }),
        )
        .unwrap();

        match event {
            InspectorEvent::Paused(paused) => {
                assert_eq!(paused.reason, "Breakpoint");
                assert_eq!(paused.data.unwrap()["breakpointId"], "bp:42");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_console_message_nested() {
        let event = parse_event(
            "Console.messageAdded",
            json!({"message": {"level": "error", "text": "boom"}}),
        )
        .unwrap();

        match event {
            InspectorEvent::ConsoleMessageAdded(message) => {
                assert_eq!(message.level, "error");
                assert_eq!(message.text, "boom");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_parse_unknown_method() {
        assert!(parse_event("Heap.garbageCollected", json!({})).is_none());
    }
}
