// SPDX-FileCopyrightText: 2026 Tokenscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transcript builders.

use serde_json::{Map, Value};
use tokenscope_core::{Message, Part, Role, TokenTelemetry, ToolState, ToolStatus};

pub fn message(role: Role, text: &str) -> Message {
    Message {
        role: Some(role),
        parts: vec![Part::Text {
            text: text.to_string(),
        }],
        ..Message::default()
    }
}

pub fn system(text: &str) -> Message {
    message(Role::System, text)
}

pub fn user(text: &str) -> Message {
    message(Role::User, text)
}

pub fn assistant(text: &str) -> Message {
    message(Role::Assistant, text)
}

/// Telemetry with every class present.
pub fn telemetry(input: u64, output: u64, cache_read: u64, cache_write: u64) -> TokenTelemetry {
    TokenTelemetry {
        input: Some(input),
        output: Some(output),
        reasoning: Some(0),
        cache_read: Some(cache_read),
        cache_write: Some(cache_write),
    }
}

/// Assistant message with usage, cost and model metadata.
pub fn assistant_call(
    text: &str,
    usage: TokenTelemetry,
    cost: f64,
    provider: &str,
    model: &str,
) -> Message {
    Message {
        telemetry: Some(usage),
        cost: Some(cost),
        provider_id: Some(provider.to_string()),
        model_id: Some(model.to_string()),
        ..assistant(text)
    }
}

pub fn reasoning(text: &str) -> Part {
    Part::Reasoning {
        text: text.to_string(),
    }
}

/// A tool part. `input` must be a JSON object; anything else yields no arguments.
pub fn tool_part(name: &str, status: ToolStatus, input: Value, output: Option<&str>) -> Part {
    let input = match input {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    Part::Tool {
        tool: name.to_string(),
        state: ToolState {
            status,
            input,
            output: output.map(str::to_string),
        },
    }
}

pub fn completed_tool(name: &str, input: Value, output: &str) -> Part {
    tool_part(name, ToolStatus::Completed, input, Some(output))
}

/// Assistant message carrying only the given parts.
pub fn assistant_parts(parts: Vec<Part>) -> Message {
    Message {
        role: Some(Role::Assistant),
        parts,
        ..Message::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn assistant_call_carries_metadata() {
        let msg = assistant_call("hi", telemetry(10, 5, 2, 0), 0.0001, "openai", "gpt-4o");
        assert_eq!(msg.text(), "hi");
        assert_eq!(msg.model_pair(), Some(("openai", "gpt-4o")));
        assert_eq!(msg.telemetry().cache_read(), 2);
    }

    #[test]
    fn non_object_tool_input_is_empty() {
        let Part::Tool { state, .. } = tool_part("bash", ToolStatus::Running, json!("ls"), None)
        else {
            panic!("expected a tool part");
        };
        assert!(state.input.is_empty());
    }
}
