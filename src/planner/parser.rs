//! Messages API rendering and parsing
//!
//! Renders a `Conversation` as Anthropic Messages API content blocks and parses
//! a response body into a `PlannerOutput`.

use std::collections::HashSet;

use serde_json::{Map, Value, json};

use crate::domain::{Conversation, ConversationTurn, ToolInvocation};
use crate::id::generate_invocation_id;

use super::client::{PlannerError, PlannerOutput};

/// Render the conversation as a `messages` array
///
/// The task is the first user message. Planner turns become assistant messages
/// with `tool_use` blocks; result turns become user messages of `tool_result`
/// blocks.
pub fn render_messages(conversation: &Conversation) -> Vec<Value> {
    let mut messages = vec![json!({ "role": "user", "content": conversation.task })];

    for turn in conversation.turns() {
        match turn {
            ConversationTurn::Planner(p) => {
                let mut blocks = Vec::new();
                if !p.raw.is_empty() {
                    blocks.push(json!({ "type": "text", "text": p.raw }));
                }
                for inv in &p.invocations {
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": inv.invocation_id,
                        "name": inv.tool_name,
                        "input": inv.arguments,
                    }));
                }
                if blocks.is_empty() {
                    blocks.push(json!({ "type": "text", "text": "(no output)" }));
                }
                messages.push(json!({ "role": "assistant", "content": blocks }));
            }
            ConversationTurn::ToolResults(r) => {
                let blocks: Vec<Value> = r
                    .results
                    .iter()
                    .map(|res| {
                        json!({
                            "type": "tool_result",
                            "tool_use_id": res.invocation_id,
                            "content": res.content_text(),
                            "is_error": !res.is_success(),
                        })
                    })
                    .collect();
                messages.push(json!({ "role": "user", "content": blocks }));
            }
        }
    }

    messages
}

/// Parse a Messages API response body
///
/// Tool-use ids become invocation ids. A blank id, or one already used in the
/// conversation or earlier in this reply, is replaced with a generated id.
pub fn parse_response(body: &Value, conversation: &Conversation) -> Result<PlannerOutput, PlannerError> {
    let blocks = body
        .get("content")
        .and_then(|c| c.as_array())
        .ok_or_else(|| PlannerError::InvalidResponse("response has no content array".to_string()))?;

    let iteration = conversation.planner_turns() as u32;
    let mut text = String::new();
    let mut invocations = Vec::new();
    let mut used: HashSet<String> = HashSet::new();

    for block in blocks {
        match block.get("type").and_then(|t| t.as_str()) {
            Some("text") => {
                if let Some(t) = block.get("text").and_then(|t| t.as_str()) {
                    if !text.is_empty() {
                        text.push('\n');
                    }
                    text.push_str(t);
                }
            }
            Some("tool_use") => {
                let mut inv = parse_tool_use_block(block)?;
                if inv.invocation_id.trim().is_empty()
                    || used.contains(&inv.invocation_id)
                    || conversation.has_invocation_id(&inv.invocation_id)
                {
                    inv.invocation_id = generate_invocation_id(iteration, invocations.len());
                }
                used.insert(inv.invocation_id.clone());
                invocations.push(inv);
            }
            _ => {}
        }
    }

    Ok(PlannerOutput::invocations(text, invocations))
}

fn parse_tool_use_block(block: &Value) -> Result<ToolInvocation, PlannerError> {
    let name = block
        .get("name")
        .and_then(|v| v.as_str())
        .filter(|n| !n.is_empty())
        .ok_or_else(|| PlannerError::InvalidResponse("tool_use block without a name".to_string()))?;
    let id = block.get("id").and_then(|v| v.as_str()).unwrap_or_default();

    let arguments = match block.get("input") {
        None | Some(Value::Null) => Map::new(),
        Some(Value::Object(map)) => map.clone(),
        Some(other) => {
            return Err(PlannerError::InvalidResponse(format!(
                "tool_use input for '{}' is not an object: {}",
                name, other
            )));
        }
    };

    Ok(ToolInvocation::new(id, name).with_arguments(arguments))
}

/// Stop reason string, if present
pub fn stop_reason(body: &Value) -> Option<&str> {
    body.get("stop_reason").and_then(|s| s.as_str())
}
