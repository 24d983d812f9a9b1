//! Tool-call bookkeeping over a message history
//!
//! Keeps tool-call ids unique and non-empty, and pairs tool results with the
//! calls they answer for providers that correlate by name or order.

use std::collections::HashSet;

use uuid::Uuid;

use crate::message::{Message, Role, ToolCall};

pub fn new_tool_call_id() -> String {
    Uuid::new_v4().to_string()
}

/// Give every call without an id a fresh one
pub fn assign_missing_ids(calls: &mut [ToolCall]) {
    for call in calls.iter_mut().filter(|c| c.id.is_empty()) {
        call.id = new_tool_call_id();
    }
}

/// Make the ids of one turn non-empty and unique
///
/// Empty ids get a fresh id. An id that repeats within the turn, or that was
/// already used earlier in `history`, falls back to its position in the turn:
/// `<id>-<index>`.
pub fn ensure_tool_call_ids(calls: &mut [ToolCall], history: &[Message]) {
    let mut seen: HashSet<String> = history
        .iter()
        .flat_map(|m| m.tool_calls.iter().map(|c| c.id.clone()))
        .filter(|id| !id.is_empty())
        .collect();

    for (index, call) in calls.iter_mut().enumerate() {
        if call.id.is_empty() {
            call.id = new_tool_call_id();
        }
        if seen.contains(&call.id) {
            let positional = format!("{}-{index}", call.id);
            tracing::debug!(id = %call.id, %positional, "duplicate tool call id");
            call.id = if seen.contains(&positional) {
                new_tool_call_id()
            } else {
                positional
            };
        }
        seen.insert(call.id.clone());
    }
}

/// Find the call a tool-role message answers
///
/// Uses the explicit `tool_call_id` when set; otherwise the most recent call
/// before `index` that no earlier tool message has answered.
pub fn call_for_result(history: &[Message], index: usize) -> Option<&ToolCall> {
    let result = history.get(index)?;
    let earlier = &history[..index];

    if let Some(id) = result.tool_call_id.as_deref().filter(|id| !id.is_empty()) {
        return earlier
            .iter()
            .rev()
            .flat_map(|m| m.tool_calls.iter())
            .find(|c| c.id == id);
    }

    let mut answered: HashSet<&str> = HashSet::new();
    for (pos, message) in earlier.iter().enumerate() {
        if message.role != Role::Tool {
            continue;
        }
        match message.tool_call_id.as_deref() {
            Some(id) => {
                answered.insert(id);
            }
            // Legacy results answer the call message right before them
            None => {
                if let Some(call) = pos
                    .checked_sub(1)
                    .and_then(|p| earlier[p].tool_calls.first())
                {
                    answered.insert(call.id.as_str());
                }
            }
        }
    }

    earlier
        .iter()
        .rev()
        .flat_map(|m| m.tool_calls.iter().rev())
        .find(|c| !answered.contains(c.id.as_str()))
}

/// Repair histories written before tool calls always carried ids
///
/// Calls without an id get one, and the tool message that follows a call
/// message is linked to the call's id. Returns how many messages changed.
pub fn backfill_tool_call_ids(messages: &mut [Message]) -> usize {
    let mut changed = 0;

    for index in 0..messages.len() {
        if messages[index].tool_calls.is_empty() {
            continue;
        }

        let mut touched = false;
        for call in &mut messages[index].tool_calls {
            if call.id.is_empty() {
                call.id = new_tool_call_id();
                touched = true;
            }
        }
        if touched {
            changed += 1;
        }

        let id = messages[index].tool_calls[0].id.clone();
        if let Some(next) = messages.get_mut(index + 1) {
            if next.role == Role::Tool && next.tool_call_id.as_deref() != Some(id.as_str()) {
                next.tool_call_id = Some(id);
                changed += 1;
            }
        }
    }

    changed
}

/// Ids of every call some tool message in `history` answers
pub fn answered_call_ids(history: &[Message]) -> HashSet<&str> {
    history
        .iter()
        .enumerate()
        .filter(|(_, m)| m.role == Role::Tool)
        .filter_map(|(index, _)| call_for_result(history, index))
        .map(|call| call.id.as_str())
        .collect()
}

/// The call of a trailing assistant turn that no tool message answered yet
///
/// Left behind when a tool failed mid-dispatch.
pub fn dangling_call(history: &[Message]) -> Option<&ToolCall> {
    history
        .last()
        .filter(|m| m.role == Role::Assistant && m.has_pending_tool_calls())
        .and_then(|m| m.tool_calls.first())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;

    fn call(name: &str, id: &str) -> ToolCall {
        ToolCall::new(name, Map::new()).with_id(id)
    }

    #[test]
    fn test_empty_ids_are_synthesized() {
        let mut calls = vec![call("add", ""), call("sub", "")];
        ensure_tool_call_ids(&mut calls, &[]);
        assert!(calls.iter().all(|c| !c.id.is_empty()));
        assert_ne!(calls[0].id, calls[1].id);
    }

    #[test]
    fn test_duplicate_ids_fall_back_to_position() {
        let mut calls = vec![call("add", "call_0"), call("add", "call_0")];
        ensure_tool_call_ids(&mut calls, &[]);
        assert_eq!(calls[0].id, "call_0");
        assert_eq!(calls[1].id, "call_0-1");
    }

    #[test]
    fn test_ids_reused_from_history_are_replaced() {
        let history = vec![Message::tool_request("m", call("add", "call_0"))];
        let mut calls = vec![call("add", "call_0")];
        ensure_tool_call_ids(&mut calls, &history);
        assert_eq!(calls[0].id, "call_0-0");
    }

    #[test]
    fn test_call_for_result_by_id() {
        let history = vec![
            Message::tool_request("m", call("add", "a")),
            Message::tool_result("a", "add", "4"),
            Message::tool_request("m", call("mul", "b")),
            Message::tool_result("b", "mul", "6"),
        ];
        assert_eq!(call_for_result(&history, 1).unwrap().function.name, "add");
        assert_eq!(call_for_result(&history, 3).unwrap().function.name, "mul");
    }

    #[test]
    fn test_call_for_result_without_id_uses_latest_unanswered() {
        let mut orphan = Message::tool_result("", "", "6");
        orphan.tool_call_id = None;
        let history = vec![
            Message::tool_request("m", call("add", "a")),
            Message::tool_result("a", "add", "4"),
            Message::tool_request("m", call("mul", "b")),
            orphan,
        ];
        assert_eq!(call_for_result(&history, 3).unwrap().function.name, "mul");
    }

    #[test]
    fn test_answered_and_dangling_calls() {
        let history = vec![
            Message::user("2+2?"),
            Message::tool_request("m", call("add", "a")),
            Message::tool_result("a", "add", "4"),
            Message::tool_request("m", call("add", "b")),
        ];

        let answered = answered_call_ids(&history);
        assert!(answered.contains("a"));
        assert!(!answered.contains("b"));
        assert_eq!(dangling_call(&history).unwrap().id, "b");
        assert!(dangling_call(&history[..3]).is_none());
    }

    #[test]
    fn test_backfill_links_results() {
        let mut result = Message::tool_result("", "add", "4");
        result.tool_call_id = None;
        let mut messages = vec![
            Message::user("2+2?"),
            Message::tool_request("m", call("add", "")),
            result,
            Message::assistant("4"),
        ];

        let changed = backfill_tool_call_ids(&mut messages);
        assert_eq!(changed, 2);
        let id = messages[1].tool_calls[0].id.clone();
        assert!(!id.is_empty());
        assert_eq!(messages[2].tool_call_id.as_deref(), Some(id.as_str()));

        assert_eq!(backfill_tool_call_ids(&mut messages), 0);
    }
}
