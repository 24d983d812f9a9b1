//! Conversation Messages
//!
//! Canonical message format shared by every engine adapter. Adapters translate
//! to and from their wire shapes at the boundary; nothing past the adapter
//! knows which provider produced a message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::session::SessionId;

/// Role of a message sender
///
/// Provider-specific aliases (`developer`, `model`, `function`) are folded
/// into the four canonical roles when deserializing.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// System prompt/instructions
    #[serde(alias = "developer")]
    System,
    /// User input
    User,
    /// Model response
    #[serde(alias = "model")]
    Assistant,
    /// Tool result
    #[serde(alias = "function")]
    Tool,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::System => write!(f, "system"),
            Role::User => write!(f, "user"),
            Role::Assistant => write!(f, "assistant"),
            Role::Tool => write!(f, "tool"),
        }
    }
}

/// Function invocation carried by a [`ToolCall`]
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct FunctionCall {
    pub name: String,

    /// Whatever the model produced; not validated here
    #[serde(default)]
    pub arguments: Map<String, Value>,
}

/// A single function invocation requested by a model
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    /// Opaque identifier. Empty until the dispatcher synthesizes one.
    #[serde(default)]
    pub id: String,

    pub function: FunctionCall,
}

impl ToolCall {
    pub fn new(name: impl Into<String>, arguments: Map<String, Value>) -> Self {
        Self {
            id: String::new(),
            function: FunctionCall {
                name: name.into(),
                arguments,
            },
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }
}

/// A single message in a conversation
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Message {
    /// Store-assigned identity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    pub role: Role,

    #[serde(default)]
    pub content: String,

    /// Reasoning split out of a `<think>` segment
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thought: Option<String>,

    /// Model that produced this message (empty for non-assistant roles)
    #[serde(default)]
    pub model: String,

    #[serde(default)]
    pub name: String,

    #[serde(default)]
    pub tool_calls: Vec<ToolCall>,

    /// Back-link from a tool-role message to the call it answers
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,

    #[serde(default = "Utc::now")]
    pub created: DateTime<Utc>,
}

impl Message {
    /// Create a new message
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            id: None,
            session_id: None,
            role,
            content: content.into(),
            thought: None,
            model: String::new(),
            name: String::new(),
            tool_calls: Vec::new(),
            tool_call_id: None,
            created: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    /// Assistant turn that carries exactly one tool call and no text
    pub fn tool_request(model: impl Into<String>, call: ToolCall) -> Self {
        let mut msg = Self::new(Role::Assistant, "");
        msg.model = model.into();
        msg.tool_calls = vec![call];
        msg
    }

    /// Tool result answering the call with `tool_call_id`
    pub fn tool_result(
        tool_call_id: impl Into<String>,
        name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        let mut msg = Self::new(Role::Tool, content);
        msg.name = name.into();
        msg.tool_call_id = Some(tool_call_id.into());
        msg
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_tool_calls(mut self, calls: Vec<ToolCall>) -> Self {
        self.tool_calls = calls;
        self
    }

    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }

    /// An assistant turn that only asks for tools
    pub fn has_pending_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty() && self.content.is_empty()
    }
}
