//! Session Management
//!
//! Sessions own the message log a dispatch appends to. Storage itself lives
//! behind [`SessionStore`]; [`MemorySessionStore`] is the in-process version.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::error::{DispatchError, Result};
use crate::history::backfill_tool_call_ids;
use crate::message::{Message, Role};

/// Generic context for the model
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant.";

/// The first message a user sees in a chat
pub const WELCOME_PROMPT: &str = "Hey there, what's on your mind?";

/// Summary before the model has been asked for one
pub const DEFAULT_SUMMARY: &str = "Untitled";

/// Unique session identifier
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Dispatch-relevant session configuration
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Model id, usually `engine:name`
    #[serde(default)]
    pub model: String,

    /// Engine that owns `model` when the id carries no engine prefix
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub engine_id: Option<String>,

    #[serde(default = "default_context_window")]
    pub context_window: u32,

    #[serde(default = "default_temperature")]
    pub temperature: f64,

    /// Names of tools the model may call in this session
    #[serde(default)]
    pub enabled_tools: Vec<String>,
}

const fn default_context_window() -> u32 {
    4096
}

const fn default_temperature() -> f64 {
    0.8
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            model: String::new(),
            engine_id: None,
            context_window: default_context_window(),
            temperature: default_temperature(),
            enabled_tools: Vec::new(),
        }
    }
}

impl SessionConfig {
    pub fn is_tool_enabled(&self, name: &str) -> bool {
        self.enabled_tools.iter().any(|t| t == name)
    }
}

/// A chat session
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,

    /// Owning application; dispatching without one is a data bug
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_id: Option<u64>,

    #[serde(default = "default_summary")]
    pub summary: String,

    #[serde(default)]
    pub config: SessionConfig,

    /// Ephemeral sessions skip the welcome message
    #[serde(default)]
    pub ephemeral: bool,

    pub created: DateTime<Utc>,
    pub modified: DateTime<Utc>,
}

fn default_summary() -> String {
    DEFAULT_SUMMARY.into()
}

impl Session {
    pub fn new(app_id: Option<u64>, config: SessionConfig) -> Self {
        let now = Utc::now();
        Self {
            id: SessionId::new(),
            app_id,
            summary: default_summary(),
            config,
            ephemeral: false,
            created: now,
            modified: now,
        }
    }

    pub fn ephemeral(mut self) -> Self {
        self.ephemeral = true;
        self
    }

    /// Messages every new session starts with
    pub fn opening_messages(&self, custom_system_prompt: Option<&str>) -> Vec<Message> {
        let prompt = custom_system_prompt
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(SYSTEM_PROMPT);

        let mut messages = vec![Message::system(prompt)];
        if !self.ephemeral {
            messages.push(Message::assistant(WELCOME_PROMPT));
        }
        messages
    }

    pub fn touch(&mut self) {
        self.modified = Utc::now();
    }
}

/// Append-only message log with session-scoped configuration
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn session(&self, id: &SessionId) -> Result<Option<Session>>;

    /// Messages of a session, oldest first
    async fn messages(&self, id: &SessionId) -> Result<Vec<Message>>;

    /// Append a message; returns it with identity assigned
    async fn add_message(&self, id: &SessionId, message: Message) -> Result<Message>;

    async fn set_summary(&self, id: &SessionId, summary: &str) -> Result<()>;
}

#[derive(Default)]
struct MemoryState {
    sessions: HashMap<SessionId, Session>,
    messages: HashMap<SessionId, Vec<Message>>,
    next_message_id: u64,
}

/// In-memory session store (for development/testing)
#[derive(Default)]
pub struct MemorySessionStore {
    state: RwLock<MemoryState>,
    custom_system_prompt: Option<String>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use a custom system prompt for new sessions
    pub fn with_system_prompt(prompt: impl Into<String>) -> Self {
        Self {
            custom_system_prompt: Some(prompt.into()),
            ..Self::default()
        }
    }

    /// Store a new session and append its opening messages
    pub async fn create(&self, session: Session) -> Result<Session> {
        let opening = session.opening_messages(self.custom_system_prompt.as_deref());
        {
            let mut state = self.state.write().await;
            state.sessions.insert(session.id.clone(), session.clone());
            state.messages.insert(session.id.clone(), Vec::new());
        }
        for message in opening {
            self.add_message(&session.id, message).await?;
        }
        Ok(session)
    }

    /// Store a session as-is, with no opening messages
    pub async fn insert(&self, session: Session) {
        let mut state = self.state.write().await;
        state.messages.entry(session.id.clone()).or_default();
        state.sessions.insert(session.id.clone(), session);
    }

    /// Load a previously saved session and its history
    ///
    /// Tool calls saved without ids are repaired on the way in. Returns how
    /// many messages were repaired.
    pub async fn import(&self, session: Session, mut messages: Vec<Message>) -> Result<usize> {
        let repaired = backfill_tool_call_ids(&mut messages);
        if repaired > 0 {
            tracing::info!(session = %session.id, repaired, "backfilled tool call ids");
        }

        let id = session.id.clone();
        self.insert(session).await;
        for message in messages {
            self.add_message(&id, message).await?;
        }
        Ok(repaired)
    }

    pub async fn list(&self) -> Vec<Session> {
        let state = self.state.read().await;
        let mut sessions: Vec<Session> = state.sessions.values().cloned().collect();
        sessions.sort_by(|a, b| b.modified.cmp(&a.modified));
        sessions
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn session(&self, id: &SessionId) -> Result<Option<Session>> {
        Ok(self.state.read().await.sessions.get(id).cloned())
    }

    async fn messages(&self, id: &SessionId) -> Result<Vec<Message>> {
        let state = self.state.read().await;
        state
            .messages
            .get(id)
            .cloned()
            .ok_or_else(|| DispatchError::SessionNotFound(id.clone()))
    }

    async fn add_message(&self, id: &SessionId, mut message: Message) -> Result<Message> {
        let mut state = self.state.write().await;
        let model = state
            .sessions
            .get(id)
            .map(|s| s.config.model.clone())
            .ok_or_else(|| DispatchError::SessionNotFound(id.clone()))?;

        state.next_message_id += 1;
        message.id = Some(state.next_message_id);
        message.session_id = Some(id.clone());
        if message.role == Role::Assistant && message.model.is_empty() {
            message.model = model;
        }

        if let Some(session) = state.sessions.get_mut(id) {
            session.touch();
        }
        state
            .messages
            .entry(id.clone())
            .or_default()
            .push(message.clone());

        Ok(message)
    }

    async fn set_summary(&self, id: &SessionId, summary: &str) -> Result<()> {
        let mut state = self.state.write().await;
        let session = state
            .sessions
            .get_mut(id)
            .ok_or_else(|| DispatchError::SessionNotFound(id.clone()))?;
        session.summary = summary.to_string();
        session.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::ToolCall;

    #[tokio::test]
    async fn test_create_appends_opening_messages() {
        let store = MemorySessionStore::new();
        let session = store
            .create(Session::new(Some(1), SessionConfig::default()))
            .await
            .unwrap();

        let messages = store.messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].role, Role::System);
        assert_eq!(messages[0].content, SYSTEM_PROMPT);
        assert_eq!(messages[1].content, WELCOME_PROMPT);
        assert_eq!(session.summary, DEFAULT_SUMMARY);
    }

    #[tokio::test]
    async fn test_ephemeral_session_skips_welcome() {
        let store = MemorySessionStore::with_system_prompt("  Be terse.  ");
        let session = store
            .create(Session::new(Some(1), SessionConfig::default()).ephemeral())
            .await
            .unwrap();

        let messages = store.messages(&session.id).await.unwrap();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].content, "Be terse.");
    }

    #[tokio::test]
    async fn test_import_backfills_tool_call_ids() {
        let store = MemorySessionStore::new();
        let session = Session::new(Some(1), SessionConfig::default());

        let mut legacy_result = Message::new(Role::Tool, "4");
        legacy_result.name = "add".into();
        let history = vec![
            Message::user("2+2?"),
            Message::tool_request("ollama:llama3.2", ToolCall::new("add", serde_json::Map::new())),
            legacy_result,
            Message::assistant("4"),
        ];

        let repaired = store.import(session.clone(), history).await.unwrap();
        assert_eq!(repaired, 2);

        let messages = store.messages(&session.id).await.unwrap();
        let id = &messages[1].tool_calls[0].id;
        assert!(!id.is_empty());
        assert_eq!(messages[2].tool_call_id.as_ref(), Some(id));
        assert!(messages.iter().all(|m| m.id.is_some()));
    }

    #[tokio::test]
    async fn test_add_message_assigns_identity() {
        let store = MemorySessionStore::new();
        let session = Session::new(Some(1), SessionConfig::default());
        store.insert(session.clone()).await;

        let first = store.add_message(&session.id, Message::user("a")).await.unwrap();
        let second = store.add_message(&session.id, Message::user("b")).await.unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));
        assert_eq!(second.session_id.as_ref(), Some(&session.id));

        let missing = store.add_message(&SessionId::new(), Message::user("c")).await;
        assert!(matches!(missing, Err(DispatchError::SessionNotFound(_))));
    }
}
