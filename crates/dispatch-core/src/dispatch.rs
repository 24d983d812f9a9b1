//! Dispatch Loop
//!
//! Sends a session's history to the engine that owns the requested model and
//! drives tool calls until the model answers without one.
//!
//! ```text
//! AwaitingUserTurn -> InFlight -> (ToolRequested -> ToolExecuting -> InFlight)* -> Complete
//! ```
//!
//! Only the first tool call of a reply is executed per round trip; the model
//! sees the result and re-requests anything it still needs on the next turn.
//! That keeps every tool result in front of the model before the next call.

use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::history::{dangling_call, ensure_tool_call_ids};
use crate::message::{Message, ToolCall};
use crate::provider::ChatOptions;
use crate::registry::{EngineRegistry, Resolved};
use crate::session::{Session, SessionStore};
use crate::tool::{Tool, ToolExecutor};

/// Dispatcher configuration
#[derive(Clone, Debug)]
pub struct DispatchConfig {
    /// Maximum tool rounds before giving up
    pub max_tool_rounds: usize,
}

pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 25;

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            max_tool_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        }
    }
}

/// The orchestrator
///
/// Holds no per-session state or lock: callers must not run two dispatches
/// for the same session at once.
pub struct Dispatcher {
    registry: Arc<EngineRegistry>,
    store: Arc<dyn SessionStore>,
    tools: Arc<dyn ToolExecutor>,
    config: DispatchConfig,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<EngineRegistry>,
        store: Arc<dyn SessionStore>,
        tools: Arc<dyn ToolExecutor>,
        config: DispatchConfig,
    ) -> Self {
        Self {
            registry,
            store,
            tools,
            config,
        }
    }

    /// Run one user turn to completion
    ///
    /// Appends `prompt` as a user message when given, then loops until the
    /// model replies without tool calls. Every message is appended as it is
    /// produced; nothing is rolled back on error. Without a prompt, a call
    /// left unanswered by an earlier tool failure is run again first.
    pub async fn dispatch(
        &self,
        session: &Session,
        model: &str,
        prompt: Option<&str>,
    ) -> Result<Message> {
        let Resolved { client, model } = self
            .registry
            .resolve(model, session.config.engine_id.as_deref())
            .map_err(|_| DispatchError::MissingEngine(model.to_string()))?;

        if session.app_id.is_none() {
            return Err(DispatchError::MissingApp(session.id.clone()));
        }

        match prompt {
            Some(prompt) => {
                self.store
                    .add_message(&session.id, Message::user(prompt))
                    .await?;
            }
            None => {
                let history = self.store.messages(&session.id).await?;
                if let Some(call) = dangling_call(&history).cloned() {
                    tracing::info!(session = %session.id, tool = %call.function.name, id = %call.id, "resuming unanswered tool call");
                    self.run_tool(session, &call).await?;
                }
            }
        }

        let options = ChatOptions::from(&session.config);
        let tools = if model.supports_tools {
            self.session_tools(session).await?
        } else {
            Vec::new()
        };

        let mut rounds = 0;

        loop {
            let history = self.store.messages(&session.id).await?;

            tracing::debug!(
                session = %session.id,
                model = %model.id,
                messages = history.len(),
                tools = tools.len(),
                round = rounds,
                "dispatching"
            );

            let mut reply = client
                .chat(&model.name, &history, &tools, &options)
                .await?;
            reply.model.clone_from(&model.id);

            if !reply.has_tool_calls() {
                return self.store.add_message(&session.id, reply).await;
            }

            if rounds == self.config.max_tool_rounds {
                return Err(DispatchError::TooManyToolRounds(rounds));
            }
            rounds += 1;

            ensure_tool_call_ids(&mut reply.tool_calls, &history);
            if reply.tool_calls.len() > 1 {
                tracing::debug!(
                    requested = reply.tool_calls.len(),
                    "running first tool call only"
                );
            }
            let call = reply.tool_calls.remove(0);

            self.store
                .add_message(&session.id, Message::tool_request(&model.id, call.clone()))
                .await?;

            self.run_tool(session, &call).await?;
        }
    }

    /// Execute one call and append its result
    async fn run_tool(&self, session: &Session, call: &ToolCall) -> Result<()> {
        tracing::debug!(tool = %call.function.name, id = %call.id, "executing tool");

        let content = self
            .tools
            .execute(&session.id, &call.function.name, &call.function.arguments)
            .await
            .map_err(|e| DispatchError::ToolExecution {
                tool: call.function.name.clone(),
                message: format!("{e:#}"),
            })?;

        self.store
            .add_message(
                &session.id,
                Message::tool_result(&call.id, &call.function.name, content),
            )
            .await?;
        Ok(())
    }

    /// Tools the session has enabled
    async fn session_tools(&self, session: &Session) -> Result<Vec<Tool>> {
        let available =
            self.tools
                .tools(&session.id)
                .await
                .map_err(|e| DispatchError::ToolExecution {
                    tool: "*".into(),
                    message: format!("listing tools: {e:#}"),
                })?;

        Ok(available
            .into_iter()
            .filter(|t| session.config.is_tool_enabled(t.name()))
            .collect())
    }

    pub fn registry(&self) -> &EngineRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn SessionStore> {
        &self.store
    }

    pub fn config(&self) -> &DispatchConfig {
        &self.config
    }
}

/// Builder for [`Dispatcher`]
#[derive(Default)]
pub struct DispatcherBuilder {
    registry: Option<Arc<EngineRegistry>>,
    store: Option<Arc<dyn SessionStore>>,
    tools: Option<Arc<dyn ToolExecutor>>,
    config: DispatchConfig,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registry(mut self, registry: Arc<EngineRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn store(mut self, store: Arc<dyn SessionStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn tools(mut self, tools: Arc<dyn ToolExecutor>) -> Self {
        self.tools = Some(tools);
        self
    }

    pub fn max_tool_rounds(mut self, max: usize) -> Self {
        self.config.max_tool_rounds = max;
        self
    }

    pub fn build(self) -> Result<Dispatcher> {
        let registry = self
            .registry
            .ok_or_else(|| DispatchError::Config("engine registry is required".into()))?;
        let store = self
            .store
            .ok_or_else(|| DispatchError::Config("session store is required".into()))?;
        let tools = self
            .tools
            .ok_or_else(|| DispatchError::Config("tool executor is required".into()))?;

        Ok(Dispatcher::new(registry, store, tools, self.config))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemorySessionStore;
    use crate::tool::ToolRegistry;

    #[test]
    fn test_builder_requires_parts() {
        let err = DispatcherBuilder::new()
            .store(Arc::new(MemorySessionStore::new()))
            .tools(Arc::new(ToolRegistry::new()))
            .build()
            .err()
            .unwrap();
        assert!(matches!(err, DispatchError::Config(_)));

        let dispatcher = DispatcherBuilder::new()
            .registry(Arc::new(EngineRegistry::new()))
            .store(Arc::new(MemorySessionStore::new()))
            .tools(Arc::new(ToolRegistry::new()))
            .max_tool_rounds(3)
            .build()
            .unwrap();
        assert_eq!(dispatcher.config().max_tool_rounds, 3);
    }
}
