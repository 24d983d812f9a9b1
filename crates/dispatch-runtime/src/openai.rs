//! OpenAI Engine
//!
//! `Client` implementation for the OpenAI chat-completions API. The same
//! adapter serves any OpenAI-compatible endpoint (Groq, vLLM, LM Studio...);
//! only the official API has its model list filtered.

use async_trait::async_trait;
use dispatch_core::{
    error::{DispatchError, Result},
    history::{answered_call_ids, assign_missing_ids, call_for_result},
    message::{Message, Role, ToolCall},
    postprocess::split_thought,
    provider::{CHAT_TIMEOUT, ChatOptions, Client, Model},
    tool::Tool,
};
use reqwest::RequestBuilder;
use serde_json::{Value, json};

use crate::config::{DEFAULT_OPENAI_URL, EngineConfig, EngineKind};
use crate::http;

/// Models offered from the official API
pub const SUPPORTED_MODELS: &[&str] = &["gpt-4o", "o4-mini", "gpt-4.5-preview", "gpt-4.1", "gpt-4.1-mini"];

/// OpenAI (or compatible) engine adapter
pub struct OpenAiClient {
    engine_id: String,
    base_url: String,
    api_key: String,
    /// Restrict `models` to [`SUPPORTED_MODELS`]
    filter_models: bool,
    http: reqwest::Client,
}

impl OpenAiClient {
    pub fn new(
        engine_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            engine_id: engine_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            filter_models: true,
            http: http::client()?,
        })
    }

    /// Official API with the given key
    pub fn official(api_key: impl Into<String>) -> Result<Self> {
        Self::new("openai", DEFAULT_OPENAI_URL, api_key)
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut client = Self::new(&config.id, config.base_url()?, config.api_key())?;
        client.filter_models = config.kind == EngineKind::OpenAi;
        Ok(client)
    }

    fn get(&self, path: &str) -> RequestBuilder {
        self.authorized(self.http.get(format!("{}{path}", self.base_url)))
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        if self.api_key.is_empty() {
            request
        } else {
            request.bearer_auth(&self.api_key)
        }
    }
}

/// Canonical history to chat-completions messages
///
/// Calls no tool message answers are left out; the API rejects them.
pub fn wire_messages(history: &[Message]) -> Vec<Value> {
    let answered = answered_call_ids(history);
    history
        .iter()
        .enumerate()
        .filter_map(|(index, m)| match m.role {
            Role::Assistant if m.has_tool_calls() => {
                let calls: Vec<Value> = m
                    .tool_calls
                    .iter()
                    .filter(|c| answered.contains(c.id.as_str()))
                    .map(|c| {
                        json!({
                            "id": c.id,
                            "type": "function",
                            "function": {
                                "name": c.function.name,
                                "arguments": Value::Object(c.function.arguments.clone()).to_string(),
                            },
                        })
                    })
                    .collect();
                if calls.is_empty() {
                    return (!m.content.is_empty()).then(|| json!({"role": "assistant", "content": m.content}));
                }
                let content = if m.content.is_empty() { Value::Null } else { json!(m.content) };
                Some(json!({"role": "assistant", "content": content, "tool_calls": calls}))
            }
            Role::Tool => {
                let id = m
                    .tool_call_id
                    .clone()
                    .filter(|id| !id.is_empty())
                    .or_else(|| call_for_result(history, index).map(|c| c.id.clone()))
                    .unwrap_or_default();
                Some(json!({"role": "tool", "tool_call_id": id, "content": m.content}))
            }
            role => Some(json!({"role": role.to_string(), "content": m.content})),
        })
        .collect()
}

/// Reasoning models (o1, o3, o4-mini...) only take the default temperature
fn accepts_temperature(model: &str) -> bool {
    let mut chars = model.chars();
    !(chars.next() == Some('o') && chars.next().is_some_and(|c| c.is_ascii_digit()))
}

/// Full `/chat/completions` request body
///
/// The context window has no chat-completions counterpart and is dropped.
pub fn chat_request(model: &str, history: &[Message], tools: &[Tool], options: &ChatOptions) -> Value {
    let mut body = json!({
        "model": model,
        "messages": wire_messages(history),
    });
    if let Some(temperature) = options.temperature.filter(|_| accepts_temperature(model)) {
        body["temperature"] = json!(temperature);
    }
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    body
}

/// Canonical assistant message from a chat-completions response
pub fn parse_chat_response(engine: &str, body: &Value) -> Result<Message> {
    let message = body["choices"]
        .get(0)
        .map(|choice| &choice["message"])
        .ok_or_else(|| DispatchError::decode(engine, "response has no choices"))?;

    let raw = match &message["content"] {
        Value::Null => "",
        other => http::str_field(engine, other, "choices[0].message.content")?,
    };

    let mut calls = Vec::new();
    for wire in message["tool_calls"].as_array().into_iter().flatten() {
        let name = http::str_field(engine, &wire["function"]["name"], "tool_calls.function.name")?;
        let arguments = http::parse_arguments(engine, &wire["function"]["arguments"])?;
        let mut call = ToolCall::new(name, arguments);
        if let Some(id) = wire["id"].as_str() {
            call.id = id.to_string();
        }
        calls.push(call);
    }
    assign_missing_ids(&mut calls);

    let (thought, content) = split_thought(raw);
    let mut reply = Message::assistant(content).with_tool_calls(calls);
    reply.thought = thought;
    Ok(reply)
}

/// One entry of a `/models` listing
pub fn parse_model(engine: &str, body: &Value) -> Option<Model> {
    let id = body["id"].as_str()?;
    let name = id.strip_prefix("models/").unwrap_or(id);
    let mut model = Model::new(engine, name).with_tools(true);
    model.metadata = json!({"owned_by": body["owned_by"], "created": body["created"]});
    Some(model)
}

#[async_trait]
impl Client for OpenAiClient {
    async fn chat(
        &self,
        model: &str,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message> {
        let body = chat_request(model, history, tools, options);
        tracing::debug!(engine = %self.engine_id, model, messages = history.len(), tools = tools.len(), "openai chat");

        let request = self.authorized(
            self.http
                .post(format!("{}/chat/completions", self.base_url))
                .json(&body),
        );
        let response = http::send_json(&self.engine_id, request, CHAT_TIMEOUT).await?;

        parse_chat_response(&self.engine_id, &response)
    }

    async fn models(&self) -> Result<Vec<Model>> {
        let body = http::send_json(&self.engine_id, self.get("/models"), CHAT_TIMEOUT).await?;

        let mut models: Vec<Model> = body["data"]
            .as_array()
            .ok_or_else(|| DispatchError::decode(&self.engine_id, "missing data"))?
            .iter()
            .filter_map(|m| parse_model(&self.engine_id, m))
            .filter(|m| !self.filter_models || SUPPORTED_MODELS.contains(&m.name.as_str()))
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn info(&self, name: &str) -> Result<Model> {
        let body = http::send_json(
            &self.engine_id,
            self.get(&format!("/models/{name}")),
            CHAT_TIMEOUT,
        )
        .await?;
        parse_model(&self.engine_id, &body)
            .ok_or_else(|| DispatchError::decode(&self.engine_id, format!("no model id for '{name}'")))
    }

    async fn connected(&self) -> bool {
        http::probe(self.get("/models")).await
    }
}
