//! Ollama Engine
//!
//! `Client` implementation for a local or remote Ollama server, speaking the
//! native `/api/chat` protocol so tool calls survive the round trip.

use async_trait::async_trait;
use dispatch_core::{
    error::{DispatchError, Result},
    history::assign_missing_ids,
    message::{Message, Role, ToolCall},
    postprocess::{split_thought, trim_wrapping},
    provider::{CHAT_TIMEOUT, ChatOptions, Client, Model},
    tool::Tool,
};
use futures::future::join_all;
use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_OLLAMA_URL, EngineConfig};
use crate::http;

/// Ollama engine adapter
pub struct OllamaClient {
    engine_id: String,
    base_url: String,
    http: reqwest::Client,
}

impl OllamaClient {
    pub fn new(engine_id: impl Into<String>, base_url: impl Into<String>) -> Result<Self> {
        Ok(Self {
            engine_id: engine_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http: http::client()?,
        })
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(&config.id, config.base_url()?)
    }

    /// Ollama on the default local port
    pub fn localhost() -> Result<Self> {
        Self::new("ollama", DEFAULT_OLLAMA_URL)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

/// Canonical history to Ollama chat messages
pub fn wire_messages(history: &[Message]) -> Vec<Value> {
    history
        .iter()
        .map(|m| {
            let mut wire = json!({
                "role": m.role.to_string(),
                "content": m.content,
            });
            if m.role == Role::Assistant && m.has_tool_calls() {
                wire["tool_calls"] = m
                    .tool_calls
                    .iter()
                    .map(|c| json!({"function": {"name": c.function.name, "arguments": c.function.arguments}}))
                    .collect();
            }
            if m.role == Role::Tool && !m.name.is_empty() {
                wire["tool_name"] = json!(m.name);
            }
            wire
        })
        .collect()
}

/// Full `/api/chat` request body
pub fn chat_request(model: &str, history: &[Message], tools: &[Tool], options: &ChatOptions) -> Value {
    let mut opts = Map::new();
    if let Some(temperature) = options.temperature {
        opts.insert("temperature".into(), json!(temperature));
    }
    if let Some(window) = options.context_window {
        opts.insert("num_ctx".into(), json!(window));
    }

    let mut body = json!({
        "model": model,
        "messages": wire_messages(history),
        "stream": false,
        "options": opts,
    });
    if !tools.is_empty() {
        body["tools"] = json!(tools);
    }
    body
}

/// Canonical assistant message from an `/api/chat` response
pub fn parse_chat_response(engine: &str, body: &Value) -> Result<Message> {
    let message = &body["message"];
    let raw = http::str_field(engine, &message["content"], "message.content")?;

    let mut calls = Vec::new();
    if let Some(wire_calls) = message["tool_calls"].as_array() {
        for wire in wire_calls {
            let name = http::str_field(engine, &wire["function"]["name"], "tool_calls.function.name")?;
            let arguments = http::parse_arguments(engine, &wire["function"]["arguments"])?;
            let mut call = ToolCall::new(name, arguments);
            if let Some(id) = wire["id"].as_str() {
                call.id = id.to_string();
            }
            calls.push(call);
        }
    }
    assign_missing_ids(&mut calls);

    let (thought, content) = split_thought(trim_wrapping(raw));
    let mut reply = Message::assistant(content).with_tool_calls(calls);
    reply.thought = thought;
    Ok(reply)
}

/// Model metadata from an `/api/show` response
pub fn parse_show_response(engine: &str, name: &str, body: &Value) -> Model {
    let supports_tools = body["capabilities"]
        .as_array()
        .is_some_and(|caps| caps.iter().any(|c| c.as_str() == Some("tools")));

    let context_length = body["model_info"].as_object().and_then(|info| {
        info.iter()
            .find(|(key, _)| key.ends_with(".context_length"))
            .and_then(|(_, v)| v.as_u64())
            .and_then(|v| u32::try_from(v).ok())
    });

    let mut model = Model::new(engine, name).with_tools(supports_tools);
    model.context_length = context_length;
    model.metadata = json!({
        "details": body["details"],
        "capabilities": body["capabilities"],
    });
    model
}

#[async_trait]
impl Client for OllamaClient {
    async fn chat(
        &self,
        model: &str,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message> {
        let body = chat_request(model, history, tools, options);
        tracing::debug!(engine = %self.engine_id, model, messages = history.len(), tools = tools.len(), "ollama chat");

        let response = http::send_json(
            &self.engine_id,
            self.http.post(self.url("/api/chat")).json(&body),
            CHAT_TIMEOUT,
        )
        .await?;

        parse_chat_response(&self.engine_id, &response)
    }

    async fn models(&self) -> Result<Vec<Model>> {
        let tags = http::send_json(
            &self.engine_id,
            self.http.get(self.url("/api/tags")),
            CHAT_TIMEOUT,
        )
        .await?;

        let names: Vec<String> = tags["models"]
            .as_array()
            .ok_or_else(|| DispatchError::decode(&self.engine_id, "missing models"))?
            .iter()
            .filter_map(|m| m["name"].as_str().or_else(|| m["model"].as_str()))
            .map(str::to_string)
            .collect();

        let infos = join_all(names.iter().map(|name| self.info(name))).await;

        let mut models = Vec::with_capacity(infos.len());
        for (name, info) in names.iter().zip(infos) {
            match info {
                Ok(model) => models.push(model),
                Err(e) => tracing::warn!(engine = %self.engine_id, model = %name, error = %e, "skipping model"),
            }
        }
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn info(&self, name: &str) -> Result<Model> {
        let body = http::send_json(
            &self.engine_id,
            self.http.post(self.url("/api/show")).json(&json!({"model": name})),
            CHAT_TIMEOUT,
        )
        .await?;
        Ok(parse_show_response(&self.engine_id, name, &body))
    }

    async fn connected(&self) -> bool {
        match http::origin(&self.base_url) {
            Ok(origin) => http::probe(self.http.get(origin)).await,
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::tool::Property;

    #[test]
    fn test_request_shape() {
        let history = vec![Message::system("sys"), Message::user("hi")];
        let body = chat_request("llama3.2", &history, &[], &ChatOptions { temperature: Some(0.5), context_window: Some(2048) });

        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_ctx"], 2048);
        assert_eq!(body["messages"][1], json!({"role": "user", "content": "hi"}));
        assert!(body.get("tools").is_none());

        let add = Tool::function("add", "Add").param("a", Property::new("number", ""), true);
        let body = chat_request("llama3.2", &history, &[add], &ChatOptions::default());
        assert_eq!(body["tools"][0]["function"]["name"], "add");
        assert_eq!(body["tools"][0]["function"]["parameters"]["required"], json!(["a"]));
    }

    #[test]
    fn test_tool_turns_on_the_wire() {
        let mut args = Map::new();
        args.insert("a".into(), json!(2));
        let history = vec![
            Message::tool_request("ollama:llama3.2", ToolCall::new("add", args).with_id("c1")),
            Message::tool_result("c1", "add", "5"),
        ];
        let wire = wire_messages(&history);

        assert_eq!(wire[0]["tool_calls"][0]["function"]["arguments"]["a"], 2);
        assert_eq!(wire[1]["role"], "tool");
        assert_eq!(wire[1]["tool_name"], "add");
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({"message": {"role": "assistant", "content": "\"Sure thing\"."}});
        let reply = parse_chat_response("ollama", &body).unwrap();
        assert_eq!(reply.content, "Sure thing");
        assert!(!reply.has_tool_calls());

        let body = json!({"message": {"content": "<think>sum it</think>", "tool_calls": [
            {"function": {"name": "add", "arguments": {"a": 2, "b": 3}}}
        ]}});
        let reply = parse_chat_response("ollama", &body).unwrap();
        assert!(reply.has_pending_tool_calls());
        assert_eq!(reply.thought.as_deref(), Some("sum it"));
        assert!(!reply.tool_calls[0].id.is_empty());

        assert!(parse_chat_response("ollama", &json!({"done": true})).is_err());
    }

    #[test]
    fn test_echo_round_trip() {
        for original in [
            Message::assistant("Hello there"),
            Message::assistant("").with_tool_calls(vec![ToolCall::new("add", Map::new())]),
        ] {
            let wire = wire_messages(std::slice::from_ref(&original)).remove(0);
            let echoed = parse_chat_response("ollama", &json!({"message": wire})).unwrap();
            assert_eq!(echoed.role, original.role);
            assert_eq!(echoed.content, original.content);
            assert!(echoed.tool_calls.iter().all(|c| !c.id.is_empty()));
        }
    }

    #[test]
    fn test_parse_show_response() {
        let body = json!({
            "capabilities": ["completion", "tools"],
            "model_info": {"llama.context_length": 131072, "general.architecture": "llama"},
            "details": {"family": "llama"},
        });
        let model = parse_show_response("ollama", "llama3.2:latest", &body);
        assert_eq!(model.id, "ollama:llama3.2:latest");
        assert!(model.supports_tools);
        assert_eq!(model.context_length, Some(131_072));
        assert_eq!(model.metadata["details"]["family"], "llama");

        let plain = parse_show_response("ollama", "phi", &json!({"capabilities": ["completion"]}));
        assert!(!plain.supports_tools);
        assert_eq!(plain.context_length, None);
    }
}
