//! Gemini Engine
//!
//! `Client` implementation for the Google Generative Language API
//! (`generateContent`). Gemini has no system role and correlates function
//! responses by name, so translation happens over the whole history.

use async_trait::async_trait;
use dispatch_core::{
    error::{DispatchError, Result},
    history::{answered_call_ids, assign_missing_ids, call_for_result},
    message::{Message, Role, ToolCall},
    postprocess::split_thought,
    provider::{CHAT_TIMEOUT, ChatOptions, Client, Model},
    tool::{Property, Tool},
};
use reqwest::RequestBuilder;
use serde_json::{Map, Value, json};

use crate::config::{DEFAULT_GEMINI_URL, EngineConfig};
use crate::http;

/// Models offered from the API
pub const AVAILABLE_MODELS: &[&str] = &[
    "gemini-2.5-pro-exp-03-25",
    "gemini-2.0-flash",
    "gemini-2.0-flash-lite",
    "gemini-2.5-flash-preview-05-20",
    "gemini-2.5-pro-preview-05-06",
    "gemini-1.5-pro",
];

/// Gemini engine adapter
pub struct GeminiClient {
    engine_id: String,
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

impl GeminiClient {
    pub fn new(
        engine_id: impl Into<String>,
        base_url: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            engine_id: engine_id.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            http: http::client()?,
        })
    }

    pub fn with_api_key(api_key: impl Into<String>) -> Result<Self> {
        Self::new("gemini", DEFAULT_GEMINI_URL, api_key)
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(&config.id, config.base_url()?, config.api_key())
    }

    fn request(&self, method: reqwest::Method, path: &str) -> RequestBuilder {
        self.http
            .request(method, format!("{}{path}", self.base_url))
            .header("x-goog-api-key", &self.api_key)
    }
}

/// Canonical history to `contents`, plus the hoisted system instruction
pub fn wire_contents(history: &[Message]) -> (Option<Value>, Vec<Value>) {
    let system: Vec<&str> = history
        .iter()
        .filter(|m| m.role == Role::System && !m.content.is_empty())
        .map(|m| m.content.as_str())
        .collect();
    let instruction = (!system.is_empty()).then(|| json!({"parts": [{"text": system.join("\n\n")}]}));

    let answered = answered_call_ids(history);
    let mut contents = Vec::new();
    for (index, m) in history.iter().enumerate() {
        match m.role {
            Role::System => {}
            Role::User => contents.push(json!({"role": "user", "parts": [{"text": m.content}]})),
            Role::Assistant => {
                if let Some(call) = m.tool_calls.first().filter(|_| m.content.is_empty()) {
                    // one call per turn; a call nobody answered is rejected by the API
                    if !answered.contains(call.id.as_str()) {
                        continue;
                    }
                    contents.push(json!({"role": "model", "parts": [{"functionCall": {
                        "id": call.id,
                        "name": call.function.name,
                        "args": call.function.arguments,
                    }}]}));
                } else if !m.content.is_empty() {
                    contents.push(json!({"role": "model", "parts": [{"text": m.content}]}));
                }
            }
            Role::Tool => {
                let call = call_for_result(history, index);
                let name = call.map_or(m.name.as_str(), |c| c.function.name.as_str());
                let mut response = json!({"name": name, "response": {"result": m.content}});
                if let Some(call) = call {
                    response["id"] = json!(call.id);
                }
                contents.push(json!({"role": "user", "parts": [{"functionResponse": response}]}));
            }
        }
    }

    (instruction, contents)
}

/// JSON Schema type names to Gemini's `Type` enum
fn schema_type(kind: &str) -> &'static str {
    match kind.to_ascii_lowercase().as_str() {
        "number" => "NUMBER",
        "integer" => "INTEGER",
        "boolean" => "BOOLEAN",
        "array" => "ARRAY",
        "object" => "OBJECT",
        _ => "STRING",
    }
}

/// Rewrite every `type` in a JSON Schema fragment to Gemini's enum, keeping the rest
fn recode_schema(schema: &mut Value) {
    let Some(object) = schema.as_object_mut() else {
        return;
    };
    if let Some(kind) = object.get("type").and_then(Value::as_str) {
        let kind = schema_type(kind);
        object.insert("type".into(), json!(kind));
    }
    if let Some(items) = object.get_mut("items") {
        recode_schema(items);
    }
    if let Some(properties) = object.get_mut("properties").and_then(Value::as_object_mut) {
        properties.values_mut().for_each(recode_schema);
    }
}

fn property_schema(property: &Property) -> Value {
    let mut schema = property.extra.clone();
    schema.insert("type".into(), json!(property.kind));
    if !property.description.is_empty() {
        schema.insert("description".into(), json!(property.description));
    }
    let mut schema = Value::Object(schema);
    recode_schema(&mut schema);
    schema
}

/// Canonical tools to one `functionDeclarations` entry
pub fn wire_tools(tools: &[Tool]) -> Value {
    let declarations: Vec<Value> = tools
        .iter()
        .map(|tool| {
            let f = &tool.function;
            let mut declaration = json!({"name": f.name, "description": f.description});
            if !f.parameters.properties.is_empty() {
                let properties: Map<String, Value> = f
                    .parameters
                    .properties
                    .iter()
                    .map(|(name, p)| (name.clone(), property_schema(p)))
                    .collect();
                declaration["parameters"] = json!({
                    "type": "OBJECT",
                    "properties": properties,
                    "required": f.parameters.required,
                });
            }
            declaration
        })
        .collect();
    json!([{"functionDeclarations": declarations}])
}

/// Full `generateContent` request body
///
/// The context window is not a request option for Gemini and is dropped.
pub fn chat_request(history: &[Message], tools: &[Tool], options: &ChatOptions) -> Value {
    let (instruction, contents) = wire_contents(history);

    let mut body = json!({"contents": contents});
    if let Some(instruction) = instruction {
        body["systemInstruction"] = instruction;
    }
    if let Some(temperature) = options.temperature {
        body["generationConfig"] = json!({"temperature": temperature});
    }
    if !tools.is_empty() {
        body["tools"] = wire_tools(tools);
    }
    body
}

/// Canonical assistant message from a `generateContent` response
pub fn parse_chat_response(engine: &str, body: &Value) -> Result<Message> {
    let Some(candidate) = body["candidates"].get(0) else {
        let reason = body["promptFeedback"]["blockReason"].as_str().unwrap_or("no candidates");
        return Err(DispatchError::decode(engine, format!("empty response: {reason}")));
    };

    let mut text = String::new();
    let mut calls = Vec::new();
    for part in candidate["content"]["parts"].as_array().into_iter().flatten() {
        if let Some(t) = part["text"].as_str() {
            text.push_str(t);
        }
        let call = &part["functionCall"];
        if call.is_object() {
            let name = http::str_field(engine, &call["name"], "functionCall.name")?;
            let arguments = http::parse_arguments(engine, &call["args"])?;
            let mut tool_call = ToolCall::new(name, arguments);
            if let Some(id) = call["id"].as_str() {
                tool_call.id = id.to_string();
            }
            calls.push(tool_call);
        }
    }
    assign_missing_ids(&mut calls);

    let (thought, content) = split_thought(&text);
    let mut reply = Message::assistant(content).with_tool_calls(calls);
    reply.thought = thought;
    Ok(reply)
}

/// One entry of a `/models` listing
pub fn parse_model(engine: &str, body: &Value) -> Option<Model> {
    let id = body["name"].as_str()?;
    let name = id.strip_prefix("models/").unwrap_or(id);

    let mut model = Model::new(engine, name).with_tools(true);
    model.context_length = body["inputTokenLimit"].as_u64().and_then(|v| u32::try_from(v).ok());
    model.metadata = json!({
        "displayName": body["displayName"],
        "description": body["description"],
        "outputTokenLimit": body["outputTokenLimit"],
    });
    Some(model)
}

#[async_trait]
impl Client for GeminiClient {
    async fn chat(
        &self,
        model: &str,
        history: &[Message],
        tools: &[Tool],
        options: &ChatOptions,
    ) -> Result<Message> {
        let body = chat_request(history, tools, options);
        tracing::debug!(engine = %self.engine_id, model, messages = history.len(), tools = tools.len(), "gemini chat");

        let request = self
            .request(reqwest::Method::POST, &format!("/models/{model}:generateContent"))
            .json(&body);
        let response = http::send_json(&self.engine_id, request, CHAT_TIMEOUT).await?;

        parse_chat_response(&self.engine_id, &response)
    }

    async fn models(&self) -> Result<Vec<Model>> {
        let body = http::send_json(
            &self.engine_id,
            self.request(reqwest::Method::GET, "/models"),
            CHAT_TIMEOUT,
        )
        .await?;

        let mut models: Vec<Model> = body["models"]
            .as_array()
            .ok_or_else(|| DispatchError::decode(&self.engine_id, "missing models"))?
            .iter()
            .filter_map(|m| parse_model(&self.engine_id, m))
            .filter(|m| AVAILABLE_MODELS.contains(&m.name.as_str()))
            .collect();
        models.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(models)
    }

    async fn info(&self, name: &str) -> Result<Model> {
        let body = http::send_json(
            &self.engine_id,
            self.request(reqwest::Method::GET, &format!("/models/{name}")),
            CHAT_TIMEOUT,
        )
        .await?;
        parse_model(&self.engine_id, &body)
            .ok_or_else(|| DispatchError::decode(&self.engine_id, format!("no model name for '{name}'")))
    }

    async fn connected(&self) -> bool {
        http::probe(self.request(reqwest::Method::GET, "/models")).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add_call(id: &str) -> ToolCall {
        let mut args = Map::new();
        args.insert("a".into(), json!(2));
        args.insert("b".into(), json!(3));
        ToolCall::new("add", args).with_id(id)
    }

    #[test]
    fn test_system_messages_are_hoisted() {
        let history = vec![
            Message::system("be brief"),
            Message::user("hi"),
            Message::system("answer in French"),
        ];
        let (instruction, contents) = wire_contents(&history);

        assert_eq!(instruction.unwrap()["parts"][0]["text"], "be brief\n\nanswer in French");
        assert_eq!(contents.len(), 1);
        assert_eq!(contents[0]["role"], "user");
    }

    #[test]
    fn test_function_turns_on_the_wire() {
        let mut legacy = Message::new(Role::Tool, "5");
        legacy.name = "add".into();
        let history = vec![
            Message::user("add"),
            Message::tool_request("gemini:gemini-2.0-flash", add_call("c1")),
            legacy,
            Message::assistant(""),
            Message::assistant("It is 5"),
        ];
        let (_, contents) = wire_contents(&history);

        assert_eq!(contents.len(), 4);
        assert_eq!(contents[1]["role"], "model");
        assert_eq!(contents[1]["parts"][0]["functionCall"]["args"]["b"], 3);
        assert_eq!(contents[2]["role"], "user");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["name"], "add");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["id"], "c1");
        assert_eq!(contents[2]["parts"][0]["functionResponse"]["response"]["result"], "5");
        assert_eq!(contents[3]["parts"][0]["text"], "It is 5");
    }

    #[test]
    fn test_tools_and_temperature_together() {
        let add = Tool::function("add", "Add two numbers")
            .param("a", Property::new("number", "first"), true)
            .param("b", Property::new("integer", "second"), true);
        let now = Tool::function("datetime", "Current time");
        let body = chat_request(&[Message::user("hi")], &[add, now], &ChatOptions { temperature: Some(0.4), context_window: None });

        let declarations = &body["tools"][0]["functionDeclarations"];
        assert_eq!(declarations[0]["parameters"]["properties"]["a"]["type"], "NUMBER");
        assert_eq!(declarations[0]["parameters"]["properties"]["b"]["type"], "INTEGER");
        assert!(declarations[1].get("parameters").is_none());
        assert!(body["generationConfig"]["temperature"].is_number());
        assert!(body.get("systemInstruction").is_none());
    }

    #[test]
    fn test_unanswered_call_is_left_out() {
        let history = vec![
            Message::user("add"),
            Message::tool_request("gemini:gemini-2.0-flash", add_call("c1")),
            Message::user("never mind"),
        ];
        let (_, contents) = wire_contents(&history);

        assert_eq!(contents.len(), 2);
        assert!(contents.iter().all(|c| c["role"] == "user"));
        assert_eq!(contents[1]["parts"][0]["text"], "never mind");
    }

    #[test]
    fn test_nested_schemas_keep_their_shape() {
        let mut tags = Property::new("array", "labels to attach");
        tags.extra.insert("items".into(), json!({"type": "string", "enum": ["red", "blue"]}));
        let mut unit = Property::new("string", "");
        unit.extra.insert("enum".into(), json!(["c", "f"]));
        let tool = Tool::function("tag", "Tag things")
            .param("tags", tags, true)
            .param("unit", unit, false);

        let declarations = wire_tools(&[tool]);
        let properties = &declarations[0]["functionDeclarations"][0]["parameters"]["properties"];
        assert_eq!(properties["tags"]["type"], "ARRAY");
        assert_eq!(properties["tags"]["description"], "labels to attach");
        assert_eq!(properties["tags"]["items"]["type"], "STRING");
        assert_eq!(properties["tags"]["items"]["enum"], json!(["red", "blue"]));
        assert_eq!(properties["unit"]["enum"], json!(["c", "f"]));
        assert!(properties["unit"].get("description").is_none());
    }

    #[test]
    fn test_parse_chat_response() {
        let body = json!({"candidates": [{"content": {"role": "model", "parts": [
            {"text": "<think>need a sum</think>"},
            {"functionCall": {"name": "add", "args": {"a": 2, "b": 3}}}
        ]}}]});
        let reply = parse_chat_response("gemini", &body).unwrap();
        assert!(reply.has_pending_tool_calls());
        assert_eq!(reply.thought.as_deref(), Some("need a sum"));
        assert!(!reply.tool_calls[0].id.is_empty());

        let blocked = json!({"promptFeedback": {"blockReason": "SAFETY"}});
        let err = parse_chat_response("gemini", &blocked).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn test_echo_round_trip() {
        for original in [
            Message::assistant("Hello there"),
            Message::assistant("").with_tool_calls(vec![ToolCall::new("add", Map::new()).with_id("c1")]),
        ] {
            let history = [original.clone(), Message::tool_result("c1", "add", "5")];
            let (_, mut contents) = wire_contents(&history);
            let body = json!({"candidates": [{"content": contents.remove(0)}]});
            let echoed = parse_chat_response("gemini", &body).unwrap();
            assert_eq!(echoed.role, original.role);
            assert_eq!(echoed.content, original.content);
            assert_eq!(echoed.tool_calls.len(), original.tool_calls.len());
            assert!(echoed.tool_calls.iter().all(|c| !c.id.is_empty()));
        }
    }

    #[test]
    fn test_parse_model() {
        let model = parse_model("gemini", &json!({"name": "models/gemini-2.0-flash", "inputTokenLimit": 1_048_576})).unwrap();
        assert_eq!(model.id, "gemini:gemini-2.0-flash");
        assert_eq!(model.context_length, Some(1_048_576));
    }
}
