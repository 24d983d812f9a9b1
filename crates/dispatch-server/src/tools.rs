//! Built-in tools

use async_trait::async_trait;
use dispatch_core::tool::{Property, Tool, ToolHandler};
use serde_json::{Map, Value, json};

/// Current date and time
pub struct DateTimeTool;

#[async_trait]
impl ToolHandler for DateTimeTool {
    fn definition(&self) -> Tool {
        let mut format = Property::new("string", "Output format: 'iso', 'human', or 'unix'");
        format.extra.insert("enum".into(), json!(["iso", "human", "unix"]));
        Tool::function("datetime", "Get the current date and time (UTC)").param("format", format, false)
    }

    async fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<String> {
        let now = chrono::Utc::now();
        let output = match arguments.get("format").and_then(Value::as_str).unwrap_or("human") {
            "iso" => now.to_rfc3339(),
            "unix" => now.timestamp().to_string(),
            "human" => now.format("%A, %B %d, %Y at %H:%M:%S UTC").to_string(),
            other => anyhow::bail!("unknown format '{other}'"),
        };
        Ok(output)
    }
}

/// Sum of two numbers
pub struct AddTool;

#[async_trait]
impl ToolHandler for AddTool {
    fn definition(&self) -> Tool {
        Tool::function("add", "Add two numbers")
            .param("a", Property::new("number", "First number"), true)
            .param("b", Property::new("number", "Second number"), true)
    }

    async fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<String> {
        let a = number(arguments, "a")?;
        let b = number(arguments, "b")?;

        if let (Some(a), Some(b)) = (a.as_i64(), b.as_i64()) {
            if let Some(sum) = a.checked_add(b) {
                return Ok(sum.to_string());
            }
        }
        let sum = a.as_f64().unwrap_or_default() + b.as_f64().unwrap_or_default();
        Ok(sum.to_string())
    }
}

/// Numeric argument; models sometimes send numbers as strings
fn number(arguments: &Map<String, Value>, name: &str) -> anyhow::Result<serde_json::Number> {
    match arguments.get(name) {
        Some(Value::Number(n)) => Ok(n.clone()),
        Some(Value::String(s)) => serde_json::from_str::<serde_json::Number>(s.trim())
            .map_err(|_| anyhow::anyhow!("'{name}' is not a number: {s}")),
        Some(other) => anyhow::bail!("'{name}' is not a number: {other}"),
        None => anyhow::bail!("missing required parameter: {name}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dispatch_core::{SessionId, ToolExecutor, ToolRegistry};

    fn args(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_add() {
        assert_eq!(AddTool.call(&args(json!({"a": 2, "b": 3}))).await.unwrap(), "5");
        assert_eq!(AddTool.call(&args(json!({"a": "2", "b": 3}))).await.unwrap(), "5");
        assert_eq!(AddTool.call(&args(json!({"a": 1.5, "b": 2}))).await.unwrap(), "3.5");
        assert!(AddTool.call(&args(json!({"a": true, "b": 1}))).await.is_err());
    }

    #[tokio::test]
    async fn test_datetime_formats() {
        let unix = DateTimeTool.call(&args(json!({"format": "unix"}))).await.unwrap();
        assert!(unix.parse::<i64>().is_ok());
        assert!(DateTimeTool.call(&Map::new()).await.unwrap().ends_with("UTC"));
        assert!(DateTimeTool.call(&args(json!({"format": "mayan"}))).await.is_err());
    }

    #[tokio::test]
    async fn test_registry_validates_required_args() {
        let mut registry = ToolRegistry::new();
        registry.register(AddTool);
        registry.register(DateTimeTool);
        assert_eq!(registry.names(), vec!["add", "datetime"]);

        let session = SessionId::new();
        let err = registry.execute(&session, "add", &args(json!({"a": 1}))).await.unwrap_err();
        assert!(err.to_string().contains("missing required parameter: b"));
    }
}
