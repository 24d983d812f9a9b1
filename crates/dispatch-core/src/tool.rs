//! Tool System
//!
//! Canonical tool definitions advertised to models, the tool execution
//! channel consumed by the dispatcher, and an in-process registry that
//! implements that channel.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use crate::session::SessionId;

/// One parameter of a tool's JSON schema
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Property {
    /// JSON Schema type (string, number, integer, boolean, array, object)
    #[serde(rename = "type")]
    pub kind: String,

    #[serde(default)]
    pub description: String,

    /// Anything else the schema carries (enum, items, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Property {
    pub fn new(kind: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            description: description.into(),
            extra: Map::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    #[serde(rename = "type", default = "object_type")]
    pub kind: String,

    #[serde(default)]
    pub required: Vec<String>,

    #[serde(default)]
    pub properties: BTreeMap<String, Property>,
}

fn object_type() -> String {
    "object".into()
}

impl Default for Parameters {
    fn default() -> Self {
        Self {
            kind: object_type(),
            required: Vec::new(),
            properties: BTreeMap::new(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct FunctionDefinition {
    pub name: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub parameters: Parameters,
}

/// Capability description advertised to the model
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Tool {
    #[serde(rename = "type", default = "function_type")]
    pub kind: String,

    pub function: FunctionDefinition,
}

fn function_type() -> String {
    "function".into()
}

impl Tool {
    pub fn function(name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: function_type(),
            function: FunctionDefinition {
                name: name.into(),
                description: description.into(),
                parameters: Parameters::default(),
            },
        }
    }

    /// Add a parameter to the schema
    pub fn param(mut self, name: impl Into<String>, property: Property, required: bool) -> Self {
        let name = name.into();
        if required {
            self.function.parameters.required.push(name.clone());
        }
        self.function.parameters.properties.insert(name, property);
        self
    }

    pub fn name(&self) -> &str {
        &self.function.name
    }
}

/// Tool execution channel
///
/// Anything that can list the tools a session may use and run one by name:
/// an MCP bridge, a remote tool service, or the local [`ToolRegistry`].
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    /// Tools available to a session
    async fn tools(&self, session_id: &SessionId) -> anyhow::Result<Vec<Tool>>;

    /// Run a tool; may block for as long as the tool needs
    async fn execute(
        &self,
        session_id: &SessionId,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> anyhow::Result<String>;
}

/// In-process tool implementation
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Definition advertised to models
    fn definition(&self) -> Tool;

    async fn call(&self, arguments: &Map<String, Value>) -> anyhow::Result<String>;

    /// Check required arguments before calling
    fn validate(&self, arguments: &Map<String, Value>) -> anyhow::Result<()> {
        let definition = self.definition();
        for name in &definition.function.parameters.required {
            if !arguments.contains_key(name) {
                anyhow::bail!("missing required parameter: {name}");
            }
        }
        Ok(())
    }
}

/// Registry of in-process tools, usable as a [`ToolExecutor`]
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn ToolHandler>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: ToolHandler + 'static>(&mut self, tool: T) {
        self.register_arc(Arc::new(tool));
    }

    pub fn register_arc(&mut self, tool: Arc<dyn ToolHandler>) {
        let name = tool.definition().function.name;
        self.tools.insert(name, tool);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ToolHandler>> {
        self.tools.get(name).cloned()
    }

    /// Definitions sorted by name
    pub fn definitions(&self) -> Vec<Tool> {
        let mut defs: Vec<Tool> = self.tools.values().map(|t| t.definition()).collect();
        defs.sort_by(|a, b| a.function.name.cmp(&b.function.name));
        defs
    }

    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.tools.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

#[async_trait]
impl ToolExecutor for ToolRegistry {
    async fn tools(&self, _session_id: &SessionId) -> anyhow::Result<Vec<Tool>> {
        Ok(self.definitions())
    }

    async fn execute(
        &self,
        _session_id: &SessionId,
        name: &str,
        arguments: &Map<String, Value>,
    ) -> anyhow::Result<String> {
        let tool = self
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("tool not found: {name}"))?;

        tool.validate(arguments)?;
        tool.call(arguments).await
    }
}
