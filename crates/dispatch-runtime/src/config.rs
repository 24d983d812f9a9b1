//! Engine Configuration
//!
//! Engines come from a TOML file or from environment variables:
//!
//! ```toml
//! [[engines]]
//! id = "ollama"
//! name = "Ollama"
//! kind = "ollama"
//! url = "http://localhost:11434"
//!
//! [[engines]]
//! id = "groq"
//! name = "Groq"
//! kind = "openai-compat"
//! url = "https://api.groq.com/openai/v1"
//! api_key = "gsk_..."
//! ```

use std::path::Path;

use dispatch_core::error::{DispatchError, Result};
use serde::{Deserialize, Serialize};

pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";
pub const DEFAULT_OPENAI_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Which adapter an engine uses
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EngineKind {
    Ollama,
    #[serde(rename = "openai")]
    OpenAi,
    Gemini,
    /// Any endpoint speaking the OpenAI chat-completions protocol
    #[serde(rename = "openai-compat")]
    OpenAiCompat,
}

impl EngineKind {
    pub fn default_url(self) -> Option<&'static str> {
        match self {
            Self::Ollama => Some(DEFAULT_OLLAMA_URL),
            Self::OpenAi => Some(DEFAULT_OPENAI_URL),
            Self::Gemini => Some(DEFAULT_GEMINI_URL),
            Self::OpenAiCompat => None,
        }
    }

    fn needs_api_key(self) -> bool {
        matches!(self, Self::OpenAi | Self::Gemini)
    }
}

/// One configured engine
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registry id, used as the model id prefix
    pub id: String,

    #[serde(default)]
    pub name: String,

    pub kind: EngineKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
}

impl EngineConfig {
    pub fn new(id: impl Into<String>, kind: EngineKind) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            kind,
            url: None,
            api_key: None,
        }
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// Configured URL, or the kind's default, without a trailing slash
    pub fn base_url(&self) -> Result<String> {
        self.url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .or_else(|| self.kind.default_url())
            .map(|u| u.trim().trim_end_matches('/').to_string())
            .ok_or_else(|| DispatchError::Config(format!("engine '{}' needs a url", self.id)))
    }

    pub fn api_key(&self) -> &str {
        self.api_key.as_deref().unwrap_or_default()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() || self.id.contains(':') {
            return Err(DispatchError::Config(format!(
                "engine id '{}' must be non-empty and contain no ':'",
                self.id
            )));
        }
        if self.kind.needs_api_key() && self.api_key().is_empty() {
            return Err(DispatchError::Config(format!(
                "engine '{}' needs an api_key",
                self.id
            )));
        }
        self.base_url().map(|_| ())
    }
}

/// All configured engines
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct EnginesConfig {
    #[serde(default)]
    pub engines: Vec<EngineConfig>,
}

impl EnginesConfig {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let mut config: Self =
            toml::from_str(s).map_err(|e| DispatchError::Config(format!("engines: {e}")))?;
        for engine in &mut config.engines {
            if engine.name.is_empty() {
                engine.name.clone_from(&engine.id);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            DispatchError::Config(format!("reading {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&contents)
    }

    /// Engines from `OLLAMA_URL`, `OPENAI_API_KEY` (+ `OPENAI_BASE_URL`) and
    /// `GEMINI_API_KEY`; unset variables mean no engine of that kind
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let var = |key: &str| var(key).filter(|v| !v.trim().is_empty());
        let mut engines = Vec::new();

        if let Some(url) = var("OLLAMA_URL") {
            engines.push(named(EngineConfig::new("ollama", EngineKind::Ollama).with_url(url), "Ollama"));
        }
        if let Some(key) = var("OPENAI_API_KEY") {
            let mut engine = EngineConfig::new("openai", EngineKind::OpenAi).with_api_key(key);
            engine.url = var("OPENAI_BASE_URL");
            engines.push(named(engine, "OpenAI"));
        }
        if let Some(key) = var("GEMINI_API_KEY") {
            engines.push(named(EngineConfig::new("gemini", EngineKind::Gemini).with_api_key(key), "Gemini"));
        }

        Self { engines }
    }

    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for engine in &self.engines {
            engine.validate()?;
            if !seen.insert(engine.id.as_str()) {
                return Err(DispatchError::Config(format!("duplicate engine id '{}'", engine.id)));
            }
        }
        Ok(())
    }
}

fn named(mut engine: EngineConfig, name: &str) -> EngineConfig {
    engine.name = name.into();
    engine
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_from_toml() {
        let config = EnginesConfig::from_toml_str(
            r#"
            [[engines]]
            id = "ollama"
            kind = "ollama"

            [[engines]]
            id = "groq"
            name = "Groq"
            kind = "openai-compat"
            url = "https://api.groq.com/openai/v1/"
            api_key = "gsk"
            "#,
        )
        .unwrap();

        assert_eq!(config.engines.len(), 2);
        assert_eq!(config.engines[0].name, "ollama");
        assert_eq!(config.engines[0].base_url().unwrap(), DEFAULT_OLLAMA_URL);
        assert_eq!(config.engines[1].kind, EngineKind::OpenAiCompat);
        assert_eq!(config.engines[1].base_url().unwrap(), "https://api.groq.com/openai/v1");
    }

    #[test]
    fn test_invalid_configs() {
        let missing_key = "[[engines]]\nid = \"openai\"\nkind = \"openai\"\n";
        assert!(EnginesConfig::from_toml_str(missing_key).is_err());

        let compat_without_url = "[[engines]]\nid = \"local\"\nkind = \"openai-compat\"\n";
        assert!(EnginesConfig::from_toml_str(compat_without_url).is_err());

        let duplicate = "[[engines]]\nid = \"a\"\nkind = \"ollama\"\n[[engines]]\nid = \"a\"\nkind = \"ollama\"\n";
        assert!(EnginesConfig::from_toml_str(duplicate).is_err());

        let colon = "[[engines]]\nid = \"a:b\"\nkind = \"ollama\"\n";
        assert!(EnginesConfig::from_toml_str(colon).is_err());
    }

    #[test]
    fn test_from_vars() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OLLAMA_URL", "http://gpu-box:11434"),
            ("GEMINI_API_KEY", "g-key"),
            ("OPENAI_API_KEY", " "),
        ]);
        let config = EnginesConfig::from_vars(|k| vars.get(k).map(|v| (*v).to_string()));

        let ids: Vec<&str> = config.engines.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["ollama", "gemini"]);
        assert_eq!(config.engines[0].base_url().unwrap(), "http://gpu-box:11434");
        assert_eq!(config.engines[1].api_key(), "g-key");
        config.validate().unwrap();
    }
}
