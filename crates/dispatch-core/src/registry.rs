//! Engine Registry
//!
//! Maps model ids to the engine adapter that owns them. A registry is an
//! immutable value: reconfiguring an engine or re-enumerating models builds a
//! new registry that callers swap in.

use futures::future::join_all;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::error::{DispatchError, Result};
use crate::provider::{Client, Model};

/// A configured engine and its cached models
#[derive(Clone)]
pub struct Engine {
    pub id: String,
    pub name: String,
    pub client: Arc<dyn Client>,
    pub models: Vec<Model>,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("models", &self.models.len())
            .finish_non_exhaustive()
    }
}

/// The adapter and model a model id resolved to
#[derive(Clone)]
pub struct Resolved {
    pub client: Arc<dyn Client>,
    pub model: Model,
}

impl std::fmt::Debug for Resolved {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolved")
            .field("model", &self.model.id)
            .finish_non_exhaustive()
    }
}

/// Connectivity of one engine, for status display
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EngineStatus {
    pub id: String,
    pub name: String,
    pub connected: bool,
    pub models: usize,
}

#[derive(Clone, Debug, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Engine>,
}

impl EngineRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an engine with an already known model list
    pub fn with_engine(
        mut self,
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn Client>,
        models: Vec<Model>,
    ) -> Self {
        let id = id.into();
        let models = normalize_models(&id, models);
        self.engines.insert(
            id.clone(),
            Engine {
                id,
                name: name.into(),
                client,
                models,
            },
        );
        self
    }

    /// Build a registry, enumerating each engine's models
    ///
    /// An engine whose enumeration fails is kept with no cached models.
    pub async fn sync(engines: Vec<(String, String, Arc<dyn Client>)>) -> Self {
        let listed = join_all(engines.into_iter().map(|(id, name, client)| async move {
            let models = match client.models().await {
                Ok(models) => models,
                Err(e) => {
                    tracing::warn!(engine = %id, error = %e, "model enumeration failed");
                    Vec::new()
                }
            };
            (id, name, client, models)
        }))
        .await;

        listed
            .into_iter()
            .fold(Self::new(), |registry, (id, name, client, models)| {
                registry.with_engine(id, name, client, models)
            })
    }

    /// A new registry with every engine's models enumerated again
    pub async fn refresh(&self) -> Self {
        let engines = self
            .engines
            .values()
            .map(|e| (e.id.clone(), e.name.clone(), e.client.clone()))
            .collect();
        Self::sync(engines).await
    }

    pub fn engine(&self, id: &str) -> Option<&Engine> {
        self.engines.get(id)
    }

    pub fn engines(&self) -> impl Iterator<Item = &Engine> {
        self.engines.values()
    }

    /// All cached models across engines
    pub fn models(&self) -> Vec<Model> {
        self.engines
            .values()
            .flat_map(|e| e.models.iter().cloned())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.engines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.engines.is_empty()
    }

    /// Resolve a model id to its adapter
    ///
    /// `engine:name` ids resolve by prefix. When the prefix is not a
    /// registered engine, `fallback_engine` owns the whole id. Pure lookup,
    /// no network I/O.
    pub fn resolve(&self, model_id: &str, fallback_engine: Option<&str>) -> Result<Resolved> {
        let (engine, name) = match model_id.split_once(':') {
            Some((prefix, rest)) if self.engines.contains_key(prefix) => {
                (&self.engines[prefix], rest)
            }
            _ => {
                let fallback = fallback_engine
                    .ok_or_else(|| DispatchError::UnknownEngine(model_id.to_string()))?;
                let engine = self
                    .engines
                    .get(fallback)
                    .ok_or_else(|| DispatchError::UnknownEngine(fallback.to_string()))?;
                (engine, model_id)
            }
        };

        let model = engine
            .models
            .iter()
            .find(|m| m.name == name)
            .cloned()
            .unwrap_or_else(|| {
                tracing::warn!(engine = %engine.id, model = %name, "model not in engine's list");
                Model::new(engine.id.clone(), name)
            });

        Ok(Resolved {
            client: engine.client.clone(),
            model,
        })
    }

    /// Probe every engine concurrently
    pub async fn status(&self) -> Vec<EngineStatus> {
        join_all(self.engines.values().map(|e| async move {
            EngineStatus {
                id: e.id.clone(),
                name: e.name.clone(),
                connected: e.client.connected().await,
                models: e.models.len(),
            }
        }))
        .await
    }
}

fn normalize_models(engine_id: &str, models: Vec<Model>) -> Vec<Model> {
    let mut models: Vec<Model> = models
        .into_iter()
        .map(|mut m| {
            m.engine_id = engine_id.to_string();
            m.id = format!("{engine_id}:{}", m.name);
            m
        })
        .collect();
    models.sort_by(|a, b| a.name.cmp(&b.name));
    models
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Message;
    use crate::provider::ChatOptions;
    use crate::tool::Tool;
    use async_trait::async_trait;

    struct Fixed {
        models: Vec<Model>,
        fail: bool,
    }

    #[async_trait]
    impl Client for Fixed {
        async fn chat(&self, _: &str, _: &[Message], _: &[Tool], _: &ChatOptions) -> Result<Message> {
            Ok(Message::assistant("ok"))
        }

        async fn models(&self) -> Result<Vec<Model>> {
            if self.fail {
                return Err(DispatchError::provider("fixed", "down"));
            }
            Ok(self.models.clone())
        }

        async fn info(&self, name: &str) -> Result<Model> {
            Ok(Model::new("fixed", name))
        }

        async fn connected(&self) -> bool {
            !self.fail
        }
    }

    fn registry() -> EngineRegistry {
        let ollama = Arc::new(Fixed {
            models: vec![Model::new("x", "llama3.2:latest").with_tools(true)],
            fail: false,
        });
        let openai = Arc::new(Fixed {
            models: vec![Model::new("x", "gpt-4o").with_tools(true)],
            fail: false,
        });
        EngineRegistry::new()
            .with_engine("ollama", "Ollama", ollama.clone(), ollama.models.clone())
            .with_engine("openai", "OpenAI", openai.clone(), openai.models.clone())
    }

    #[test]
    fn test_resolve_by_prefix() {
        let resolved = registry().resolve("ollama:llama3.2:latest", None).unwrap();
        assert_eq!(resolved.model.name, "llama3.2:latest");
        assert_eq!(resolved.model.id, "ollama:llama3.2:latest");
        assert!(resolved.model.supports_tools);
        assert!(format!("{resolved:?}").contains("ollama:llama3.2:latest"));
    }

    #[test]
    fn test_resolve_with_fallback_engine() {
        let resolved = registry().resolve("llama3.2:latest", Some("ollama")).unwrap();
        assert_eq!(resolved.model.engine_id, "ollama");
        assert_eq!(resolved.model.name, "llama3.2:latest");
    }

    #[test]
    fn test_resolve_unknown_engine() {
        let err = registry().resolve("anthropic:claude", None).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownEngine(_)));

        let err = registry().resolve("gpt-4o", Some("gemini")).unwrap_err();
        assert!(matches!(err, DispatchError::UnknownEngine(id) if id == "gemini"));
    }

    #[test]
    fn test_unlisted_model_has_no_tools() {
        let resolved = registry().resolve("openai:gpt-3.5-turbo", None).unwrap();
        assert!(!resolved.model.supports_tools);
    }

    #[tokio::test]
    async fn test_sync_keeps_engines_that_fail_to_enumerate() {
        let down: Arc<dyn Client> = Arc::new(Fixed { models: vec![], fail: true });
        let up: Arc<dyn Client> = Arc::new(Fixed {
            models: vec![Model::new("x", "b"), Model::new("x", "a")],
            fail: false,
        });
        let registry = EngineRegistry::sync(vec![
            ("down".into(), "Down".into(), down),
            ("up".into(), "Up".into(), up),
        ])
        .await;

        assert_eq!(registry.len(), 2);
        assert!(registry.engine("down").unwrap().models.is_empty());
        let names: Vec<_> = registry.engine("up").unwrap().models.iter().map(|m| m.id.clone()).collect();
        assert_eq!(names, vec!["up:a", "up:b"]);

        let status = registry.status().await;
        assert!(!status.iter().find(|s| s.id == "down").unwrap().connected);
    }
}
