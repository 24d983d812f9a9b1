//! Engine construction from configuration

use std::sync::Arc;

use dispatch_core::{
    error::{DispatchError, Result},
    provider::Client,
    registry::EngineRegistry,
};

use crate::config::{EngineConfig, EngineKind, EnginesConfig};

/// Build the adapter for one configured engine
pub fn build_client(config: &EngineConfig) -> Result<Arc<dyn Client>> {
    config.validate()?;

    match config.kind {
        #[cfg(feature = "ollama")]
        EngineKind::Ollama => Ok(Arc::new(crate::ollama::OllamaClient::from_config(config)?)),
        #[cfg(feature = "openai")]
        EngineKind::OpenAi | EngineKind::OpenAiCompat => {
            Ok(Arc::new(crate::openai::OpenAiClient::from_config(config)?))
        }
        #[cfg(feature = "gemini")]
        EngineKind::Gemini => Ok(Arc::new(crate::gemini::GeminiClient::from_config(config)?)),
        #[allow(unreachable_patterns)]
        kind => Err(DispatchError::Config(format!(
            "engine '{}': {kind:?} support is not compiled in",
            config.id
        ))),
    }
}

/// Build every configured engine and sync its model list
///
/// Engines that cannot be built are skipped with a warning; engines that are
/// built but unreachable stay registered with no models.
pub async fn build_registry(config: &EnginesConfig) -> EngineRegistry {
    let mut clients = Vec::with_capacity(config.engines.len());
    for engine in &config.engines {
        match build_client(engine) {
            Ok(client) => clients.push((engine.id.clone(), engine.name.clone(), client)),
            Err(e) => tracing::warn!(engine = %engine.id, error = %e, "skipping engine"),
        }
    }
    EngineRegistry::sync(clients).await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_client_validates() {
        let missing_key = EngineConfig::new("openai", EngineKind::OpenAi);
        assert!(build_client(&missing_key).is_err());

        let compat = EngineConfig::new("lmstudio", EngineKind::OpenAiCompat)
            .with_url("http://localhost:1234/v1");
        assert!(build_client(&compat).is_ok());
    }

    #[tokio::test]
    async fn test_empty_config_gives_empty_registry() {
        let registry = build_registry(&EnginesConfig::default()).await;
        assert!(registry.is_empty());
    }
}
