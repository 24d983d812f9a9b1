//! # dispatch-runtime
//!
//! Engine adapters for the dispatch system.
//!
//! ## Engines
//!
//! - **Ollama**: local inference over the native `/api/chat` protocol
//! - **OpenAI**: chat completions, also used for any OpenAI-compatible server
//! - **Gemini**: Google Generative Language `generateContent`
//!
//! ## Usage
//!
//! ```rust,ignore
//! use dispatch_runtime::{EnginesConfig, build_registry};
//!
//! let config = EnginesConfig::load("engines.toml")?;
//! let registry = build_registry(&config).await;
//! let dispatcher = DispatcherBuilder::new()
//!     .registry(Arc::new(registry))
//!     .store(store)
//!     .tools(tools)
//!     .build()?;
//! ```

pub mod config;
pub mod factory;
pub mod http;

#[cfg(feature = "gemini")]
pub mod gemini;
#[cfg(feature = "ollama")]
pub mod ollama;
#[cfg(feature = "openai")]
pub mod openai;

pub use config::{EngineConfig, EngineKind, EnginesConfig};
pub use factory::{build_client, build_registry};

#[cfg(feature = "gemini")]
pub use gemini::GeminiClient;
#[cfg(feature = "ollama")]
pub use ollama::OllamaClient;
#[cfg(feature = "openai")]
pub use openai::OpenAiClient;

// Re-export core types for convenience
pub use dispatch_core::{
    Client, DispatchError, Dispatcher, EngineRegistry, Message, Model, Result, Role, Session,
    Tool, ToolRegistry,
};
