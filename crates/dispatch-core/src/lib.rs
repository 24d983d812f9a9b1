//! # dispatch-core
//!
//! Provider-agnostic chat dispatch with tool-call orchestration.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                        Dispatcher                             │
//! │  ┌─────────────┐  ┌──────────────┐  ┌──────────────────────┐  │
//! │  │  Dispatch   │  │    Engine    │  │   Client             │  │
//! │  │    Loop     │──│   Registry   │──│   (Strategy)         │  │
//! │  └─────────────┘  └──────────────┘  └──────────────────────┘  │
//! │         │                                                     │
//! │  ┌─────────────┐  ┌──────────────┐                            │
//! │  │ ToolExecutor│  │ SessionStore │                            │
//! │  └─────────────┘  └──────────────┘                            │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The `Client` trait lets Ollama, OpenAI and Gemini engines be swapped
//! without touching the dispatch loop.

pub mod dispatch;
pub mod error;
pub mod history;
pub mod message;
pub mod postprocess;
pub mod provider;
pub mod registry;
pub mod session;
pub mod summary;
pub mod tool;

pub use dispatch::{DispatchConfig, Dispatcher, DispatcherBuilder};
pub use error::{DispatchError, Result};
pub use message::{FunctionCall, Message, Role, ToolCall};
pub use provider::{ChatOptions, Client, Model};
pub use registry::{EngineRegistry, Resolved};
pub use session::{MemorySessionStore, Session, SessionConfig, SessionId, SessionStore};
pub use tool::{Tool, ToolExecutor, ToolHandler, ToolRegistry};
