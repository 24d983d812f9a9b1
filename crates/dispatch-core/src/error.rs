//! Error Types

use thiserror::Error;

use crate::session::SessionId;

/// Result type alias for dispatch operations
pub type Result<T> = std::result::Result<T, DispatchError>;

/// Dispatch error types
#[derive(Error, Debug)]
pub enum DispatchError {
    /// Model id does not resolve to a configured engine
    #[error("No engine configured for model '{0}'")]
    MissingEngine(String),

    /// Registry lookup found no engine claiming the prefix
    #[error("Unknown engine: {0}")]
    UnknownEngine(String),

    /// Session has no owning app
    #[error("Session {0} has no app")]
    MissingApp(SessionId),

    /// The provider API call failed (network, auth, rate limit, 5xx)
    #[error("Provider error ({engine}): {message}")]
    Provider {
        engine: String,
        status: Option<u16>,
        message: String,
    },

    /// The provider answered but the payload does not map to a message
    #[error("Decode error ({engine}): {message}")]
    Decode { engine: String, message: String },

    /// The tool channel or the tool itself failed
    #[error("Tool '{tool}' failed: {message}")]
    ToolExecution { tool: String, message: String },

    /// The model kept requesting tools past the round cap
    #[error("Gave up after {0} tool rounds")]
    TooManyToolRounds(usize),

    /// Session does not exist in the store
    #[error("Session not found: {0}")]
    SessionNotFound(SessionId),

    /// Session store failure
    #[error("Session store error: {0}")]
    Store(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl DispatchError {
    pub fn provider(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Provider {
            engine: engine.into(),
            status: None,
            message: message.into(),
        }
    }

    pub fn decode(engine: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            engine: engine.into(),
            message: message.into(),
        }
    }

    /// Check if the caller may retry the whole dispatch
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Provider { status, .. } => !matches!(status, Some(401 | 403)),
            Self::ToolExecution { .. } => true,
            _ => false,
        }
    }

    /// Short machine-readable code, used by HTTP surfaces
    pub fn code(&self) -> &'static str {
        match self {
            Self::MissingEngine(_) => "MISSING_ENGINE",
            Self::UnknownEngine(_) => "UNKNOWN_ENGINE",
            Self::MissingApp(_) => "MISSING_APP",
            Self::Provider { .. } => "PROVIDER_ERROR",
            Self::Decode { .. } => "DECODE_ERROR",
            Self::ToolExecution { .. } => "TOOL_EXECUTION_ERROR",
            Self::TooManyToolRounds(_) => "TOO_MANY_TOOL_ROUNDS",
            Self::SessionNotFound(_) => "SESSION_NOT_FOUND",
            Self::Store(_) => "STORE_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
        }
    }

    /// Convert to a user-friendly message
    pub fn user_message(&self) -> String {
        match self {
            Self::MissingEngine(model) => {
                format!("No configured engine provides the model '{model}'.")
            }
            Self::MissingApp(_) => "This conversation is not attached to an app.".into(),
            Self::Provider { status: Some(401 | 403), .. } => {
                "The AI service rejected the credentials. Please check your API key.".into()
            }
            Self::Provider { status: Some(429), .. } => {
                "You've made too many requests. Please wait a moment.".into()
            }
            Self::Provider { message, .. } => {
                format!("The AI service encountered an error: {message}")
            }
            Self::Decode { .. } => "The AI service returned a response that could not be read.".into(),
            Self::ToolExecution { tool, message } => format!("Tool '{tool}' failed: {message}"),
            Self::TooManyToolRounds(_) => {
                "The model kept calling tools without answering. Please try a simpler request.".into()
            }
            _ => "An unexpected error occurred.".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable() {
        assert!(DispatchError::provider("ollama", "connection refused").is_retryable());
        assert!(
            !DispatchError::Provider {
                engine: "openai".into(),
                status: Some(401),
                message: "bad key".into(),
            }
            .is_retryable()
        );
        assert!(!DispatchError::MissingEngine("x:y".into()).is_retryable());
        assert!(!DispatchError::decode("gemini", "no candidates").is_retryable());
    }
}
