//! Session summaries
//!
//! Asks the session's own model for a very short title once the user has
//! said something.

use crate::error::Result;
use crate::message::{Message, Role};
use crate::provider::ChatOptions;
use crate::registry::EngineRegistry;
use crate::session::{DEFAULT_SUMMARY, Session, SessionStore};

/// Prompt sent (but never stored) to get a summary
pub const SUMMARY_PROMPT: &str = "Summarize all previous messages in a concise and comprehensive manner. The summary can be 3 words or less. Only respond with the summary and nothing else. Remember, the length of the summary can be 3 words or less.";

/// Clean a model's summary reply
///
/// Small models tack explanations on after a `;` and like to prefix the
/// answer with `Summary: `.
pub fn clean_summary(reply: &str) -> String {
    let head = reply.split(';').next().unwrap_or_default();
    let tail = ["Summary: ", "summary: "]
        .iter()
        .filter_map(|marker| head.rfind(marker).map(|i| i + marker.len()))
        .max()
        .map_or(head, |start| &head[start..]);
    tail.trim().to_string()
}

/// Summarize a session if it still has the default summary
///
/// Returns the new summary, or `None` when the session was not eligible.
pub async fn summarize(
    registry: &EngineRegistry,
    store: &dyn SessionStore,
    session: &Session,
) -> Result<Option<String>> {
    if session.summary != DEFAULT_SUMMARY || session.config.model.is_empty() {
        return Ok(None);
    }

    let mut history = store.messages(&session.id).await?;
    if !history.iter().any(|m| m.role == Role::User) {
        return Ok(None);
    }

    let Ok(resolved) = registry.resolve(&session.config.model, session.config.engine_id.as_deref())
    else {
        tracing::debug!(session = %session.id, "no engine for summary");
        return Ok(None);
    };

    history.push(Message::user(SUMMARY_PROMPT));
    let reply = resolved
        .client
        .chat(
            &resolved.model.name,
            &history,
            &[],
            &ChatOptions::from(&session.config),
        )
        .await?;

    let summary = clean_summary(&reply.content);
    if summary.is_empty() {
        return Ok(None);
    }

    store.set_summary(&session.id, &summary).await?;
    Ok(Some(summary))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clean_summary() {
        assert_eq!(clean_summary("Weather in Paris"), "Weather in Paris");
        assert_eq!(clean_summary("Math help; the user asked about sums"), "Math help");
        assert_eq!(clean_summary("Here you go. Summary: Trip planning"), "Trip planning");
        assert_eq!(clean_summary("summary: Rust lifetimes; done"), "Rust lifetimes");
    }
}
