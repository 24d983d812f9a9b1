//! Reply post-processing
//!
//! Small, provider-specific clean-ups applied to model text before it becomes
//! a canonical message.

pub const THINK_OPEN: &str = "<think>";
pub const THINK_CLOSE: &str = "</think>";

/// Strip one trailing `.`, then one leading and one trailing `"`
///
/// Small local models like to wrap short answers this way.
pub fn trim_wrapping(content: &str) -> &str {
    let content = content.strip_suffix('.').unwrap_or(content);
    let content = content.strip_prefix('"').unwrap_or(content);
    content.strip_suffix('"').unwrap_or(content)
}

/// Split a `<think>...</think>` segment out of `content`
///
/// Returns `(thought, remaining_content)`. Content without a complete pair of
/// markers is returned unchanged.
pub fn split_thought(content: &str) -> (Option<String>, String) {
    let Some(open) = content.find(THINK_OPEN) else {
        return (None, content.to_string());
    };
    let after_open = open + THINK_OPEN.len();
    let Some(close) = content[after_open..].find(THINK_CLOSE) else {
        return (None, content.to_string());
    };
    let close = after_open + close;

    let thought = content[after_open..close].trim().to_string();
    let before = content[..open].trim();
    let after = content[close + THINK_CLOSE.len()..].trim();

    let remaining = match (before.is_empty(), after.is_empty()) {
        (true, _) => after.to_string(),
        (false, true) => before.to_string(),
        (false, false) => format!("{before}\n{after}"),
    };

    (Some(thought), remaining)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_trim_wrapping() {
        assert_eq!(trim_wrapping("\"Paris\"."), "Paris");
        assert_eq!(trim_wrapping("\"Paris\""), "Paris");
        assert_eq!(trim_wrapping("It is 4."), "It is 4");
        // one of each, no more
        assert_eq!(trim_wrapping("Wait.."), "Wait.");
        assert_eq!(trim_wrapping("\"\"quoted\"\""), "\"quoted\"");
        assert_eq!(trim_wrapping(""), "");
    }

    #[test]
    fn test_split_thought() {
        let (thought, content) = split_thought("<think>reasoning here</think>The answer");
        assert_eq!(thought.as_deref(), Some("reasoning here"));
        assert_eq!(content, "The answer");
    }

    #[test]
    fn test_split_thought_trims_whitespace() {
        let (thought, content) = split_thought("<think>\n  step one\n</think>\n\n4");
        assert_eq!(thought.as_deref(), Some("step one"));
        assert_eq!(content, "4");
    }

    #[test]
    fn test_split_thought_without_markers() {
        let (thought, content) = split_thought("plain answer");
        assert!(thought.is_none());
        assert_eq!(content, "plain answer");

        let (thought, content) = split_thought("<think>never closed");
        assert!(thought.is_none());
        assert_eq!(content, "<think>never closed");
    }
}
