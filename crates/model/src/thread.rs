use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

const MAX_TITLE_CHARS: usize = 40;

/// A conversation thread.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Thread {
    /// Opaque identifier, unique within one storage backend.
    pub thread_id: String,
    /// Display title.
    pub title: String,
    /// When the thread was created.
    pub created_at: DateTime<Utc>,
    /// Whether the backend is still producing a response in this thread.
    #[serde(default)]
    pub is_running: bool,
}

impl Thread {
    /// Creates a thread with a freshly generated id.
    #[inline]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            thread_id: Uuid::new_v4().to_string(),
            title: title.into(),
            created_at: Utc::now(),
            is_running: false,
        }
    }

    /// Creates a thread titled after the first message of a conversation.
    #[inline]
    pub fn from_first_message(first_message: &str) -> Self {
        Self::new(title_from_message(first_message))
    }
}

/// Derives a short single-line title from a message.
pub fn title_from_message(message: &str) -> String {
    let collapsed = message.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return "New Chat".to_owned();
    }
    if collapsed.chars().count() <= MAX_TITLE_CHARS {
        return collapsed;
    }
    let mut title: String = collapsed.chars().take(MAX_TITLE_CHARS).collect();
    title.truncate(title.trim_end().len());
    title.push('…');
    title
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_title_from_message() {
        assert_eq!(title_from_message("  Hello\n  there "), "Hello there");
        assert_eq!(title_from_message("   "), "New Chat");

        let long = "word ".repeat(20);
        let title = title_from_message(&long);
        assert!(title.ends_with('…'));
        assert_eq!(title.chars().count(), 40);
    }

    #[test]
    fn test_serialized_shape() {
        let thread = Thread::new("Greetings");
        let value = serde_json::to_value(&thread).unwrap();
        assert_eq!(value["title"], "Greetings");
        assert_eq!(value["isRunning"], false);
        assert!(value["threadId"].is_string());
        assert!(value["createdAt"].is_string());
    }
}
