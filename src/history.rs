//! Conversation history
//!
//! Append-only log of user/assistant turns for one session. The log itself
//! grows without bound; retention is a read-time window applied when the
//! history is rendered into a prompt, never a destructive truncation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who produced a turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn label(&self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Assistant => "Assistant",
        }
    }
}

/// One utterance in a session.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

/// Ordered, append-only turn log scoped to one session.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConversationHistory {
    turns: Vec<ConversationTurn>,
}

impl ConversationHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, role: Role, content: impl Into<String>) {
        self.turns.push(ConversationTurn {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        });
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    /// The most recent turns, capped at `max_turns`, oldest first.
    pub fn recent(&self, max_turns: usize) -> &[ConversationTurn] {
        let start = self.turns.len().saturating_sub(max_turns);
        &self.turns[start..]
    }

    /// Render the capped window as prompt context lines.
    pub fn to_prompt_text(&self, max_turns: usize) -> String {
        let mut out = String::new();
        for turn in self.recent(max_turns) {
            out.push_str(turn.role.label());
            out.push_str(": ");
            out.push_str(&turn.content);
            out.push('\n');
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_append_preserves_order() {
        let mut history = ConversationHistory::new();
        history.push(Role::User, "first");
        history.push(Role::Assistant, "second");
        history.push(Role::User, "third");

        let contents: Vec<&str> = history.turns().iter().map(|t| t.content.as_str()).collect();
        assert_eq!(contents, vec!["first", "second", "third"]);
    }

    #[test]
    fn test_recent_window_drops_oldest() {
        let mut history = ConversationHistory::new();
        for i in 0..10 {
            history.push(Role::User, format!("turn {}", i));
        }

        let window = history.recent(3);
        assert_eq!(window.len(), 3);
        assert_eq!(window[0].content, "turn 7");
        assert_eq!(window[2].content, "turn 9");
        // The log itself is untouched.
        assert_eq!(history.len(), 10);
    }

    #[test]
    fn test_recent_window_never_exceeds_cap() {
        let mut history = ConversationHistory::new();
        history.push(Role::User, "only");
        assert_eq!(history.recent(5).len(), 1);
        assert_eq!(history.recent(0).len(), 0);
    }

    #[test]
    fn test_prompt_text_labels_roles() {
        let mut history = ConversationHistory::new();
        history.push(Role::User, "how many orders?");
        history.push(Role::Assistant, "There are 42 orders.");
        assert_eq!(
            history.to_prompt_text(10),
            "User: how many orders?\nAssistant: There are 42 orders.\n"
        );
    }
}
