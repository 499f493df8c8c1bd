//! Committed conversation history.
//!
//! Only fully completed exchanges live here: the orchestrator appends the
//! user message optimistically at the start of a turn, commits the assistant
//! response on clean completion, and rolls the user message back if the
//! provider fails mid-turn. In-progress responses and the ephemeral
//! continuation messages never enter this history.

use crate::provider::{Message, Role};

/// Ordered user/assistant messages across completed turns.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    messages: Vec<Message>,
}

impl ConversationHistory {
    /// Create an empty history.
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a user message.
    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    /// Append a completed assistant response.
    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.messages.push(Message::assistant(content));
    }

    /// Remove the most recent message if it is a user message.
    ///
    /// Used to undo the optimistic append when a turn aborts. Returns
    /// whether a message was removed.
    pub fn rollback_user(&mut self) -> bool {
        if self.messages.last().is_some_and(|m| m.role == Role::User) {
            self.messages.pop();
            true
        } else {
            false
        }
    }

    /// The committed messages in order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of committed messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Whether no messages have been committed.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
