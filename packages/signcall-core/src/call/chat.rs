//! In-call chat history.

use std::collections::HashSet;

use crate::protocol::ChatMessage;

/// Ordered chat lines for the current call, without duplicates.
///
/// Two messages are the same when sender, text and timestamp all match.
#[derive(Debug, Default)]
pub struct ChatLog {
    messages: Vec<ChatMessage>,
    seen: HashSet<ChatMessage>,
}

impl ChatLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message` unless an identical one is already present.
    /// Returns whether it was appended.
    pub fn push(&mut self, message: ChatMessage) -> bool {
        if !self.seen.insert(message.clone()) {
            return false;
        }
        self.messages.push(message);
        true
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.seen.clear();
    }
}
