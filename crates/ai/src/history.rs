use std::collections::VecDeque;

use models::ConversationMessage;

/// Fixed-capacity conversation window. Pushing past capacity evicts the oldest entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationHistory {
    capacity: usize,
    messages: VecDeque<ConversationMessage>,
}

impl ConversationHistory {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            messages: VecDeque::with_capacity(capacity),
        }
    }

    /// Keeps the most recent `capacity` entries of `messages`.
    pub fn from_messages(capacity: usize, messages: &[ConversationMessage]) -> Self {
        let mut history = Self::new(capacity);
        let skip = messages.len().saturating_sub(capacity);
        for message in &messages[skip..] {
            history.push(message.clone());
        }
        history
    }

    pub fn push(&mut self, message: ConversationMessage) {
        if self.capacity == 0 {
            return;
        }
        while self.messages.len() >= self.capacity {
            self.messages.pop_front();
        }
        self.messages.push_back(message);
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn snapshot(&self) -> Vec<ConversationMessage> {
        self.messages.iter().cloned().collect()
    }

    pub fn into_vec(self) -> Vec<ConversationMessage> {
        self.messages.into()
    }
}
