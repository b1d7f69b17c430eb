//! Per-turn conversation state threaded through a pipeline

use crate::llm::{LlmMessage, MessageRole};

/// State of one in-flight turn.
///
/// Pipelines take it by value and hand it back when they finish, so a
/// returned state can no longer be touched by the pipeline that produced it.
/// Step-local scratch data (schema, generated query, raw result) lives in
/// each pipeline's step enum, not here.
#[derive(Debug, Clone, Default)]
pub struct ConversationState {
    messages: Vec<LlmMessage>,
    visited: Vec<&'static str>,
}

impl ConversationState {
    /// Fresh state for a new question
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            messages: vec![LlmMessage::user(question)],
            visited: Vec::new(),
        }
    }

    pub fn messages(&self) -> &[LlmMessage] {
        &self.messages
    }

    /// Append-only within a turn
    pub fn push(&mut self, message: LlmMessage) {
        self.messages.push(message);
    }

    pub fn last(&self) -> Option<&LlmMessage> {
        self.messages.last()
    }

    /// The first user message: the question the turn was opened with
    pub fn original_question(&self) -> Option<String> {
        self.messages
            .iter()
            .find(|m| m.role == MessageRole::User)
            .map(LlmMessage::text)
    }

    /// The most recent user message
    pub fn latest_question(&self) -> Option<String> {
        self.messages
            .iter()
            .rev()
            .find(|m| m.role == MessageRole::User)
            .map(LlmMessage::text)
    }

    /// Text of the most recent message, whatever its role
    pub fn latest_content(&self) -> String {
        self.last().map(LlmMessage::text).unwrap_or_default()
    }

    /// The turn's answer: text of the final assistant message
    pub fn answer(&self) -> Option<String> {
        self.last()
            .filter(|m| m.role == MessageRole::Assistant)
            .map(LlmMessage::text)
    }

    pub(crate) fn enter(&mut self, step: &'static str) {
        tracing::debug!(step, "Entering pipeline step");
        self.visited.push(step);
    }

    /// Step names entered during this turn, in order
    pub fn visited(&self) -> &[&'static str] {
        &self.visited
    }

    /// How many times a given step was entered
    #[cfg(test)]
    pub fn visits(&self, step: &str) -> usize {
        self.visited.iter().filter(|s| **s == step).count()
    }
}
