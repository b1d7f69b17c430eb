//! Execution pipelines
//!
//! Each pipeline is a small state machine over a private `Step` enum. Steps
//! carry their own scratch data; the shared `ConversationState` only grows
//! by appended messages. Pipelines are built once at startup and hold no
//! per-turn state.

mod general;
mod retrieval;
mod structured;
mod tool_loop;

pub use general::GeneralAnswerPipeline;
pub use retrieval::SemanticRetrievalPipeline;
pub use structured::StructuredDataPipeline;
pub use tool_loop::{ToolLoopPipeline, DEFAULT_MAX_TOOL_ROUNDS};

use crate::conversation::ConversationState;
use crate::llm::LlmError;
use crate::sql::DbError;
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;

/// Default number of snippets fetched by the search steps
pub const DEFAULT_TOP_K: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineKind {
    GeneralAnswer,
    StructuredData,
    SemanticRetrieval,
    ToolLoop,
}

impl PipelineKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PipelineKind::GeneralAnswer => "general_answer",
            PipelineKind::StructuredData => "structured_data",
            PipelineKind::SemanticRetrieval => "semantic_retrieval",
            PipelineKind::ToolLoop => "tool_loop",
        }
    }
}

impl fmt::Display for PipelineKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Fatal at startup
#[derive(Debug, Error)]
pub enum PipelineConstructionError {
    #[error("No pipeline bound to the fallback label general_llm")]
    MissingDefault,
    #[error("Required tool is not registered: {0}")]
    MissingTool(String),
    #[error("max_tool_rounds must be at least 1")]
    InvalidRoundLimit,
}

/// Fails one turn; the read loop reports it and continues
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Model call failed: {0}")]
    Llm(#[from] LlmError),
    #[error(transparent)]
    Database(#[from] DbError),
    #[error("Conversation has no user question")]
    MissingQuestion,
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    fn kind(&self) -> PipelineKind;

    /// Run one turn to completion and hand the state back
    async fn invoke(&self, state: ConversationState) -> Result<ConversationState, PipelineError>;
}

fn require_question(question: Option<String>) -> Result<String, PipelineError> {
    question
        .filter(|q| !q.trim().is_empty())
        .ok_or(PipelineError::MissingQuestion)
}
