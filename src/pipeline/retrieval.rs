//! Retrieve → Answer over the knowledge index

use super::{
    require_question, Pipeline, PipelineConstructionError, PipelineError, PipelineKind,
    DEFAULT_TOP_K,
};
use crate::conversation::ConversationState;
use crate::llm::{strip_reasoning, LlmMessage, LlmRequest, LlmService, ToolCall};
use crate::tools::{names, ToolRegistry};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are a helpful assistant. Answer the user's question using the \
retrieved passages in the conversation. If they do not contain the answer, say so.";

enum Step {
    Retrieve,
    Answer,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Retrieve => "retrieve",
            Step::Answer => "answer",
        }
    }
}

pub struct SemanticRetrievalPipeline {
    llm: Arc<dyn LlmService>,
    tools: Arc<ToolRegistry>,
    top_k: usize,
}

impl SemanticRetrievalPipeline {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self, PipelineConstructionError> {
        tools.require(names::VECTOR_KNOWLEDGE_SEARCH)?;
        Ok(Self {
            llm,
            tools,
            top_k: DEFAULT_TOP_K,
        })
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k.max(1);
        self
    }

    async fn retrieve(&self, state: &mut ConversationState) -> Result<Option<Step>, PipelineError> {
        let question = require_question(state.latest_question())?;
        let arguments = json!({ "query": question, "top_k": self.top_k });

        let output = self
            .tools
            .invoke(names::VECTOR_KNOWLEDGE_SEARCH, arguments.clone())
            .await;

        // Recorded as a call/result pair so the history stays well-formed
        let call = ToolCall::new(
            format!("call_{}", uuid::Uuid::new_v4().simple()),
            names::VECTOR_KNOWLEDGE_SEARCH,
            arguments,
        );
        state.push(LlmMessage::assistant_tool_calls("", std::slice::from_ref(&call)));
        state.push(LlmMessage::tool_result(call.id, output.into_text()));
        Ok(Some(Step::Answer))
    }

    async fn answer(&self, state: &mut ConversationState) -> Result<Option<Step>, PipelineError> {
        let request =
            LlmRequest::from_messages(state.messages().to_vec()).with_system(SYSTEM_PROMPT);
        let response = self.llm.complete(&request).await?;
        state.push(LlmMessage::assistant(strip_reasoning(&response.text())));
        Ok(None)
    }
}

#[async_trait]
impl Pipeline for SemanticRetrievalPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::SemanticRetrieval
    }

    async fn invoke(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        let mut next = Some(Step::Retrieve);
        while let Some(step) = next {
            state.enter(step.name());
            next = match step {
                Step::Retrieve => self.retrieve(&mut state).await?,
                Step::Answer => self.answer(&mut state).await?,
            };
        }
        Ok(state)
    }
}
