//! Single-step pipeline: the whole history goes to the model, the reply is
//! the answer.

use super::{Pipeline, PipelineError, PipelineKind};
use crate::conversation::ConversationState;
use crate::llm::{strip_reasoning, LlmMessage, LlmRequest, LlmService};
use async_trait::async_trait;
use std::sync::Arc;

const SYSTEM_PROMPT: &str =
    "You are a helpful assistant. Answer the user's question clearly and concisely.";

pub struct GeneralAnswerPipeline {
    llm: Arc<dyn LlmService>,
}

impl GeneralAnswerPipeline {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Pipeline for GeneralAnswerPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::GeneralAnswer
    }

    async fn invoke(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        state.enter("answer");
        let request =
            LlmRequest::from_messages(state.messages().to_vec()).with_system(SYSTEM_PROMPT);
        let response = self.llm.complete(&request).await?;
        state.push(LlmMessage::assistant(strip_reasoning(&response.text())));
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::LlmError;
    use crate::testing::MockLlmClient;

    #[tokio::test]
    async fn test_single_model_call() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_text("<think>greeting</think>Hello! How can I help?");
        let pipeline = GeneralAnswerPipeline::new(llm.clone());

        let state = pipeline.invoke(ConversationState::new("hello")).await.unwrap();
        assert_eq!(state.answer().as_deref(), Some("Hello! How can I help?"));
        assert_eq!(state.visited(), &["answer"]);

        let requests = llm.recorded_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].tools.is_empty());
        assert_eq!(requests[0].messages.len(), 1);
    }

    #[tokio::test]
    async fn test_backend_failure_propagates() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_error(LlmError::rate_limit("slow down"));
        let pipeline = GeneralAnswerPipeline::new(llm);

        let result = pipeline.invoke(ConversationState::new("hello")).await;
        assert!(matches!(result, Err(PipelineError::Llm(_))));
    }
}
