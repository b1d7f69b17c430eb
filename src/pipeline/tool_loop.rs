//! Auxiliary tool loop: Propose → (Execute → Propose)* → Rephrase
//!
//! The model is offered the auxiliary tools; each tool-call request is
//! executed and fed back until the round cap is hit or the model answers
//! directly. The raw outcome is then rephrased against the question the turn
//! was opened with.

use super::{require_question, Pipeline, PipelineConstructionError, PipelineError, PipelineKind};
use crate::conversation::ConversationState;
use crate::llm::{
    strip_reasoning, LlmMessage, LlmRequest, LlmService, MessageRole, ModelReply, ToolCall,
    ToolDefinition,
};
use crate::tools::{names, ToolRegistry};
use async_trait::async_trait;
use futures::future::join_all;
use serde_json::json;
use std::sync::Arc;

/// One Propose → Execute round before rephrasing
pub const DEFAULT_MAX_TOOL_ROUNDS: usize = 1;

pub const AUXILIARY_TOOLS: &[&str] = &[
    names::MATH_ADD,
    names::MATH_MULTIPLY,
    names::MATH_DIVIDE,
    names::GET_WEATHER,
];

const SYSTEM_PROMPT: &str = "You are a helpful assistant with access to tools. \
Use a tool when the question needs a calculation or a live lookup; otherwise answer directly.";

#[derive(Debug, Clone, PartialEq)]
enum Step {
    Propose { round: usize },
    Execute { round: usize, calls: Vec<ToolCall> },
    Rephrase,
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::Propose { .. } => "propose",
            Step::Execute { .. } => "execute",
            Step::Rephrase => "rephrase",
        }
    }
}

/// Propose outcome: tool calls go to Execute, anything else to Rephrase
fn after_propose(reply: ModelReply, completed_rounds: usize) -> Step {
    match reply {
        ModelReply::ToolCallRequest { calls, .. } if !calls.is_empty() => Step::Execute {
            round: completed_rounds + 1,
            calls,
        },
        _ => Step::Rephrase,
    }
}

/// Execute outcome: back to Propose until the cap is reached
fn after_execute(round: usize, max_rounds: usize) -> Step {
    if round >= max_rounds {
        Step::Rephrase
    } else {
        Step::Propose { round }
    }
}

/// Results of the last Execute round, or the latest message if there was none
fn raw_result(state: &ConversationState) -> String {
    let mut results: Vec<String> = state
        .messages()
        .iter()
        .rev()
        .take_while(|m| m.role == MessageRole::Tool)
        .map(LlmMessage::text)
        .collect();
    if results.is_empty() {
        return state.latest_content();
    }
    results.reverse();
    results.join("\n")
}

pub struct ToolLoopPipeline {
    llm: Arc<dyn LlmService>,
    tools: Arc<ToolRegistry>,
    definitions: Vec<ToolDefinition>,
    max_rounds: usize,
}

impl ToolLoopPipeline {
    pub fn new(
        llm: Arc<dyn LlmService>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self, PipelineConstructionError> {
        Self::with_tools(llm, tools, AUXILIARY_TOOLS)
    }

    /// Bind a custom tool set; every name must be registered
    pub fn with_tools(
        llm: Arc<dyn LlmService>,
        tools: Arc<ToolRegistry>,
        bound: &[&str],
    ) -> Result<Self, PipelineConstructionError> {
        let definitions = tools.definitions_for(bound)?;
        tools.require(names::REPHRASE_RESULT)?;
        Ok(Self {
            llm,
            tools,
            definitions,
            max_rounds: DEFAULT_MAX_TOOL_ROUNDS,
        })
    }

    pub fn with_max_rounds(mut self, max_rounds: usize) -> Result<Self, PipelineConstructionError> {
        if max_rounds == 0 {
            return Err(PipelineConstructionError::InvalidRoundLimit);
        }
        self.max_rounds = max_rounds;
        Ok(self)
    }

    async fn propose(
        &self,
        state: &mut ConversationState,
        completed_rounds: usize,
    ) -> Result<Step, PipelineError> {
        let request = LlmRequest::from_messages(state.messages().to_vec())
            .with_system(SYSTEM_PROMPT)
            .with_tools(self.definitions.clone());
        let reply = self.llm.complete(&request).await?.reply();

        match &reply {
            ModelReply::FinalAnswer(text) => {
                state.push(LlmMessage::assistant(strip_reasoning(text)));
            }
            ModelReply::ToolCallRequest { text, calls } => {
                tracing::debug!(calls = calls.len(), "Model requested tool calls");
                state.push(LlmMessage::assistant_tool_calls(&strip_reasoning(text), calls));
            }
        }
        Ok(after_propose(reply, completed_rounds))
    }

    /// Calls in one round run concurrently; results keep request order
    async fn execute(&self, state: &mut ConversationState, calls: Vec<ToolCall>) {
        let outputs = join_all(
            calls
                .iter()
                .map(|call| self.tools.invoke(&call.name, call.arguments.clone())),
        )
        .await;
        for (call, output) in calls.into_iter().zip(outputs) {
            state.push(LlmMessage::tool_result(call.id, output.into_text()));
        }
    }

    async fn rephrase(&self, state: &mut ConversationState) -> Result<(), PipelineError> {
        let question = require_question(state.original_question())?;
        let result = raw_result(state);
        let answer = self
            .tools
            .invoke(
                names::REPHRASE_RESULT,
                json!({ "question": question, "result": result }),
            )
            .await
            .into_text();
        state.push(LlmMessage::assistant(answer));
        Ok(())
    }
}

#[async_trait]
impl Pipeline for ToolLoopPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::ToolLoop
    }

    async fn invoke(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        let mut next = Some(Step::Propose { round: 0 });
        while let Some(step) = next {
            state.enter(step.name());
            next = match step {
                Step::Propose { round } => Some(self.propose(&mut state, round).await?),
                Step::Execute { round, calls } => {
                    self.execute(&mut state, calls).await;
                    Some(after_execute(round, self.max_rounds))
                }
                Step::Rephrase => {
                    self.rephrase(&mut state).await?;
                    None
                }
            };
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ContentBlock, LlmResponse};
    use crate::testing::{MockLlmClient, MockTool};
    use crate::tools::{MathAddTool, ToolOutput};

    fn tool_call_response(id: &str, name: &str, arguments: serde_json::Value) -> LlmResponse {
        LlmResponse {
            content: vec![ContentBlock::ToolUse {
                id: id.to_string(),
                name: name.to_string(),
                input: arguments,
            }],
            usage: Default::default(),
        }
    }

    fn registry(rephrase: Arc<MockTool>) -> Arc<ToolRegistry> {
        Arc::new(
            ToolRegistry::new()
                .with_tool(Arc::new(MathAddTool))
                .with_tool(Arc::new(MockTool::new(names::MATH_MULTIPLY, ToolOutput::text("0"))))
                .with_tool(Arc::new(MockTool::new(names::MATH_DIVIDE, ToolOutput::text("0"))))
                .with_tool(Arc::new(MockTool::new(names::GET_WEATHER, ToolOutput::text("Sunny"))))
                .with_tool(rephrase),
        )
    }

    #[test]
    fn test_transitions() {
        let call = ToolCall::new("c1", names::MATH_ADD, json!({"a": 1, "b": 2}));
        assert_eq!(
            after_propose(
                ModelReply::ToolCallRequest {
                    text: String::new(),
                    calls: vec![call.clone()]
                },
                0
            ),
            Step::Execute {
                round: 1,
                calls: vec![call]
            }
        );
        assert_eq!(
            after_propose(ModelReply::FinalAnswer("hi".to_string()), 0),
            Step::Rephrase
        );
        assert_eq!(after_execute(1, 1), Step::Rephrase);
        assert_eq!(after_execute(1, 3), Step::Propose { round: 1 });
        assert_eq!(after_execute(3, 3), Step::Rephrase);
    }

    #[tokio::test]
    async fn test_direct_answer_skips_execute() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_text("Hello there!");
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("Hi! How can I help?")));
        let pipeline = ToolLoopPipeline::new(llm.clone(), registry(rephrase.clone())).unwrap();

        let state = pipeline.invoke(ConversationState::new("hello")).await.unwrap();

        assert_eq!(state.visited(), &["propose", "rephrase"]);
        assert_eq!(state.visits("execute"), 0);
        assert_eq!(
            rephrase.inputs(),
            vec![json!({"question": "hello", "result": "Hello there!"})]
        );
        assert_eq!(state.answer().as_deref(), Some("Hi! How can I help?"));

        let request = &llm.recorded_requests()[0];
        let bound: Vec<_> = request.tools.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(bound, AUXILIARY_TOOLS);
    }

    #[tokio::test]
    async fn test_single_round_rephrases_original_question() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_response(tool_call_response(
            "call_1",
            names::MATH_ADD,
            json!({"a": 2, "b": 4}),
        ));
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("2 plus 4 is 6.")));
        let pipeline = ToolLoopPipeline::new(llm.clone(), registry(rephrase.clone())).unwrap();

        let state = pipeline.invoke(ConversationState::new("add 2 and 4")).await.unwrap();

        assert_eq!(state.visited(), &["propose", "execute", "rephrase"]);
        assert_eq!(state.visits("execute"), 1);
        assert_eq!(llm.recorded_requests().len(), 1);

        let inputs = rephrase.inputs();
        assert_eq!(inputs.len(), 1);
        assert_eq!(inputs[0]["question"], "add 2 and 4");
        assert_eq!(inputs[0]["result"], "6");
        assert_eq!(state.answer().as_deref(), Some("2 plus 4 is 6."));
    }

    #[tokio::test]
    async fn test_multiple_rounds_until_answer() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_response(tool_call_response(
            "call_1",
            names::MATH_ADD,
            json!({"a": 2, "b": 4}),
        ));
        llm.queue_text("The answer is 6.");
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("It's 6.")));
        let pipeline = ToolLoopPipeline::new(llm.clone(), registry(rephrase.clone()))
            .unwrap()
            .with_max_rounds(3)
            .unwrap();

        let state = pipeline.invoke(ConversationState::new("add 2 and 4")).await.unwrap();

        assert_eq!(state.visited(), &["propose", "execute", "propose", "rephrase"]);
        assert_eq!(rephrase.inputs()[0]["result"], "The answer is 6.");

        // The second proposal saw the tool result
        let second = &llm.recorded_requests()[1];
        assert_eq!(second.messages.len(), 3);
        assert_eq!(second.messages[2].text(), "6");
    }

    #[tokio::test]
    async fn test_round_cap_stops_persistent_tool_requests() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        for (id, a) in [("call_1", 1), ("call_2", 4), ("call_3", 9)] {
            llm.queue_response(tool_call_response(id, names::MATH_ADD, json!({"a": a, "b": 6})));
        }
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("It's 10.")));
        let pipeline = ToolLoopPipeline::new(llm.clone(), registry(rephrase.clone()))
            .unwrap()
            .with_max_rounds(2)
            .unwrap();

        let state = pipeline.invoke(ConversationState::new("keep adding")).await.unwrap();

        assert_eq!(state.visits("execute"), 2);
        assert_eq!(state.visited().last(), Some(&"rephrase"));
        assert_eq!(
            state.visited(),
            &["propose", "execute", "propose", "execute", "rephrase"]
        );
        // The third queued proposal is never requested
        assert_eq!(llm.recorded_requests().len(), 2);
        assert_eq!(rephrase.inputs()[0]["result"], "10");
        assert_eq!(state.answer().as_deref(), Some("It's 10."));
    }

    #[tokio::test]
    async fn test_tool_failure_flows_into_rephrase() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        llm.queue_response(tool_call_response(
            "call_1",
            "math_sqrt",
            json!({"a": 9}),
        ));
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("Sorry.")));
        let pipeline = ToolLoopPipeline::new(llm, registry(rephrase.clone())).unwrap();

        pipeline.invoke(ConversationState::new("root of 9")).await.unwrap();
        assert_eq!(
            rephrase.inputs()[0]["result"],
            "❌ Error: Unknown tool: math_sqrt"
        );
    }

    #[test]
    fn test_zero_round_cap_rejected() {
        let llm = Arc::new(MockLlmClient::new("test-model"));
        let rephrase = Arc::new(MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("")));
        let result = ToolLoopPipeline::new(llm, registry(rephrase))
            .unwrap()
            .with_max_rounds(0);
        assert!(matches!(
            result,
            Err(PipelineConstructionError::InvalidRoundLimit)
        ));
    }
}
