//! Turns a raw tool or database result into a reply for the user

use super::{parse_input, Tool, ToolError, ToolOutput};
use crate::llm::{strip_reasoning, LlmRequest, LlmService};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const SYSTEM_PROMPT: &str = "You are an assistant summarizing results for end users. \
Answer the user's question using only the raw data provided. \
If the raw data starts with an error marker, explain in plain words that the \
lookup failed and what the user could try instead. Do not show SQL or internal details.";

pub struct RephraseResultTool {
    llm: Arc<dyn LlmService>,
}

#[derive(Debug, Deserialize)]
struct RephraseInput {
    question: String,
    result: String,
}

impl RephraseResultTool {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }
}

#[async_trait]
impl Tool for RephraseResultTool {
    fn name(&self) -> &'static str {
        super::names::REPHRASE_RESULT
    }

    fn description(&self) -> String {
        "Given a user's question and the raw output from a tool, return a natural, human-friendly response that summarizes the result clearly.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["question", "result"],
            "properties": {
                "question": { "type": "string", "description": "The user's original question" },
                "result": { "type": "string", "description": "Raw tool output" }
            }
        })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let RephraseInput { question, result } = parse_input(input)?;
        let request = LlmRequest::prompt(format!(
            "User Question: {question}\n\nRaw Data: {result}\n\nFinal Answer:"
        ))
        .with_system(SYSTEM_PROMPT);

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| ToolError::Failed(format!("Rephrasing failed: {e}")))?;

        let answer = strip_reasoning(&response.text());
        if answer.is_empty() {
            // Never hand back an empty final message
            return Ok(ToolOutput::text(result));
        }
        Ok(ToolOutput::text(answer))
    }
}
