//! Arithmetic tools for the auxiliary tool loop

use super::{parse_input, Tool, ToolError, ToolOutput};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct IntPair {
    a: i64,
    b: i64,
}

fn pair_schema() -> Value {
    json!({
        "type": "object",
        "required": ["a", "b"],
        "properties": {
            "a": { "type": "integer", "description": "First operand" },
            "b": { "type": "integer", "description": "Second operand" }
        }
    })
}

pub struct MathAddTool;

#[async_trait]
impl Tool for MathAddTool {
    fn name(&self) -> &'static str {
        super::names::MATH_ADD
    }

    fn description(&self) -> String {
        "Adds two numbers and returns the result. Use this for simple or complex addition operations.".to_string()
    }

    fn input_schema(&self) -> Value {
        pair_schema()
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let IntPair { a, b } = parse_input(input)?;
        a.checked_add(b)
            .map(|sum| ToolOutput::text(sum.to_string()))
            .ok_or_else(|| ToolError::Failed(format!("{a} + {b} overflows")))
    }
}

pub struct MathMultiplyTool;

#[async_trait]
impl Tool for MathMultiplyTool {
    fn name(&self) -> &'static str {
        super::names::MATH_MULTIPLY
    }

    fn description(&self) -> String {
        "Multiplies two numbers and returns the result. Use for any arithmetic requiring product calculation.".to_string()
    }

    fn input_schema(&self) -> Value {
        pair_schema()
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let IntPair { a, b } = parse_input(input)?;
        a.checked_mul(b)
            .map(|product| ToolOutput::text(product.to_string()))
            .ok_or_else(|| ToolError::Failed(format!("{a} * {b} overflows")))
    }
}

pub struct MathDivideTool;

#[async_trait]
impl Tool for MathDivideTool {
    fn name(&self) -> &'static str {
        super::names::MATH_DIVIDE
    }

    fn description(&self) -> String {
        "Divides the first number by the second and returns the result. Do not use if the second number is zero.".to_string()
    }

    fn input_schema(&self) -> Value {
        pair_schema()
    }

    #[allow(clippy::cast_precision_loss)]
    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let IntPair { a, b } = parse_input(input)?;
        if b == 0 {
            return Err(ToolError::Failed("Cannot divide by zero".to_string()));
        }
        Ok(ToolOutput::text((a as f64 / b as f64).to_string()))
    }
}
