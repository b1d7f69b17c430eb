//! Tool boundary: the `Tool` trait, the name-keyed registry and the
//! concrete tools the pipelines bind by name.

mod math;
mod rephrase;
mod search;
mod sql;
mod weather;

pub use math::{MathAddTool, MathDivideTool, MathMultiplyTool};
pub use rephrase::RephraseResultTool;
pub use search::VectorSearchTool;
pub use sql::{ExecuteSqlQueryTool, GenerateSqlQueryTool};
pub use weather::WeatherTool;

use crate::llm::{LlmService, ToolDefinition};
use crate::pipeline::PipelineConstructionError;
use crate::retrieval::SemanticIndex;
use crate::sql::SqlBackend;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Prefix carried by every tool-reported failure
pub const ERROR_PREFIX: &str = "❌ Error: ";

/// Tool names the pipelines bind to
pub mod names {
    pub const MATH_ADD: &str = "math_add";
    pub const MATH_MULTIPLY: &str = "math_multiply";
    pub const MATH_DIVIDE: &str = "math_divide";
    pub const GET_WEATHER: &str = "get_weather";
    pub const GENERATE_SQL_QUERY: &str = "generate_sql_query";
    pub const EXECUTE_SQL_QUERY: &str = "execute_sql_query";
    pub const VECTOR_KNOWLEDGE_SEARCH: &str = "vector_knowledge_search";
    pub const VECTOR_TABLE_SEARCH: &str = "vector_table_search";
    pub const REPHRASE_RESULT: &str = "rephrase_result";
}

/// Result from tool execution.
///
/// Success and tool-reported failure share this type; a failure is a text
/// starting with [`ERROR_PREFIX`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ToolOutput {
    Text(String),
    List(Vec<String>),
}

impl ToolOutput {
    pub fn text(s: impl Into<String>) -> Self {
        ToolOutput::Text(s.into())
    }

    pub fn error(message: impl std::fmt::Display) -> Self {
        ToolOutput::Text(format!("{ERROR_PREFIX}{message}"))
    }

    /// Flatten to a single string; list items are newline separated
    pub fn into_text(self) -> String {
        match self {
            ToolOutput::Text(text) => text,
            ToolOutput::List(items) => items.join("\n"),
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self, ToolOutput::Text(text) if text.starts_with(ERROR_PREFIX))
    }
}

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error("{0}")]
    Failed(String),
}

/// Deserialize a tool's named arguments
pub(crate) fn parse_input<T: DeserializeOwned>(input: Value) -> Result<T, ToolError> {
    serde_json::from_value(input).map_err(|e| ToolError::InvalidInput(e.to_string()))
}

/// Trait for tools that can be invoked by pipelines or requested by the model
#[async_trait]
pub trait Tool: Send + Sync {
    /// Tool name, unique within a registry
    fn name(&self) -> &str;

    /// Tool description for the model
    fn description(&self) -> String;

    /// JSON schema for tool input
    fn input_schema(&self) -> Value;

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError>;
}

/// Collaborators the standard tool set is built from
#[derive(Clone)]
pub struct StandardTools {
    pub llm: Arc<dyn LlmService>,
    pub sql: Option<Arc<dyn SqlBackend>>,
    pub knowledge: Option<Arc<dyn SemanticIndex>>,
    pub tables: Option<Arc<dyn SemanticIndex>>,
    pub weather_url: String,
    pub top_k: usize,
}

/// Name-keyed collection of tools, read-only once built
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register every tool whose collaborator is available
    pub fn standard(deps: &StandardTools) -> Result<Self, ToolError> {
        let mut registry = Self::new()
            .with_tool(Arc::new(MathAddTool))
            .with_tool(Arc::new(MathMultiplyTool))
            .with_tool(Arc::new(MathDivideTool))
            .with_tool(Arc::new(WeatherTool::new(&deps.weather_url)?))
            .with_tool(Arc::new(RephraseResultTool::new(deps.llm.clone())));

        if let Some(sql) = &deps.sql {
            registry.register(Arc::new(GenerateSqlQueryTool::new(deps.llm.clone())));
            registry.register(Arc::new(ExecuteSqlQueryTool::new(sql.clone())));
        }
        if let Some(index) = &deps.knowledge {
            registry.register(Arc::new(VectorSearchTool::knowledge(index.clone(), deps.top_k)));
        }
        if let Some(index) = &deps.tables {
            registry.register(Arc::new(VectorSearchTool::tables(index.clone(), deps.top_k)));
        }

        Ok(registry)
    }

    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.register(tool);
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        let name = tool.name().to_string();
        if self.tools.insert(name.clone(), tool).is_some() {
            tracing::warn!(tool = %name, "Tool registered twice, keeping the latest");
        }
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Like `get`, but a missing tool is a construction error
    pub fn require(&self, name: &str) -> Result<Arc<dyn Tool>, PipelineConstructionError> {
        self.get(name)
            .ok_or_else(|| PipelineConstructionError::MissingTool(name.to_string()))
    }

    /// Definitions for a fixed set of tools, in the given order
    pub fn definitions_for(
        &self,
        names: &[&str],
    ) -> Result<Vec<ToolDefinition>, PipelineConstructionError> {
        names
            .iter()
            .map(|name| {
                self.require(name).map(|t| ToolDefinition {
                    name: t.name().to_string(),
                    description: t.description(),
                    input_schema: t.input_schema(),
                })
            })
            .collect()
    }

    /// Sorted tool names
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<_> = self.tools.keys().cloned().collect();
        names.sort();
        names
    }

    /// Invoke a tool by name.
    ///
    /// Never fails: unknown tools and tool errors come back as error text so
    /// downstream steps can still phrase an answer.
    pub async fn invoke(&self, name: &str, input: Value) -> ToolOutput {
        let Some(tool) = self.get(name) else {
            tracing::warn!(tool = %name, "Unknown tool requested");
            return ToolOutput::error(format!("Unknown tool: {name}"));
        };

        match tool.run(input).await {
            Ok(output) => {
                tracing::debug!(tool = %name, "Tool completed");
                output
            }
            Err(e) => {
                tracing::warn!(tool = %name, error = %e, "Tool failed");
                ToolOutput::error(e)
            }
        }
    }
}
