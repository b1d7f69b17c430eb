//! Structured-data lookup: (DiscoverTables) → GenerateQuery → ExecuteQuery → Rephrase

use super::{
    require_question, Pipeline, PipelineConstructionError, PipelineError, PipelineKind,
    DEFAULT_TOP_K,
};
use crate::conversation::ConversationState;
use crate::llm::LlmMessage;
use crate::sql::SqlBackend;
use crate::tools::{names, ToolOutput, ToolRegistry, ERROR_PREFIX};
use async_trait::async_trait;
use serde_json::json;
use std::sync::Arc;

enum Step {
    DiscoverTables,
    GenerateQuery { tables: Vec<String> },
    ExecuteQuery { query: String },
    Rephrase { result: String },
}

impl Step {
    fn name(&self) -> &'static str {
        match self {
            Step::DiscoverTables => "discover_tables",
            Step::GenerateQuery { .. } => "generate_query",
            Step::ExecuteQuery { .. } => "execute_query",
            Step::Rephrase { .. } => "rephrase",
        }
    }
}

pub struct StructuredDataPipeline {
    backend: Arc<dyn SqlBackend>,
    tools: Arc<ToolRegistry>,
    discover_tables: bool,
    top_k: usize,
}

impl StructuredDataPipeline {
    pub fn new(
        backend: Arc<dyn SqlBackend>,
        tools: Arc<ToolRegistry>,
    ) -> Result<Self, PipelineConstructionError> {
        for name in [
            names::GENERATE_SQL_QUERY,
            names::EXECUTE_SQL_QUERY,
            names::REPHRASE_RESULT,
        ] {
            tools.require(name)?;
        }
        Ok(Self {
            backend,
            tools,
            discover_tables: false,
            top_k: DEFAULT_TOP_K,
        })
    }

    /// Look up relevant table descriptions before generating the query
    pub fn with_table_discovery(mut self, top_k: usize) -> Result<Self, PipelineConstructionError> {
        self.tools.require(names::VECTOR_TABLE_SEARCH)?;
        self.discover_tables = true;
        self.top_k = top_k.max(1);
        Ok(self)
    }

    async fn discover(&self, state: &ConversationState) -> Result<Step, PipelineError> {
        let question = require_question(state.latest_question())?;
        let output = self
            .tools
            .invoke(
                names::VECTOR_TABLE_SEARCH,
                json!({ "query": question, "top_k": self.top_k }),
            )
            .await;

        // A failed lookup only loses the hints
        let tables = if output.is_error() {
            tracing::warn!(output = %output.clone().into_text(), "Table discovery failed");
            Vec::new()
        } else {
            match output {
                ToolOutput::List(items) => items,
                ToolOutput::Text(text) => vec![text],
            }
        };
        Ok(Step::GenerateQuery { tables })
    }

    async fn generate(
        &self,
        state: &ConversationState,
        tables: Vec<String>,
    ) -> Result<Step, PipelineError> {
        let question = require_question(state.latest_question())?;
        let mut schema = self.backend.schema_ddl().await?;
        if !tables.is_empty() {
            schema.push_str("\n\nRelevant tables:\n");
            schema.push_str(&tables.join("\n\n"));
        }

        let query = self
            .tools
            .invoke(
                names::GENERATE_SQL_QUERY,
                json!({ "schema": schema, "question": question }),
            )
            .await
            .into_text();
        Ok(Step::ExecuteQuery { query })
    }

    async fn execute(&self, query: String) -> Step {
        if query.starts_with(ERROR_PREFIX) {
            tracing::warn!(error = %query, "No query to execute");
            return Step::Rephrase { result: query };
        }
        let result = self
            .tools
            .invoke(names::EXECUTE_SQL_QUERY, json!({ "sql_query": query }))
            .await
            .into_text();
        Step::Rephrase { result }
    }

    async fn rephrase(
        &self,
        state: &mut ConversationState,
        result: String,
    ) -> Result<(), PipelineError> {
        let question = require_question(state.original_question())?;
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
impl Pipeline for StructuredDataPipeline {
    fn kind(&self) -> PipelineKind {
        PipelineKind::StructuredData
    }

    async fn invoke(
        &self,
        mut state: ConversationState,
    ) -> Result<ConversationState, PipelineError> {
        let mut next = Some(if self.discover_tables {
            Step::DiscoverTables
        } else {
            Step::GenerateQuery { tables: Vec::new() }
        });

        while let Some(step) = next {
            state.enter(step.name());
            next = match step {
                Step::DiscoverTables => Some(self.discover(&state).await?),
                Step::GenerateQuery { tables } => Some(self.generate(&state, tables).await?),
                Step::ExecuteQuery { query } => Some(self.execute(query).await),
                Step::Rephrase { result } => {
                    self.rephrase(&mut state, result).await?;
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
    use crate::testing::{call_log, MockTool, StubSqlBackend};

    struct Fixture {
        generate: Arc<MockTool>,
        execute: Arc<MockTool>,
        rephrase: Arc<MockTool>,
        tables: Arc<MockTool>,
        tools: Arc<ToolRegistry>,
    }

    fn fixture(execute_output: &str) -> Fixture {
        let generate = Arc::new(MockTool::new(
            names::GENERATE_SQL_QUERY,
            ToolOutput::text("SELECT COUNT(*) FROM customers"),
        ));
        let execute = Arc::new(MockTool::new(
            names::EXECUTE_SQL_QUERY,
            ToolOutput::text(execute_output),
        ));
        let rephrase = Arc::new(MockTool::new(
            names::REPHRASE_RESULT,
            ToolOutput::text("There are 42 customers."),
        ));
        let tables = Arc::new(MockTool::new(
            names::VECTOR_TABLE_SEARCH,
            ToolOutput::List(vec!["customers: one row per customer".to_string()]),
        ));
        let tools = Arc::new(
            ToolRegistry::new()
                .with_tool(generate.clone())
                .with_tool(execute.clone())
                .with_tool(rephrase.clone())
                .with_tool(tables.clone()),
        );
        Fixture {
            generate,
            execute,
            rephrase,
            tables,
            tools,
        }
    }

    fn backend() -> Arc<StubSqlBackend> {
        Arc::new(StubSqlBackend::new("[(42,)]").with_ddl("CREATE TABLE customers (id INTEGER);"))
    }

    #[tokio::test]
    async fn test_success_path_rephrases_once() {
        let fx = fixture("[(42,)]");
        let pipeline = StructuredDataPipeline::new(backend(), fx.tools.clone()).unwrap();

        let state = pipeline
            .invoke(ConversationState::new("How many customers are there?"))
            .await
            .unwrap();

        assert_eq!(
            state.visited(),
            &["generate_query", "execute_query", "rephrase"]
        );
        assert_eq!(state.visits("rephrase"), 1);
        assert_eq!(state.answer().as_deref(), Some("There are 42 customers."));

        let generate_input = &fx.generate.inputs()[0];
        assert_eq!(generate_input["question"], "How many customers are there?");
        assert_eq!(generate_input["schema"], "CREATE TABLE customers (id INTEGER);");
        assert_eq!(
            fx.execute.inputs(),
            vec![json!({"sql_query": "SELECT COUNT(*) FROM customers"})]
        );
        assert_eq!(
            fx.rephrase.inputs(),
            vec![json!({"question": "How many customers are there?", "result": "[(42,)]"})]
        );
        assert!(fx.tables.inputs().is_empty());
    }

    #[tokio::test]
    async fn test_error_result_still_rephrased() {
        let fx = fixture("❌ Error: no such table: customer");
        let pipeline = StructuredDataPipeline::new(backend(), fx.tools.clone()).unwrap();

        let state = pipeline
            .invoke(ConversationState::new("How many customers are there?"))
            .await
            .unwrap();

        assert_eq!(state.visits("execute_query"), 1);
        assert_eq!(state.visits("rephrase"), 1);
        assert!(!state.answer().unwrap_or_default().is_empty());
        assert_eq!(
            fx.rephrase.inputs()[0]["result"],
            "❌ Error: no such table: customer"
        );
    }

    #[tokio::test]
    async fn test_table_discovery_feeds_schema() {
        let fx = fixture("[(42,)]");
        let pipeline = StructuredDataPipeline::new(backend(), fx.tools.clone())
            .unwrap()
            .with_table_discovery(3)
            .unwrap();

        let state = pipeline
            .invoke(ConversationState::new("How many customers are there?"))
            .await
            .unwrap();

        assert_eq!(state.visited()[0], "discover_tables");
        assert_eq!(
            fx.tables.inputs(),
            vec![json!({"query": "How many customers are there?", "top_k": 3})]
        );
        let schema = fx.generate.inputs()[0]["schema"]
            .as_str()
            .unwrap_or_default()
            .to_string();
        assert!(schema.contains("customers: one row per customer"));
    }

    #[tokio::test]
    async fn test_call_order() {
        let log = call_log();
        let generate = Arc::new(
            MockTool::new(names::GENERATE_SQL_QUERY, ToolOutput::text("SELECT 1")).with_log(log.clone()),
        );
        let execute = Arc::new(
            MockTool::new(names::EXECUTE_SQL_QUERY, ToolOutput::text("[(1,)]")).with_log(log.clone()),
        );
        let rephrase = Arc::new(
            MockTool::new(names::REPHRASE_RESULT, ToolOutput::text("One.")).with_log(log.clone()),
        );
        let tools = Arc::new(
            ToolRegistry::new()
                .with_tool(generate)
                .with_tool(execute)
                .with_tool(rephrase),
        );
        let pipeline = StructuredDataPipeline::new(backend(), tools).unwrap();
        pipeline.invoke(ConversationState::new("q")).await.unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["generate_sql_query", "execute_sql_query", "rephrase_result"]
        );
    }

    #[test]
    fn test_missing_tools_rejected() {
        let tools = Arc::new(ToolRegistry::new());
        let result = StructuredDataPipeline::new(backend(), tools);
        assert!(matches!(
            result,
            Err(PipelineConstructionError::MissingTool(_))
        ));

        let fx = fixture("");
        let without_tables = Arc::new(
            ToolRegistry::new()
                .with_tool(fx.generate.clone())
                .with_tool(fx.execute.clone())
                .with_tool(fx.rephrase.clone()),
        );
        let result = StructuredDataPipeline::new(backend(), without_tables)
            .unwrap()
            .with_table_discovery(5);
        assert!(result.is_err());
    }
}
