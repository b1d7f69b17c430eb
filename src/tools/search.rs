//! Semantic search over the knowledge corpus or the table descriptions

use super::{parse_input, Tool, ToolError, ToolOutput};
use crate::retrieval::SemanticIndex;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

pub struct VectorSearchTool {
    name: &'static str,
    description: &'static str,
    index: Arc<dyn SemanticIndex>,
    default_top_k: usize,
}

#[derive(Debug, Deserialize)]
struct SearchInput {
    query: String,
    #[serde(default)]
    top_k: Option<usize>,
}

impl VectorSearchTool {
    /// `vector_knowledge_search` over indexed documents
    pub fn knowledge(index: Arc<dyn SemanticIndex>, default_top_k: usize) -> Self {
        Self {
            name: super::names::VECTOR_KNOWLEDGE_SEARCH,
            description: "Search the indexed documents for passages relevant to the query. Returns the best matches first.",
            index,
            default_top_k,
        }
    }

    /// `vector_table_search` over table descriptions
    pub fn tables(index: Arc<dyn SemanticIndex>, default_top_k: usize) -> Self {
        Self {
            name: super::names::VECTOR_TABLE_SEARCH,
            description: "Find the database tables whose descriptions are relevant to the query.",
            index,
            default_top_k,
        }
    }
}

#[async_trait]
impl Tool for VectorSearchTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> String {
        self.description.to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["query"],
            "properties": {
                "query": { "type": "string", "description": "Natural-language search text" },
                "top_k": { "type": "integer", "description": "Maximum number of results", "minimum": 1 }
            }
        })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let SearchInput { query, top_k } = parse_input(input)?;
        let top_k = top_k.unwrap_or(self.default_top_k).max(1);

        let hits = self
            .index
            .search(&query, top_k)
            .await
            .map_err(|e| ToolError::Failed(e.to_string()))?;

        tracing::debug!(tool = self.name, hits = hits.len(), "Vector search completed");
        Ok(ToolOutput::List(hits))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::StubIndex;

    #[tokio::test]
    async fn test_search_respects_top_k() {
        let index = Arc::new(StubIndex::new(vec!["first", "second", "third"]));
        let tool = VectorSearchTool::knowledge(index.clone(), 2);

        let output = tool.run(json!({"query": "refund policy"})).await.unwrap();
        assert_eq!(
            output,
            ToolOutput::List(vec!["first".to_string(), "second".to_string()])
        );

        let output = tool
            .run(json!({"query": "refund policy", "top_k": 1}))
            .await
            .unwrap();
        assert_eq!(output.into_text(), "first");
        assert_eq!(index.queries(), vec!["refund policy", "refund policy"]);
    }

    #[test]
    fn test_names() {
        let index: Arc<dyn SemanticIndex> = Arc::new(StubIndex::new(Vec::<&str>::new()));
        assert_eq!(
            VectorSearchTool::knowledge(index.clone(), 5).name(),
            "vector_knowledge_search"
        );
        assert_eq!(VectorSearchTool::tables(index, 5).name(), "vector_table_search");
    }
}
