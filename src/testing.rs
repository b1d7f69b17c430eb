//! Test doubles for the model backend, tools, search indexes and the database
//!
//! Every double can share a `CallLog` so tests can assert the order in which
//! collaborators were called.

use crate::llm::{LlmError, LlmRequest, LlmResponse, LlmService};
use crate::retrieval::{Embedder, IndexError, SemanticIndex};
use crate::sql::{ColumnInfo, DbResult, SqlBackend, TableSchema};
use crate::tools::{Tool, ToolError, ToolOutput};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

pub type CallLog = Arc<Mutex<Vec<String>>>;

pub fn call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

fn record(log: Option<&CallLog>, entry: &str) {
    if let Some(log) = log {
        log.lock().unwrap().push(entry.to_string());
    }
}

// ============================================================================
// Mock LLM Client
// ============================================================================

/// Scripted model: replies are popped from a queue, requests are recorded
pub struct MockLlmClient {
    responses: Mutex<VecDeque<Result<LlmResponse, LlmError>>>,
    model_id: String,
    requests: Mutex<Vec<LlmRequest>>,
    log: Option<CallLog>,
}

impl MockLlmClient {
    pub fn new(model_id: impl Into<String>) -> Self {
        Self {
            responses: Mutex::new(VecDeque::new()),
            model_id: model_id.into(),
            requests: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn queue_response(&self, response: LlmResponse) {
        self.responses.lock().unwrap().push_back(Ok(response));
    }

    pub fn queue_text(&self, text: &str) {
        self.queue_response(LlmResponse::from_text(text));
    }

    pub fn queue_error(&self, error: LlmError) {
        self.responses.lock().unwrap().push_back(Err(error));
    }

    pub fn recorded_requests(&self) -> Vec<LlmRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl LlmService for MockLlmClient {
    async fn complete(&self, request: &LlmRequest) -> Result<LlmResponse, LlmError> {
        record(self.log.as_ref(), "llm");
        self.requests.lock().unwrap().push(request.clone());
        self.responses
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(LlmError::network("No mock response queued")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

// ============================================================================
// Mock Tool
// ============================================================================

/// Tool with a fixed output that records its inputs
pub struct MockTool {
    name: &'static str,
    output: ToolOutput,
    inputs: Mutex<Vec<Value>>,
    log: Option<CallLog>,
}

impl MockTool {
    pub fn new(name: &'static str, output: ToolOutput) -> Self {
        Self {
            name,
            output,
            inputs: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn inputs(&self) -> Vec<Value> {
        self.inputs.lock().unwrap().clone()
    }
}

#[async_trait]
impl Tool for MockTool {
    fn name(&self) -> &'static str {
        self.name
    }

    fn description(&self) -> String {
        format!("Mock {}", self.name)
    }

    fn input_schema(&self) -> Value {
        json!({ "type": "object" })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        record(self.log.as_ref(), self.name);
        self.inputs.lock().unwrap().push(input);
        Ok(self.output.clone())
    }
}

// ============================================================================
// Search doubles
// ============================================================================

/// Returns its documents in insertion order, truncated to `top_k`
pub struct StubIndex {
    documents: Vec<String>,
    queries: Mutex<Vec<String>>,
}

impl StubIndex {
    pub fn new<S: Into<String>>(documents: impl IntoIterator<Item = S>) -> Self {
        Self {
            documents: documents.into_iter().map(Into::into).collect(),
            queries: Mutex::new(Vec::new()),
        }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().unwrap().clone()
    }
}

#[async_trait]
impl SemanticIndex for StubIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, IndexError> {
        self.queries.lock().unwrap().push(query.to_string());
        Ok(self.documents.iter().take(top_k).cloned().collect())
    }
}

/// Index whose backend is always down
pub struct FailingIndex;

#[async_trait]
impl SemanticIndex for FailingIndex {
    async fn search(&self, _query: &str, _top_k: usize) -> Result<Vec<String>, IndexError> {
        Err(IndexError::Embedding("backend unavailable".to_string()))
    }
}

/// Embedder whose endpoint is always down
pub struct FailingEmbedder;

#[async_trait]
impl Embedder for FailingEmbedder {
    async fn embed_batch(&self, _texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Err(IndexError::Embedding("connection refused".to_string()))
    }
}

/// Deterministic embedder: one dimension per keyword, counting occurrences
pub struct KeywordEmbedder {
    keywords: Vec<String>,
}

impl KeywordEmbedder {
    pub fn new(keywords: &[&str]) -> Self {
        Self {
            keywords: keywords.iter().map(|k| k.to_lowercase()).collect(),
        }
    }
}

#[async_trait]
impl Embedder for KeywordEmbedder {
    #[allow(clippy::cast_precision_loss)]
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, IndexError> {
        Ok(texts
            .iter()
            .map(|text| {
                let text = text.to_lowercase();
                self.keywords
                    .iter()
                    .map(|k| text.matches(k.as_str()).count() as f32)
                    .collect()
            })
            .collect())
    }
}

// ============================================================================
// Database double
// ============================================================================

/// Canned query result and schema; records executed statements
pub struct StubSqlBackend {
    result: String,
    ddl: String,
    executed: Mutex<Vec<String>>,
    log: Option<CallLog>,
}

impl StubSqlBackend {
    pub fn new(result: &str) -> Self {
        Self {
            result: result.to_string(),
            ddl: "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT);".to_string(),
            executed: Mutex::new(Vec::new()),
            log: None,
        }
    }

    pub fn with_ddl(mut self, ddl: &str) -> Self {
        self.ddl = ddl.to_string();
        self
    }

    pub fn with_log(mut self, log: CallLog) -> Self {
        self.log = Some(log);
        self
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().unwrap().clone()
    }
}

#[async_trait]
impl SqlBackend for StubSqlBackend {
    async fn schema(&self) -> DbResult<Vec<TableSchema>> {
        record(self.log.as_ref(), "sql:schema");
        Ok(vec![TableSchema {
            name: "customers".to_string(),
            columns: vec![ColumnInfo {
                name: "id".to_string(),
                data_type: "INTEGER".to_string(),
                nullable: false,
                default: None,
                primary_key: true,
            }],
        }])
    }

    async fn execute(&self, query: &str) -> String {
        record(self.log.as_ref(), "sql:execute");
        self.executed.lock().unwrap().push(query.to_string());
        self.result.clone()
    }

    async fn schema_ddl(&self) -> DbResult<String> {
        record(self.log.as_ref(), "sql:schema_ddl");
        Ok(self.ddl.clone())
    }
}
