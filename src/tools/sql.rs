//! Query generation and read-only query execution

use super::{parse_input, Tool, ToolError, ToolOutput};
use crate::llm::{strip_reasoning, LlmRequest, LlmService};
use crate::sql::SqlBackend;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::Arc;

const READ_ONLY_LEADS: &[&str] = &["SELECT", "WITH", "EXPLAIN"];

const FORBIDDEN_KEYWORDS: &[&str] = &[
    "INSERT", "UPDATE", "DELETE", "DROP", "ALTER", "CREATE", "ATTACH", "DETACH", "PRAGMA",
    "VACUUM", "REINDEX", "TRUNCATE", "GRANT", "REVOKE",
];

/// Comment-free view of a query, split into literal-preserving text and a
/// mask where quoted contents are blanked out.
struct Scanned {
    text: Vec<char>,
    mask: Vec<char>,
}

fn scan(query: &str) -> Result<Scanned, ToolError> {
    let chars: Vec<char> = query.chars().collect();
    let mut text = Vec::with_capacity(chars.len());
    let mut mask = Vec::with_capacity(chars.len());
    // Closing character of the open quoted span
    let mut quote: Option<char> = None;
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        if let Some(q) = quote {
            text.push(c);
            mask.push(if c == q { c } else { ' ' });
            if c == q {
                quote = None;
            }
            i += 1;
            continue;
        }

        match (c, chars.get(i + 1)) {
            ('-', Some('-')) => {
                while i < chars.len() && chars[i] != '\n' {
                    i += 1;
                }
            }
            ('/', Some('*')) => {
                i += 2;
                while i < chars.len() && !(chars[i] == '*' && chars.get(i + 1) == Some(&'/')) {
                    i += 1;
                }
                i += 2;
                text.push(' ');
                mask.push(' ');
            }
            ('\'' | '"' | '`', _) => {
                quote = Some(c);
                text.push(c);
                mask.push(c);
                i += 1;
            }
            ('[', _) => {
                quote = Some(']');
                text.push(c);
                mask.push(c);
                i += 1;
            }
            _ => {
                text.push(c);
                mask.push(c);
                i += 1;
            }
        }
    }

    if quote.is_some() {
        return Err(ToolError::Failed("Unterminated quoted literal".to_string()));
    }
    Ok(Scanned { text, mask })
}

/// Check that `query` is a single read-only statement.
///
/// Returns the statement with comments and the trailing semicolon removed.
pub fn ensure_read_only(query: &str) -> Result<String, ToolError> {
    let Scanned { text, mask } = scan(query)?;

    let end = mask.iter().position(|&c| c == ';').unwrap_or(mask.len());
    if mask[end..].iter().any(|&c| c != ';' && !c.is_whitespace()) {
        return Err(ToolError::Failed(
            "Only a single statement is allowed".to_string(),
        ));
    }

    let statement: String = text[..end].iter().collect::<String>().trim().to_string();
    if statement.is_empty() {
        return Err(ToolError::Failed("Query is empty".to_string()));
    }

    let masked: String = mask[..end].iter().collect();
    let words: Vec<String> = masked
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|w| !w.is_empty())
        .map(str::to_ascii_uppercase)
        .collect();

    match words.first() {
        Some(lead) if READ_ONLY_LEADS.contains(&lead.as_str()) => {}
        _ => {
            return Err(ToolError::Failed(
                "Only read-only SELECT queries are allowed".to_string(),
            ))
        }
    }

    if let Some(word) = words
        .iter()
        .find(|w| FORBIDDEN_KEYWORDS.contains(&w.as_str()))
    {
        return Err(ToolError::Failed(format!("{word} is not allowed in a read-only query")));
    }
    // REPLACE alone is also a string function
    if words.windows(2).any(|w| w[0] == "REPLACE" && w[1] == "INTO") {
        return Err(ToolError::Failed(
            "REPLACE is not allowed in a read-only query".to_string(),
        ));
    }

    Ok(statement)
}

/// Pull the bare query out of a model reply: drops reasoning spans,
/// markdown fences and a leading language tag.
fn extract_query(raw: &str) -> String {
    let text = strip_reasoning(raw);
    let body = match text.split_once("```") {
        Some((_, rest)) => {
            let inner = rest.split("```").next().unwrap_or(rest);
            match inner.split_once('\n') {
                Some((tag, code)) if tag.trim().chars().all(|c| c.is_ascii_alphanumeric()) => code,
                _ => inner,
            }
        }
        None => text.as_str(),
    };
    let body = body.trim();
    body.strip_prefix("SQL Query:").unwrap_or(body).trim().to_string()
}

/// Turns a question plus schema into one SQL query using the model
pub struct GenerateSqlQueryTool {
    llm: Arc<dyn LlmService>,
}

#[derive(Debug, Deserialize)]
struct GenerateInput {
    schema: String,
    question: String,
}

impl GenerateSqlQueryTool {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self { llm }
    }

    fn prompt(schema: &str, question: &str) -> String {
        format!(
            "You are a SQL expert. Given the database schema and a user question, \
             generate a safe, read-only SQL SELECT query.\n\
             Write ONLY the SQL query (no markdown, no backticks, no explanation).\n\n\
             Schema:\n{schema}\n\n\
             Question: {question}\n\n\
             SQL Query:"
        )
    }
}

#[async_trait]
impl Tool for GenerateSqlQueryTool {
    fn name(&self) -> &'static str {
        super::names::GENERATE_SQL_QUERY
    }

    fn description(&self) -> String {
        "Given a user question, table descriptions and the database schema, return a safe SQL SELECT query that answers it.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["schema", "question"],
            "properties": {
                "schema": { "type": "string", "description": "Database schema and table descriptions" },
                "question": { "type": "string", "description": "The user's question" }
            }
        })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let GenerateInput { schema, question } = parse_input(input)?;
        let request = LlmRequest::prompt(Self::prompt(&schema, &question));

        let response = self
            .llm
            .complete(&request)
            .await
            .map_err(|e| ToolError::Failed(format!("Query generation failed: {e}")))?;

        let query = extract_query(&response.text());
        if query.is_empty() {
            return Err(ToolError::Failed("Model returned an empty query".to_string()));
        }
        tracing::debug!(query = %query, "Generated SQL query");
        Ok(ToolOutput::text(query))
    }
}

/// Runs a read-only query against the database backend
pub struct ExecuteSqlQueryTool {
    backend: Arc<dyn SqlBackend>,
}

#[derive(Debug, Deserialize)]
struct ExecuteInput {
    sql_query: String,
}

impl ExecuteSqlQueryTool {
    pub fn new(backend: Arc<dyn SqlBackend>) -> Self {
        Self { backend }
    }
}

#[async_trait]
impl Tool for ExecuteSqlQueryTool {
    fn name(&self) -> &'static str {
        super::names::EXECUTE_SQL_QUERY
    }

    fn description(&self) -> String {
        "Execute a read-only SQL SELECT query on the database and return the rows as text.".to_string()
    }

    fn input_schema(&self) -> Value {
        json!({
            "type": "object",
            "required": ["sql_query"],
            "properties": {
                "sql_query": { "type": "string", "description": "A single SELECT statement" }
            }
        })
    }

    async fn run(&self, input: Value) -> Result<ToolOutput, ToolError> {
        let ExecuteInput { sql_query } = parse_input(input)?;
        let statement = ensure_read_only(&sql_query)?;
        tracing::info!(query = %statement, "Executing SQL query");
        Ok(ToolOutput::text(self.backend.execute(&statement).await))
    }
}
