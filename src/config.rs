//! Command-line and environment configuration

use crate::llm::{LlmConfig, ModelRegistry, Provider};
use crate::pipeline::{DEFAULT_MAX_TOOL_ROUNDS, DEFAULT_TOP_K};
use crate::retrieval::{EmbeddingConfig, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL};
use crate::sql::DbConfig;
use clap::Parser;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No model credentials configured. Set {} or {}.", Provider::Groq.api_key_env_var(), Provider::OpenAI.api_key_env_var())]
    NoModel,
    #[error("Model {requested} is not available. Available: {}", .available.join(", "))]
    UnknownModel {
        requested: String,
        available: Vec<String>,
    },
}

#[derive(Parser, Debug, Clone)]
#[command(
    name = "intent-rag",
    version,
    about = "Answer questions by routing them to SQL, document search, tools or a plain model reply"
)]
pub struct Cli {
    /// Groq API key
    #[arg(long, env = "GROQ_API_KEY", hide_env_values = true)]
    pub groq_api_key: Option<String>,

    /// OpenAI API key
    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true)]
    pub openai_api_key: Option<String>,

    /// OpenAI-compatible endpoint that overrides the provider default
    #[arg(long, env = "LLM_BASE_URL")]
    pub llm_base_url: Option<String>,

    /// Model used for classification and every pipeline
    #[arg(long, env = "DEFAULT_MODEL")]
    pub model: Option<String>,

    /// sqlx sqlite URL, e.g. sqlite://shop.db
    #[arg(long, env = "DATABASE_URL")]
    pub database_url: Option<String>,

    #[arg(long, env = "DB_MAX_CONNECTIONS", default_value_t = 5)]
    pub db_max_connections: u32,

    /// Key for the embeddings endpoint; enables document and table search
    #[arg(long, env = "EMBEDDING_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,

    #[arg(long, env = "EMBEDDING_BASE_URL", default_value = DEFAULT_EMBEDDING_URL)]
    pub embedding_base_url: String,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = DEFAULT_EMBEDDING_MODEL)]
    pub embedding_model: String,

    /// Knowledge corpus files (.txt, .csv, .yaml)
    #[arg(long = "documents", value_delimiter = ',')]
    pub documents: Vec<PathBuf>,

    /// Table description files (.yaml, .csv, .txt)
    #[arg(long = "table-descriptions", value_delimiter = ',')]
    pub table_descriptions: Vec<PathBuf>,

    /// Propose/Execute rounds before the tool loop rephrases
    #[arg(long, env = "MAX_TOOL_ROUNDS", default_value_t = DEFAULT_MAX_TOOL_ROUNDS)]
    pub max_tool_rounds: usize,

    /// Snippets fetched per search
    #[arg(long, default_value_t = DEFAULT_TOP_K)]
    pub top_k: usize,

    #[arg(long, env = "WEATHER_URL", default_value = "https://wttr.in")]
    pub weather_url: String,

    /// Send every question to this route instead of classifying it
    #[arg(long, env = "FORCE_ROUTE")]
    pub route: Option<String>,

    /// Emit logs as JSON
    #[arg(long)]
    pub log_json: bool,
}

fn non_empty(value: Option<&String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty()).cloned()
}

impl Cli {
    pub fn llm_config(&self) -> LlmConfig {
        LlmConfig {
            groq_api_key: non_empty(self.groq_api_key.as_ref()),
            openai_api_key: non_empty(self.openai_api_key.as_ref()),
            base_url: non_empty(self.llm_base_url.as_ref()),
            default_model: non_empty(self.model.as_ref()),
        }
    }

    pub fn db_config(&self) -> Option<DbConfig> {
        non_empty(self.database_url.as_ref())
            .map(|url| DbConfig::new(url).with_max_connections(self.db_max_connections.max(1)))
    }

    pub fn embedding_config(&self) -> Option<EmbeddingConfig> {
        non_empty(self.embedding_api_key.as_ref()).map(|api_key| EmbeddingConfig {
            api_key,
            base_url: self.embedding_base_url.clone(),
            model: self.embedding_model.clone(),
        })
    }
}

/// Check that the registry can serve the configured default model
pub fn ensure_default_model(registry: &ModelRegistry) -> Result<(), ConfigError> {
    if !registry.has_models() {
        return Err(ConfigError::NoModel);
    }
    if registry.default().is_none() {
        return Err(ConfigError::UnknownModel {
            requested: registry.default_model_id().to_string(),
            available: registry.available_models(),
        });
    }
    Ok(())
}
