//! Intent RAG - intent-routed question answering
//!
//! Each question is classified, dispatched to a pipeline (SQL lookup,
//! document retrieval, auxiliary tools or a plain model reply) and answered
//! on stdout.

mod classifier;
mod cli;
mod config;
mod conversation;
mod dispatch;
mod llm;
mod orchestrator;
mod pipeline;
mod retrieval;
mod sql;
mod tools;

#[cfg(test)]
mod testing;

use classifier::{example_documents, Classifier, IntentLabel, DEFAULT_EXAMPLE_COUNT};
use clap::Parser;
use config::{ensure_default_model, Cli};
use dispatch::Dispatcher;
use llm::{LlmService, ModelRegistry};
use orchestrator::Orchestrator;
use pipeline::{
    GeneralAnswerPipeline, Pipeline, SemanticRetrievalPipeline, StructuredDataPipeline,
    ToolLoopPipeline,
};
use retrieval::{Embedder, MemoryIndex, OpenAIEmbedder, SemanticIndex};
use sql::{describe_schema, SqlBackend, SqliteBackend};
use std::path::PathBuf;
use std::sync::Arc;
use tools::{StandardTools, ToolRegistry};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

fn init_logging(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "intent_rag=info".into());
    let registry = tracing_subscriber::registry().with(filter);

    // stderr keeps stdout for answers
    if json {
        registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_current_span(false)
                    .with_span_list(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    } else {
        registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    }
}

async fn build_index(
    embedder: &Arc<dyn Embedder>,
    paths: &[PathBuf],
    what: &str,
) -> Result<Option<Arc<dyn SemanticIndex>>, Box<dyn std::error::Error>> {
    if paths.is_empty() {
        tracing::info!(index = what, "No files given, index disabled");
        return Ok(None);
    }
    let index = MemoryIndex::from_files(embedder.clone(), paths).await?;
    if index.is_empty() {
        tracing::warn!(index = what, "Corpus produced no chunks, index disabled");
        return Ok(None);
    }
    tracing::info!(index = what, chunks = index.len(), "Index built");
    Ok(Some(Arc::new(index)))
}

/// Few-shot examples are optional; without them the classifier runs zero-shot
async fn build_example_index(embedder: Arc<dyn Embedder>) -> Option<Arc<dyn SemanticIndex>> {
    match MemoryIndex::build(embedder, example_documents()).await {
        Ok(index) => {
            let index: Arc<dyn SemanticIndex> = Arc::new(index);
            Some(index)
        }
        Err(e) => {
            tracing::warn!(error = %e, "Classifier examples unavailable, classifying zero-shot");
            None
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.log_json);

    // Model backend
    let registry = ModelRegistry::new(&cli.llm_config());
    ensure_default_model(&registry)?;
    let llm: Arc<dyn LlmService> = registry.default().ok_or(config::ConfigError::NoModel)?;
    tracing::info!(
        models = ?registry.available_models(),
        default = %registry.default_model_id(),
        "LLM registry initialized"
    );

    // Database
    let sql: Option<Arc<dyn SqlBackend>> = match cli.db_config() {
        Some(db_config) => {
            let backend = SqliteBackend::connect(&db_config).await?;
            let tables = backend.schema().await?;
            tracing::info!(tables = tables.len(), "Database schema loaded");
            tracing::debug!(schema = %describe_schema(&tables), "Database tables");
            let backend: Arc<dyn SqlBackend> = Arc::new(backend);
            Some(backend)
        }
        None => {
            tracing::info!("DATABASE_URL not set, db_search will use general_llm");
            None
        }
    };

    // Embedding-backed indexes
    let (knowledge, tables, examples) = match cli.embedding_config() {
        Some(embedding_config) => {
            let embedder: Arc<dyn Embedder> = Arc::new(OpenAIEmbedder::new(&embedding_config)?);
            let knowledge = build_index(&embedder, &cli.documents, "knowledge").await?;
            let tables = build_index(&embedder, &cli.table_descriptions, "tables").await?;
            let examples = build_example_index(embedder).await;
            (knowledge, tables, examples)
        }
        None => {
            tracing::info!("EMBEDDING_API_KEY not set, semantic search disabled");
            (None, None, None)
        }
    };

    // Tools and pipelines
    let tools = Arc::new(ToolRegistry::standard(&StandardTools {
        llm: llm.clone(),
        sql: sql.clone(),
        knowledge: knowledge.clone(),
        tables: tables.clone(),
        weather_url: cli.weather_url.clone(),
        top_k: cli.top_k,
    })?);
    tracing::info!(tools = ?tools.names(), "Tool registry built");

    let general: Arc<dyn Pipeline> = Arc::new(GeneralAnswerPipeline::new(llm.clone()));
    let tool_loop: Arc<dyn Pipeline> = Arc::new(
        ToolLoopPipeline::new(llm.clone(), tools.clone())?.with_max_rounds(cli.max_tool_rounds)?,
    );
    let mut builder = Dispatcher::builder()
        .bind(IntentLabel::GeneralLlm, general)
        .bind(IntentLabel::OtherTool, tool_loop);

    if let Some(sql) = sql {
        let mut structured = StructuredDataPipeline::new(sql, tools.clone())?;
        if tables.is_some() {
            structured = structured.with_table_discovery(cli.top_k)?;
        }
        builder = builder.bind(IntentLabel::DbSearch, Arc::new(structured));
    }
    if knowledge.is_some() {
        let retrieval = SemanticRetrievalPipeline::new(llm.clone(), tools.clone())?
            .with_top_k(cli.top_k);
        builder = builder.bind(IntentLabel::VectorSearch, Arc::new(retrieval));
    }
    let dispatcher = builder.build()?;
    tracing::info!(
        db_search = dispatcher.is_bound(IntentLabel::DbSearch),
        vector_search = dispatcher.is_bound(IntentLabel::VectorSearch),
        "Routes bound"
    );

    let mut classifier = Classifier::new(llm);
    if let Some(examples) = examples {
        classifier = classifier.with_examples(examples, DEFAULT_EXAMPLE_COUNT);
    }

    let mut orchestrator = Orchestrator::new(classifier, dispatcher);
    if let Some(route) = cli.route.as_deref().filter(|r| !r.trim().is_empty()) {
        tracing::info!(route, "Classifier bypassed");
        orchestrator = orchestrator.with_forced_route(route.trim());
    }
    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    cli::run_repl(&orchestrator, stdin, tokio::io::stdout()).await?;

    Ok(())
}
