//! Semantic retrieval: the `SemanticIndex` seam, an in-memory cosine index
//! and the corpus/embedding adapters that feed it.

mod corpus;
mod embedding;

pub use embedding::{
    Embedder, EmbeddingConfig, OpenAIEmbedder, DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL,
};

use corpus::{chunk_documents, load_documents};

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error("Embedding failed: {0}")]
    Embedding(String),
    #[error("Failed to load corpus: {0}")]
    Corpus(String),
}

/// Nearest-neighbour text search, best match first
#[async_trait]
pub trait SemanticIndex: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, IndexError>;
}

/// Cosine similarity; zero when either vector has zero norm
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

struct Entry {
    text: String,
    vector: Vec<f32>,
}

/// Brute-force in-memory index, built once at startup
pub struct MemoryIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<Entry>,
}

impl MemoryIndex {
    pub async fn build(embedder: Arc<dyn Embedder>, texts: Vec<String>) -> Result<Self, IndexError> {
        let vectors = if texts.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&texts).await?
        };
        if vectors.len() != texts.len() {
            return Err(IndexError::Embedding(format!(
                "Expected {} vectors, got {}",
                texts.len(),
                vectors.len()
            )));
        }

        let entries = texts
            .into_iter()
            .zip(vectors)
            .map(|(text, vector)| Entry { text, vector })
            .collect::<Vec<_>>();
        tracing::info!(entries = entries.len(), "Semantic index built");
        Ok(Self { embedder, entries })
    }

    /// Load, chunk and index corpus files
    pub async fn from_files(
        embedder: Arc<dyn Embedder>,
        paths: &[PathBuf],
    ) -> Result<Self, IndexError> {
        let documents = load_documents(paths)?;
        let chunks = chunk_documents(&documents);
        tracing::info!(
            files = paths.len(),
            documents = documents.len(),
            chunks = chunks.len(),
            "Indexing corpus"
        );
        Self::build(embedder, chunks).await
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl SemanticIndex for MemoryIndex {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<String>, IndexError> {
        if self.entries.is_empty() || top_k == 0 {
            return Ok(Vec::new());
        }
        let query_vector = self.embedder.embed(query).await?;

        let mut scored: Vec<(f32, &Entry)> = self
            .entries
            .iter()
            .map(|entry| (cosine_similarity(&query_vector, &entry.vector), entry))
            .collect();
        scored.sort_by(|a, b| b.0.total_cmp(&a.0));

        Ok(scored
            .into_iter()
            .take(top_k)
            .map(|(_, entry)| entry.text.clone())
            .collect())
    }
}
