//! Corpus loading: text, CSV and YAML files flattened into plain-text
//! documents and split into overlapping chunks.

use super::IndexError;
use serde_json::Value;
use std::path::{Path, PathBuf};

pub const CHUNK_SIZE: usize = 500;
pub const CHUNK_OVERLAP: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub source: String,
    pub content: String,
}

impl Document {
    fn new(path: &Path, content: String) -> Self {
        let source = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Self { source, content }
    }
}

/// Load every supported file; unsupported extensions are skipped with a warning
pub fn load_documents(paths: &[PathBuf]) -> Result<Vec<Document>, IndexError> {
    let mut documents = Vec::new();
    for path in paths {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_ascii_lowercase())
            .unwrap_or_default();

        let loaded = match ext.as_str() {
            "txt" => read_txt(path)?,
            "csv" => read_csv(path)?,
            "yaml" | "yml" => read_yaml(path)?,
            _ => {
                tracing::warn!(path = %path.display(), "Unsupported corpus file type, skipping");
                continue;
            }
        };
        tracing::debug!(path = %path.display(), documents = loaded.len(), "Loaded corpus file");
        documents.extend(loaded);
    }
    Ok(documents)
}

fn corpus_error(path: &Path, e: impl std::fmt::Display) -> IndexError {
    IndexError::Corpus(format!("{}: {e}", path.display()))
}

fn read_txt(path: &Path) -> Result<Vec<Document>, IndexError> {
    let content = std::fs::read_to_string(path).map_err(|e| corpus_error(path, e))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    Ok(vec![Document::new(path, content)])
}

fn read_csv(path: &Path) -> Result<Vec<Document>, IndexError> {
    let mut reader = csv::Reader::from_path(path).map_err(|e| corpus_error(path, e))?;
    let headers = reader.headers().map_err(|e| corpus_error(path, e))?.clone();

    let mut documents = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| corpus_error(path, e))?;
        let content = headers
            .iter()
            .zip(record.iter())
            .map(|(key, value)| format!("{key}: {value}"))
            .collect::<Vec<_>>()
            .join("\n");
        documents.push(Document::new(path, content));
    }
    Ok(documents)
}

fn read_yaml(path: &Path) -> Result<Vec<Document>, IndexError> {
    let raw = std::fs::read_to_string(path).map_err(|e| corpus_error(path, e))?;
    let value: Value = serde_yaml::from_str(&raw).map_err(|e| corpus_error(path, e))?;

    // A top-level list is one document per item
    let items = match value {
        Value::Array(items) => items,
        Value::Null => Vec::new(),
        other => vec![other],
    };
    Ok(items
        .iter()
        .map(flatten)
        .filter(|content| !content.is_empty())
        .map(|content| Document::new(path, content))
        .collect())
}

/// Flatten nested data into `key: value` lines; nested keys joined with `.`,
/// list entries as `[i]`.
pub fn flatten(value: &Value) -> String {
    let mut lines = Vec::new();
    flatten_into(value, "", &mut lines);
    lines.join("\n")
}

fn flatten_into(value: &Value, prefix: &str, lines: &mut Vec<String>) {
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                flatten_into(child, &path, lines);
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                flatten_into(child, &format!("{prefix}[{i}]"), lines);
            }
        }
        Value::String(s) if prefix.is_empty() => lines.push(s.clone()),
        Value::String(s) => lines.push(format!("{prefix}: {s}")),
        other if prefix.is_empty() => lines.push(other.to_string()),
        other => lines.push(format!("{prefix}: {other}")),
    }
}

/// Split text into chunks of at most `size` characters, each starting
/// `overlap` characters before the previous one ended. Breaks at whitespace
/// when one is available in the back half of the window.
pub fn chunk_text(text: &str, size: usize, overlap: usize) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let size = size.max(1);
    let overlap = overlap.min(size - 1);
    let mut chunks = Vec::new();
    let mut start = 0;

    while start < chars.len() {
        let mut end = (start + size).min(chars.len());
        if end < chars.len() {
            if let Some(offset) = chars[start + size / 2..end]
                .iter()
                .rposition(|c| c.is_whitespace())
            {
                end = start + size / 2 + offset + 1;
            }
        }

        let chunk: String = chars[start..end].iter().collect();
        let chunk = chunk.trim();
        if !chunk.is_empty() {
            chunks.push(chunk.to_string());
        }
        if end == chars.len() {
            break;
        }
        // A whitespace break can leave the chunk shorter than the overlap
        start = end.saturating_sub(overlap).max(start + 1);
    }
    chunks
}

/// Chunk every document with the default window
pub fn chunk_documents(documents: &[Document]) -> Vec<String> {
    documents
        .iter()
        .flat_map(|doc| chunk_text(&doc.content, CHUNK_SIZE, CHUNK_OVERLAP))
        .collect()
}
