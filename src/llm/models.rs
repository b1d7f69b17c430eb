//! Centralized model definitions
//!
//! Every supported model speaks the `OpenAI` chat completions dialect; the
//! provider only decides the default endpoint and which API key applies.

use super::{LlmService, OpenAIService};
use std::sync::Arc;

/// LLM provider enumeration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Groq,
    OpenAI,
}

impl Provider {
    pub fn display_name(self) -> &'static str {
        match self {
            Provider::Groq => "Groq",
            Provider::OpenAI => "OpenAI",
        }
    }

    pub fn api_key_env_var(self) -> &'static str {
        match self {
            Provider::Groq => "GROQ_API_KEY",
            Provider::OpenAI => "OPENAI_API_KEY",
        }
    }

    pub fn default_base_url(self) -> &'static str {
        match self {
            Provider::Groq => "https://api.groq.com/openai/v1",
            Provider::OpenAI => "https://api.openai.com/v1",
        }
    }
}

/// Model definition with metadata
#[derive(Debug, Clone)]
pub struct ModelDef {
    /// User-facing model ID
    pub id: &'static str,
    pub provider: Provider,
    /// Name sent in the request body
    pub api_name: &'static str,
    pub description: &'static str,
}

impl ModelDef {
    /// Build the service for this model; `base_url` overrides the provider endpoint
    pub fn create(
        &self,
        api_key: &str,
        base_url: Option<&str>,
    ) -> Result<Arc<dyn LlmService>, String> {
        if api_key.is_empty() {
            return Err(format!(
                "{} requires {}",
                self.id,
                self.provider.api_key_env_var()
            ));
        }
        let base_url = base_url.unwrap_or_else(|| self.provider.default_base_url());
        let service = OpenAIService::new(
            api_key.to_string(),
            self.id,
            self.api_name,
            base_url,
        )
        .map_err(|e| e.message)?;
        Ok(Arc::new(service))
    }
}

/// Get all available model definitions
pub fn all_models() -> &'static [ModelDef] {
    &[
        ModelDef {
            id: "qwen-qwq-32b",
            provider: Provider::Groq,
            api_name: "qwen-qwq-32b",
            description: "Qwen QwQ 32B (reasoning, emits <think> spans)",
        },
        ModelDef {
            id: "llama-3.3-70b-versatile",
            provider: Provider::Groq,
            api_name: "llama-3.3-70b-versatile",
            description: "Llama 3.3 70B (balanced)",
        },
        ModelDef {
            id: "llama-3.1-8b-instant",
            provider: Provider::Groq,
            api_name: "llama-3.1-8b-instant",
            description: "Llama 3.1 8B (fast, cheap)",
        },
        ModelDef {
            id: "gpt-4o",
            provider: Provider::OpenAI,
            api_name: "gpt-4o",
            description: "GPT-4o (balanced, multimodal)",
        },
        ModelDef {
            id: "gpt-4o-mini",
            provider: Provider::OpenAI,
            api_name: "gpt-4o-mini",
            description: "GPT-4o Mini (fast, cheap)",
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_model_ids_unique() {
        let ids: HashSet<_> = all_models().iter().map(|m| m.id).collect();
        assert_eq!(ids.len(), all_models().len());
    }

    #[test]
    fn test_create_requires_key() {
        let def = &all_models()[0];
        let err = def.create("", None).err().unwrap();
        assert!(err.contains("GROQ_API_KEY"));
        assert!(def.create("key", None).is_ok());
    }
}
