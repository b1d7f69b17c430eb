//! Intent classification
//!
//! One model call per question. The reply is cleaned of reasoning spans and
//! matched against the label set in a fixed priority order; anything
//! unrecognised routes to `general_llm`.

use crate::llm::{strip_reasoning, LlmError, LlmRequest, LlmService};
use crate::retrieval::SemanticIndex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntentLabel {
    DbSearch,
    VectorSearch,
    InternetSearch,
    OtherTool,
    GeneralLlm,
}

impl IntentLabel {
    pub const ALL: [IntentLabel; 5] = [
        IntentLabel::DbSearch,
        IntentLabel::VectorSearch,
        IntentLabel::InternetSearch,
        IntentLabel::OtherTool,
        IntentLabel::GeneralLlm,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            IntentLabel::DbSearch => "db_search",
            IntentLabel::VectorSearch => "vector_search",
            IntentLabel::InternetSearch => "internet_search",
            IntentLabel::OtherTool => "other_tool",
            IntentLabel::GeneralLlm => "general_llm",
        }
    }

    /// One-line definition shown to the model
    fn definition(self) -> &'static str {
        match self {
            IntentLabel::DbSearch => {
                "Question requires SQL data from a database. The database is about sales, orders, customers, payments etc."
            }
            IntentLabel::VectorSearch => "Question requires information from indexed documents.",
            IntentLabel::InternetSearch => "Question requires current or external web knowledge.",
            IntentLabel::OtherTool => {
                "Question is best handled by a non-LLM tool (like a calculator or a weather lookup)."
            }
            IntentLabel::GeneralLlm => "General reasoning or chit-chat.",
        }
    }
}

impl fmt::Display for IntentLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("Unknown intent label: {0}")]
pub struct UnknownLabel(pub String);

impl FromStr for IntentLabel {
    type Err = UnknownLabel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_ascii_lowercase();
        IntentLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == needle)
            .ok_or_else(|| UnknownLabel(s.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum LabelMatcher {
    Contains(&'static str),
}

impl LabelMatcher {
    fn matches(self, text: &str) -> bool {
        match self {
            LabelMatcher::Contains(needle) => text.contains(needle),
        }
    }
}

/// Checked top to bottom; the first hit wins
pub const LABEL_PRIORITY: &[(IntentLabel, LabelMatcher)] = &[
    (IntentLabel::DbSearch, LabelMatcher::Contains("db_search")),
    (IntentLabel::VectorSearch, LabelMatcher::Contains("vector_search")),
    (IntentLabel::InternetSearch, LabelMatcher::Contains("internet_search")),
    (IntentLabel::OtherTool, LabelMatcher::Contains("other_tool")),
    (IntentLabel::GeneralLlm, LabelMatcher::Contains("general_llm")),
];

/// Map raw model output to a label
pub fn match_label(raw: &str) -> IntentLabel {
    let cleaned = strip_reasoning(raw).to_lowercase();
    LABEL_PRIORITY
        .iter()
        .find(|(_, matcher)| matcher.matches(&cleaned))
        .map_or(IntentLabel::GeneralLlm, |(label, _)| *label)
}

#[derive(Debug, Error)]
pub enum ClassificationError {
    #[error("Classifier model call failed: {0}")]
    Backend(#[from] LlmError),
}

/// Labelled questions used as few-shot examples
pub const EXAMPLES: &[(&str, IntentLabel)] = &[
    ("How many customers are there?", IntentLabel::DbSearch),
    ("What were the total sales last month?", IntentLabel::DbSearch),
    ("List the orders that are still unpaid", IntentLabel::DbSearch),
    ("Which customer placed the most orders?", IntentLabel::DbSearch),
    ("What does the refund policy document say?", IntentLabel::VectorSearch),
    ("Summarize the guide on solar panel maintenance", IntentLabel::VectorSearch),
    ("What qualifications are listed in the handbook?", IntentLabel::VectorSearch),
    ("What is the latest news about the stock market?", IntentLabel::InternetSearch),
    ("Who won yesterday's football match?", IntentLabel::InternetSearch),
    ("What is 25 multiplied by 4?", IntentLabel::OtherTool),
    ("add 2 and 4", IntentLabel::OtherTool),
    ("What is the weather in Paris?", IntentLabel::OtherTool),
    ("hello", IntentLabel::GeneralLlm),
    ("Explain the difference between a list and a tuple", IntentLabel::GeneralLlm),
    ("Write a short poem about autumn", IntentLabel::GeneralLlm),
];

fn format_example(question: &str, label: IntentLabel) -> String {
    format!("Question: {question}\nLabel: {label}")
}

/// Example texts to index for nearest-neighbour selection
pub fn example_documents() -> Vec<String> {
    EXAMPLES
        .iter()
        .map(|(question, label)| format_example(question, *label))
        .collect()
}

pub const DEFAULT_EXAMPLE_COUNT: usize = 5;

pub struct Classifier {
    llm: Arc<dyn LlmService>,
    examples: Option<Arc<dyn SemanticIndex>>,
    example_count: usize,
}

impl Classifier {
    pub fn new(llm: Arc<dyn LlmService>) -> Self {
        Self {
            llm,
            examples: None,
            example_count: DEFAULT_EXAMPLE_COUNT,
        }
    }

    /// Add few-shot examples chosen by similarity to the question
    pub fn with_examples(mut self, index: Arc<dyn SemanticIndex>, count: usize) -> Self {
        self.examples = Some(index);
        self.example_count = count;
        self
    }

    fn system_prompt(examples: &[String]) -> String {
        let mut prompt = String::from(
            "You are an expert classification assistant.\n\
             Given a user question, classify it into exactly one of the following categories:\n\n",
        );
        for (i, label) in IntentLabel::ALL.iter().enumerate() {
            prompt.push_str(&format!("{}. {} - {}\n", i + 1, label, label.definition()));
        }
        if !examples.is_empty() {
            prompt.push_str("\nExamples:\n\n");
            prompt.push_str(&examples.join("\n\n"));
            prompt.push('\n');
        }
        prompt.push_str(
            "\nRespond with only the category label, such as 'db_search' or 'other_tool', and nothing else. \
             Do not explain. Do not use punctuation.",
        );
        prompt
    }

    async fn nearest_examples(&self, question: &str) -> Vec<String> {
        let Some(index) = &self.examples else {
            return Vec::new();
        };
        match index.search(question, self.example_count).await {
            Ok(examples) => examples,
            Err(e) => {
                tracing::warn!(error = %e, "Example lookup failed, classifying without examples");
                Vec::new()
            }
        }
    }

    pub async fn classify(&self, question: &str) -> Result<IntentLabel, ClassificationError> {
        let examples = self.nearest_examples(question).await;
        let request =
            LlmRequest::prompt(question).with_system(Self::system_prompt(&examples));

        let response = self.llm.complete(&request).await?;
        let raw = response.text();
        let label = match_label(&raw);
        tracing::info!(label = %label, examples = examples.len(), "Classified question");
        Ok(label)
    }
}
