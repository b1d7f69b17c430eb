//! One question in, one answer out: classify, dispatch, run the pipeline,
//! read the last message.

use crate::classifier::{Classifier, IntentLabel};
use crate::conversation::ConversationState;
use crate::dispatch::Dispatcher;
use crate::pipeline::{Pipeline, PipelineError, PipelineKind};
use std::sync::Arc;

pub struct Orchestrator {
    classifier: Classifier,
    dispatcher: Dispatcher,
    /// Raw route name that replaces classification when set
    forced_route: Option<String>,
}

/// Everything a caller may want to know about a finished turn
#[derive(Debug)]
pub struct TurnOutcome {
    pub label: IntentLabel,
    pub kind: PipelineKind,
    pub answer: String,
    pub state: ConversationState,
}

impl Orchestrator {
    pub fn new(classifier: Classifier, dispatcher: Dispatcher) -> Self {
        Self {
            classifier,
            dispatcher,
            forced_route: None,
        }
    }

    /// Skip the classifier and send every question to `route`.
    ///
    /// Unknown route names fall back to `general_llm`, as in dispatch.
    pub fn with_forced_route(mut self, route: impl Into<String>) -> Self {
        self.forced_route = Some(route.into());
        self
    }

    pub async fn answer(&self, question: &str) -> Result<TurnOutcome, PipelineError> {
        if let Some(route) = &self.forced_route {
            let label = route.parse().unwrap_or(IntentLabel::GeneralLlm);
            return self
                .execute(label, self.dispatcher.dispatch_name(route), question)
                .await;
        }

        let label = match self.classifier.classify(question).await {
            Ok(label) => label,
            Err(e) => {
                tracing::warn!(error = %e, "Classification failed, using general_llm");
                IntentLabel::GeneralLlm
            }
        };
        self.run(label, question).await
    }

    /// Run a turn with a label chosen by the caller
    pub async fn run(
        &self,
        label: IntentLabel,
        question: &str,
    ) -> Result<TurnOutcome, PipelineError> {
        self.execute(label, self.dispatcher.dispatch(label), question)
            .await
    }

    async fn execute(
        &self,
        label: IntentLabel,
        pipeline: Arc<dyn Pipeline>,
        question: &str,
    ) -> Result<TurnOutcome, PipelineError> {
        let kind = pipeline.kind();
        tracing::info!(label = %label, pipeline = %kind, "Dispatching question");

        let state = pipeline.invoke(ConversationState::new(question)).await?;
        let answer = state.answer().unwrap_or_else(|| state.latest_content());
        tracing::debug!(steps = ?state.visited(), "Turn finished");

        Ok(TurnOutcome {
            label,
            kind,
            answer,
            state,
        })
    }
}
