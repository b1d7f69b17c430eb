//! Label → pipeline lookup with a mandatory `general_llm` fallback

use crate::classifier::IntentLabel;
use crate::pipeline::{Pipeline, PipelineConstructionError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct DispatcherBuilder {
    routes: HashMap<IntentLabel, Arc<dyn Pipeline>>,
}

impl DispatcherBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind(mut self, label: IntentLabel, pipeline: Arc<dyn Pipeline>) -> Self {
        self.routes.insert(label, pipeline);
        self
    }

    pub fn build(self) -> Result<Dispatcher, PipelineConstructionError> {
        let fallback = self
            .routes
            .get(&IntentLabel::GeneralLlm)
            .cloned()
            .ok_or(PipelineConstructionError::MissingDefault)?;

        for label in IntentLabel::ALL {
            if !self.routes.contains_key(&label) {
                tracing::info!(label = %label, "No pipeline bound, will use general_llm");
            }
        }
        Ok(Dispatcher {
            routes: self.routes,
            fallback,
        })
    }
}

/// Read-only after construction
pub struct Dispatcher {
    routes: HashMap<IntentLabel, Arc<dyn Pipeline>>,
    fallback: Arc<dyn Pipeline>,
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::new()
    }

    pub fn dispatch(&self, label: IntentLabel) -> Arc<dyn Pipeline> {
        self.routes
            .get(&label)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    /// Like `dispatch`, for raw label text; unknown text falls back
    pub fn dispatch_name(&self, name: &str) -> Arc<dyn Pipeline> {
        match name.parse::<IntentLabel>() {
            Ok(label) => self.dispatch(label),
            Err(_) => self.fallback.clone(),
        }
    }

    pub fn is_bound(&self, label: IntentLabel) -> bool {
        self.routes.contains_key(&label)
    }
}
