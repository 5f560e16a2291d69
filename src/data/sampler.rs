use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{MetadataMap, Model, Prompt};

/// Name given to samplers whose metadata carries no sampler name.
pub(crate) const UNKNOWN_SAMPLER: &str = "unknown";

/// One generation pass: algorithm, numeric knobs, prompts and model.
///
/// Multi-stage pipelines (base + refiner, hires passes, chained ComfyUI
/// samplers) produce one `Sampler` each.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sampler {
    pub name: String,
    /// Steps, cfg scale, seed, scheduler and whatever else the generator stores.
    pub parameters: MetadataMap,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sampler_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<Arc<Model>>,
    pub prompts: Vec<Prompt>,
    pub negative_prompts: Vec<Prompt>,
}

impl Sampler {
    pub fn new(name: impl Into<String>, parameters: MetadataMap) -> Self {
        Self {
            name: name.into(),
            parameters,
            sampler_id: None,
            model: None,
            prompts: Vec::new(),
            negative_prompts: Vec::new(),
        }
    }

    pub fn with_id(mut self, sampler_id: impl Into<String>) -> Self {
        self.sampler_id = Some(sampler_id.into());
        self
    }

    pub fn with_model(mut self, model: Option<Arc<Model>>) -> Self {
        self.model = model;
        self
    }

    pub fn with_prompts(mut self, prompts: Vec<Prompt>) -> Self {
        self.prompts = prompts;
        self
    }

    pub fn with_negative_prompts(mut self, negative_prompts: Vec<Prompt>) -> Self {
        self.negative_prompts = negative_prompts;
        self
    }
}
