use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::sync::Arc;

use super::{Generator, MetadataMap, Model, Prompt, Sampler};
use crate::error::Result;

/// Structured generation parameters read from one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptInfo {
    /// Generator which most likely produced the image.
    pub generator: Generator,
    pub samplers: Vec<Sampler>,
    /// Generator-global values not tied to one sampler (full prompts, loras, styles...).
    pub metadata: MetadataMap,
    /// Extractor output exactly as it was handed to the parser.
    pub raw_parameters: MetadataMap,
}

impl PromptInfo {
    pub fn new(
        generator: Generator,
        samplers: Vec<Sampler>,
        metadata: MetadataMap,
        raw_parameters: MetadataMap,
    ) -> Self {
        Self {
            generator,
            samplers,
            metadata,
            raw_parameters,
        }
    }

    /// The full prompt as stored by the generator, or a `", "` join of all
    /// unique prompts.
    ///
    /// Reproducing the source image from this value is not guaranteed.
    pub fn full_prompt(&self) -> String {
        if let Some(full) = self.metadata.get("full_prompt").and_then(Value::as_str) {
            return full.to_string();
        }
        join_prompts(&self.prompts())
    }

    /// Negative counterpart of [`PromptInfo::full_prompt`].
    pub fn full_negative_prompt(&self) -> String {
        if let Some(full) = self
            .metadata
            .get("full_negative_prompt")
            .and_then(Value::as_str)
        {
            return full.to_string();
        }
        join_prompts(&self.negative_prompts())
    }

    /// Unique positive prompts in order of first appearance.
    pub fn prompts(&self) -> Vec<&Prompt> {
        unique_prompts(self.samplers.iter().flat_map(|s| s.prompts.iter()))
    }

    /// Unique negative prompts in order of first appearance.
    pub fn negative_prompts(&self) -> Vec<&Prompt> {
        unique_prompts(self.samplers.iter().flat_map(|s| s.negative_prompts.iter()))
    }

    /// Unique models in order of first appearance.
    pub fn models(&self) -> Vec<&Arc<Model>> {
        let mut seen = HashSet::new();
        self.samplers
            .iter()
            .filter_map(|s| s.model.as_ref())
            .filter(|m| seen.insert(m.dedup_key()))
            .collect()
    }

    /// Plain map projection, including the computed full prompts.
    pub fn to_value(&self) -> Result<Value> {
        Ok(json!({
            "full_prompt": self.full_prompt(),
            "full_negative_prompt": self.full_negative_prompt(),
            "generator": self.generator,
            "samplers": serde_json::to_value(&self.samplers)?,
            "metadata": self.metadata,
            "rawParameters": self.raw_parameters,
        }))
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string(&self.to_value()?)?)
    }
}

fn unique_prompts<'a>(prompts: impl Iterator<Item = &'a Prompt>) -> Vec<&'a Prompt> {
    let mut seen = HashSet::new();
    prompts.filter(|p| seen.insert(p.dedup_key())).collect()
}

fn join_prompts(prompts: &[&Prompt]) -> String {
    prompts
        .iter()
        .map(|p| p.value.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}
