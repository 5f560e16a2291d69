use serde::{Deserialize, Serialize};
use std::fmt;

use super::MetadataMap;

/// A single positive or negative text prompt.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Prompt {
    pub value: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt_id: Option<String>,
    /// Generator specific extras, e.g. prompt weights.
    pub metadata: MetadataMap,
}

impl Prompt {
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            prompt_id: None,
            metadata: MetadataMap::new(),
        }
    }

    pub fn with_id(mut self, prompt_id: impl Into<String>) -> Self {
        self.prompt_id = Some(prompt_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    /// Identity used when deduplicating prompts across samplers.
    pub(crate) fn dedup_key(&self) -> String {
        format!("{}:{}", self.prompt_id.as_deref().unwrap_or(""), self.value)
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}
