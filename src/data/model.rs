use serde::{Deserialize, Serialize};
use std::fmt;

use super::MetadataMap;
use crate::error::{Error, Result};

/// A checkpoint model used during generation.
///
/// At least one of `name` and `hash` is always set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Model {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model_id: Option<String>,
    pub metadata: MetadataMap,
}

impl Model {
    /// Build a model from a name and/or hash. Empty strings count as absent.
    pub fn new(name: Option<String>, hash: Option<String>) -> Result<Self> {
        let name = name.filter(|n| !n.is_empty());
        let hash = hash.filter(|h| !h.is_empty());
        if name.is_none() && hash.is_none() {
            return Err(Error::InvalidArgument(
                "Either name or hash need to be given.".to_string(),
            ));
        }
        Ok(Self {
            name,
            hash,
            model_id: None,
            metadata: MetadataMap::new(),
        })
    }

    pub fn with_id(mut self, model_id: impl Into<String>) -> Self {
        self.model_id = Some(model_id.into());
        self
    }

    pub fn with_metadata(mut self, metadata: MetadataMap) -> Self {
        self.metadata = metadata;
        self
    }

    pub(crate) fn dedup_key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.model_id.as_deref().unwrap_or(""),
            self.name.as_deref().unwrap_or(""),
            self.hash.as_deref().unwrap_or("")
        )
    }
}

impl fmt::Display for Model {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.hash) {
            (Some(name), Some(hash)) => write!(f, "{name} ({hash})"),
            (Some(name), None) => f.write_str(name),
            (None, Some(hash)) => f.write_str(hash),
            (None, None) => Ok(()),
        }
    }
}
