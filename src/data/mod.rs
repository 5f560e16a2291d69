//! Canonical data model shared by every generator grammar.
//!
//! A parse produces one [`PromptInfo`] tree: it owns a list of [`Sampler`]s,
//! each owning its [`Prompt`]s and optionally sharing a [`Model`] with other
//! samplers of the same image.

mod generator;
mod model;
mod prompt;
mod prompt_info;
mod sampler;

pub use generator::Generator;
pub use model::Model;
pub use prompt::Prompt;
pub use prompt_info::PromptInfo;
pub use sampler::Sampler;
pub(crate) use sampler::UNKNOWN_SAMPLER;

/// Untyped key/value metadata, insertion ordered.
pub type MetadataMap = serde_json::Map<String, serde_json::Value>;
