use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use super::{Parse, non_empty_str, normalize_parameters, pop_keys};
use crate::data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler};
use crate::error::{Error, Result};

const SAMPLER_PARAMS: &[&str] = &["seed", "strength", "noise", "scale", "steps"];

/// `"Stable Diffusion XL C1E1DE52"` → name, hash.
static SOURCE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.*?)\s+([A-Z0-9]+)$").expect("valid regex"));

/// NovelAI writes a JSON `Comment` next to `Description` (the prompt) and
/// `Source` (model and hash). Re-encoded images may carry the same data as a
/// single `parameters` object with `prompt` and `source` keys.
#[derive(Debug, Clone)]
pub struct NovelAiParser {
    normalize: bool,
}

impl NovelAiParser {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for NovelAiParser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Parse for NovelAiParser {
    fn generator(&self) -> Generator {
        Generator::NovelAi
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let (mut metadata, description, source) = read_fields(bag)
            .map_err(|e| Error::parse(format!("Error reading parameter values: {e}")))?;

        let sampler_name = non_empty_str(metadata.shift_remove("sampler").as_ref())
            .ok_or_else(|| Error::parse("No sampler found: sampler name not found"))?;

        let parameters = normalize_parameters(
            self.normalize,
            pop_keys(SAMPLER_PARAMS, &mut metadata),
            &[],
            true,
            true,
        );

        let prompts = description
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(Prompt::new)
            .into_iter()
            .collect();
        let negative_prompts = non_empty_str(metadata.shift_remove("uc").as_ref())
            .map(Prompt::new)
            .into_iter()
            .collect();

        let model = match source.as_deref().and_then(|s| SOURCE_RE.captures(s)) {
            Some(caps) => Some(Arc::new(Model::new(
                Some(caps[1].to_string()),
                Some(caps[2].to_string()),
            )?)),
            None => None,
        };

        let sampler = Sampler::new(sampler_name, parameters)
            .with_model(model)
            .with_prompts(prompts)
            .with_negative_prompts(negative_prompts);

        Ok(PromptInfo::new(self.generator(), vec![sampler], metadata, bag.clone()))
    }
}

/// Decoded settings object, prompt text and source string.
fn read_fields(bag: &MetadataMap) -> Result<(MetadataMap, Option<String>, Option<String>), String> {
    match bag.get("parameters") {
        Some(Value::String(s)) if !s.is_empty() => {
            let settings = decode_object(s)?;
            let prompt = string_field(&settings, "prompt");
            let source = string_field(&settings, "source");
            Ok((settings, prompt, source))
        }
        Some(Value::Object(settings)) => {
            let prompt = string_field(settings, "prompt");
            let source = string_field(settings, "source");
            Ok((settings.clone(), prompt, source))
        }
        _ => {
            let settings = match bag.get("Comment").and_then(Value::as_str) {
                Some(comment) if !comment.is_empty() => decode_object(comment)?,
                _ => MetadataMap::new(),
            };
            Ok((
                settings,
                string_field(bag, "Description"),
                string_field(bag, "Source"),
            ))
        }
    }
}

fn decode_object(text: &str) -> Result<MetadataMap, String> {
    match serde_json::from_str::<Value>(text) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err("expected a JSON object".into()),
        Err(e) => Err(e.to_string()),
    }
}

fn string_field(map: &MetadataMap, key: &str) -> Option<String> {
    map.get(key).and_then(Value::as_str).map(str::to_string)
}
