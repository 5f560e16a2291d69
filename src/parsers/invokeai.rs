//! InvokeAI metadata, in the three layouts the project has used over time:
//!
//! * `invokeai_metadata`: one flat JSON object (3.x and later).
//! * `sd-metadata`: JSON with a `model` section and an `image` section (2.x).
//! * `Dream`: the command line that produced the image (1.x), e.g.
//!   `"a castle [fog]" -s 50 -S 42 -W 512 -H 512 -C 7.5 -A k_lms`.
//!
//! The two legacy layouts put the negative prompt in square brackets inside
//! the prompt text.

use regex::Regex;
use serde_json::Value;
use std::sync::{Arc, LazyLock};

use super::{Parse, json_object_field, non_empty_str, normalize_parameters};
use crate::data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler, UNKNOWN_SAMPLER};
use crate::error::{Error, Result};

const V3_METADATA_KEYS: &[&str] = &["app_version", "generation_mode", "loras", "vae"];

const DREAM_FLAGS: &[(&str, &str)] = &[
    ("s", "steps"),
    ("S", "seed"),
    ("W", "width"),
    ("H", "height"),
    ("C", "cfg_scale"),
    ("A", "sampler"),
    ("f", "strength"),
    ("I", "init_img"),
    ("U", "upscale"),
    ("G", "gfpgan_strength"),
];

static NEGATIVE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[([^\[\]]*)\]").expect("valid regex"));

#[derive(Debug, Clone)]
pub struct InvokeAiParser {
    normalize: bool,
}

impl InvokeAiParser {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for InvokeAiParser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Parse for InvokeAiParser {
    fn generator(&self) -> Generator {
        Generator::InvokeAi
    }

    /// Formats are tried newest first. A field that is present but unreadable
    /// is logged and the next format is tried.
    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let formats: [(&str, &dyn Fn() -> Result<Option<PromptInfo>>); 3] = [
            ("invokeai_metadata", &|| {
                decoded(bag, "invokeai_metadata")?
                    .map(|data| self.parse_invokeai_metadata(data, bag))
                    .transpose()
            }),
            ("sd-metadata", &|| {
                decoded(bag, "sd-metadata")?
                    .map(|data| self.parse_sd_metadata(data, bag))
                    .transpose()
            }),
            ("Dream", &|| {
                non_empty_str(bag.get("Dream"))
                    .map(|dream| self.parse_dream(&dream, bag))
                    .transpose()
            }),
        ];

        for (field, attempt) in formats {
            match attempt() {
                Ok(Some(info)) => return Ok(info),
                Ok(None) => {}
                Err(Error::Parse(msg)) => log::debug!("Skipping InvokeAI {field} field: {msg}"),
                Err(e) => return Err(e),
            }
        }
        Err(Error::parse("No supported InvokeAI metadata format found"))
    }
}

impl InvokeAiParser {
    fn parse_invokeai_metadata(&self, mut data: MetadataMap, bag: &MetadataMap) -> Result<PromptInfo> {
        let prompt = non_empty_str(data.shift_remove("positive_prompt").as_ref());
        let negative_prompt = non_empty_str(data.shift_remove("negative_prompt").as_ref());
        let sampler_name = non_empty_str(data.shift_remove("scheduler").as_ref())
            .unwrap_or_else(|| UNKNOWN_SAMPLER.into());

        let model = match data.shift_remove("model") {
            Some(Value::Object(model)) => build_model(
                non_empty_str(model.get("model_name")).or_else(|| non_empty_str(model.get("name"))),
                non_empty_str(model.get("hash")),
            )?,
            Some(Value::String(name)) => build_model(Some(name), None)?,
            _ => None,
        };

        let mut metadata = MetadataMap::new();
        for key in V3_METADATA_KEYS {
            if let Some(value) = data.shift_remove(*key) {
                metadata.insert((*key).to_string(), value);
            }
        }

        let parameters = normalize_parameters(self.normalize, data, &[], true, true);
        let sampler = Sampler::new(sampler_name, parameters)
            .with_model(model)
            .with_prompts(prompt.map(Prompt::new).into_iter().collect())
            .with_negative_prompts(negative_prompt.map(Prompt::new).into_iter().collect());

        Ok(PromptInfo::new(self.generator(), vec![sampler], metadata, bag.clone()))
    }

    fn parse_sd_metadata(&self, mut data: MetadataMap, bag: &MetadataMap) -> Result<PromptInfo> {
        // 2.x writes `"model": "stable diffusion"` next to `model_weights`.
        let model = match data.get("model") {
            Some(Value::Object(model)) => build_model(
                non_empty_str(model.get("model_name")),
                non_empty_str(model.get("model_hash")),
            )?,
            _ => None,
        };
        if data.get("model").is_some_and(Value::is_object) {
            data.shift_remove("model");
        }
        let weights = non_empty_str(data.shift_remove("model_weights").as_ref());
        let hash = non_empty_str(data.shift_remove("model_hash").as_ref());
        let model = match model {
            Some(model) => Some(model),
            None => build_model(weights, hash)?,
        };

        let mut image = match data.shift_remove("image") {
            Some(Value::Object(image)) => image,
            Some(_) => return Err(Error::parse("sd-metadata image section is not an object")),
            None => MetadataMap::new(),
        };
        let sampler_name = non_empty_str(image.shift_remove("sampler").as_ref())
            .unwrap_or_else(|| UNKNOWN_SAMPLER.into());
        let prompt_text = image.shift_remove("prompt").map(prompt_text).unwrap_or_default();
        let (prompts, negative_prompts) = split_prompt(&prompt_text);

        let parameters = normalize_parameters(self.normalize, image, &[], true, true);
        let sampler = Sampler::new(sampler_name, parameters)
            .with_model(model)
            .with_prompts(prompts)
            .with_negative_prompts(negative_prompts);

        Ok(PromptInfo::new(self.generator(), vec![sampler], data, bag.clone()))
    }

    fn parse_dream(&self, dream: &str, bag: &MetadataMap) -> Result<PromptInfo> {
        let command = parse_dream_command(dream);
        let mut options: MetadataMap = command.options.into_iter().collect();
        let sampler_name = non_empty_str(options.shift_remove("sampler").as_ref())
            .unwrap_or_else(|| UNKNOWN_SAMPLER.into());
        let (prompts, negative_prompts) = split_prompt(&command.prompt);

        let parameters = normalize_parameters(self.normalize, options, &[], true, true);
        let sampler = Sampler::new(sampler_name, parameters)
            .with_prompts(prompts)
            .with_negative_prompts(negative_prompts);

        Ok(PromptInfo::new(self.generator(), vec![sampler], MetadataMap::new(), bag.clone()))
    }
}

fn decoded(bag: &MetadataMap, field: &str) -> Result<Option<MetadataMap>> {
    json_object_field(bag, field).map_err(|e| Error::parse(format!("Error decoding {field}: {e}")))
}

fn build_model(name: Option<String>, hash: Option<String>) -> Result<Option<Arc<Model>>> {
    if name.is_none() && hash.is_none() {
        return Ok(None);
    }
    Ok(Some(Arc::new(Model::new(name, hash)?)))
}

/// `image.prompt` is either text or a list of weighted `{prompt, weight}` parts.
fn prompt_text(value: Value) -> String {
    match value {
        Value::String(text) => text,
        Value::Array(parts) => parts
            .iter()
            .filter_map(|part| match part {
                Value::String(s) => Some(s.as_str()),
                other => other.get("prompt").and_then(Value::as_str),
            })
            .collect::<Vec<_>>()
            .join(" "),
        _ => String::new(),
    }
}

/// Bracketed segments are the negative prompt.
fn split_prompt(text: &str) -> (Vec<Prompt>, Vec<Prompt>) {
    let negatives: Vec<&str> = NEGATIVE_RE
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim())
        .filter(|s| !s.is_empty())
        .collect();
    let positive = NEGATIVE_RE
        .replace_all(text, " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");

    let prompts = if positive.is_empty() {
        Vec::new()
    } else {
        vec![Prompt::new(positive)]
    };
    let negative_prompts = if negatives.is_empty() {
        Vec::new()
    } else {
        vec![Prompt::new(negatives.join(", "))]
    };
    (prompts, negative_prompts)
}

#[derive(Debug, PartialEq)]
struct DreamCommand {
    prompt: String,
    options: Vec<(String, Value)>,
}

#[derive(Debug, PartialEq)]
struct Token {
    text: String,
    quoted: bool,
}

impl Token {
    fn flag_name(&self) -> Option<&str> {
        if self.quoted {
            return None;
        }
        let name = self.text.strip_prefix('-')?;
        let name = name.strip_prefix('-').unwrap_or(name);
        name.chars()
            .next()
            .filter(|c| c.is_ascii_alphabetic())
            .map(|_| name)
    }
}

/// Split on whitespace; double quotes group and `\"` escapes a quote inside them.
fn tokenize(input: &str) -> Vec<Token> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    let mut in_quotes = false;
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if in_quotes && chars.peek() == Some(&'"') => {
                current.push('"');
                chars.next();
            }
            '"' => {
                in_quotes = !in_quotes;
                quoted = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() || quoted {
                    tokens.push(Token {
                        text: std::mem::take(&mut current),
                        quoted,
                    });
                }
                quoted = false;
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() || quoted {
        tokens.push(Token { text: current, quoted });
    }
    tokens
}

fn parse_dream_command(input: &str) -> DreamCommand {
    let tokens = tokenize(input);
    let mut iter = tokens.iter().peekable();

    let mut prompt_parts = Vec::new();
    while let Some(token) = iter.next_if(|t| t.flag_name().is_none()) {
        prompt_parts.push(token.text.as_str());
    }

    let mut options = Vec::new();
    while let Some(token) = iter.next() {
        let Some(flag) = token.flag_name() else {
            continue;
        };
        let (name, inline) = match flag.split_once('=') {
            Some((name, value)) => (name, Some(value.to_string())),
            None => (flag, None),
        };
        let value = match inline {
            Some(value) => value,
            None => match iter.next_if(|t| t.flag_name().is_none()) {
                Some(next) => next.text.clone(),
                None => "true".to_string(),
            },
        };
        let key = DREAM_FLAGS
            .iter()
            .find(|(short, _)| *short == name)
            .map_or(name, |(_, long)| *long);
        options.push((key.to_string(), Value::String(value)));
    }

    DreamCommand {
        prompt: prompt_parts.join(" "),
        options,
    }
}
