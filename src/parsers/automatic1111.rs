//! AUTOMATIC1111 web UI `parameters` text.
//!
//! ```text
//! positive prompt, may span
//! several lines
//! Negative prompt: negative prompt text
//! Steps: 20, Sampler: Euler a, CFG scale: 7, Seed: 12345, Size: 512x512, Model hash: abc, Model: name
//! ```
//!
//! The settings line is the last non-empty line, recognised only when every
//! comma separated segment of it is a `Key: value` pair and it either starts
//! with `Steps` or holds at least three pairs. Values may be double quoted, in
//! which case commas inside them are kept and JSON escapes apply.

use regex::Regex;
use serde_json::{Value, json};
use std::sync::{Arc, LazyLock};

use super::{Parse, normalize_parameters, pop_keys};
use crate::data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler, UNKNOWN_SAMPLER};
use crate::error::{Error, Result};

const NEGATIVE_PROMPT_MARKER: &str = "Negative prompt:";
const MIN_SETTINGS: usize = 3;

static SETTING_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\s*(\w[\w \-/+.()]*):\s*("(?:\\.|[^\\"])*"|[^,]*)(?:,|$)"#)
        .expect("valid regex")
});

static EXTRA_NETWORK_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"<(lora|lyco):([^:>]+)(?::([^:>]*))?[^>]*>").expect("valid regex")
});

#[derive(Debug, Clone)]
pub struct Automatic1111Parser {
    normalize: bool,
}

impl Automatic1111Parser {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for Automatic1111Parser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Parse for Automatic1111Parser {
    fn generator(&self) -> Generator {
        Generator::Automatic1111
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let text = bag
            .get("parameters")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::parse("parameters field is missing or not a string"))?;
        if text.trim().is_empty() {
            return Err(Error::parse("parameters field is empty"));
        }
        if text.trim_start().starts_with('{')
            && serde_json::from_str::<Value>(text).is_ok_and(|v| v.is_object())
        {
            return Err(Error::parse("parameters field holds a JSON object"));
        }

        let sections = split_sections(text);

        let mut settings: MetadataMap = sections.settings.into_iter().collect();
        let lifted = pop_keys(&["Sampler", "Model", "Model hash"], &mut settings);
        let mut sampler_name = UNKNOWN_SAMPLER.to_string();
        let mut model_name = None;
        let mut model_hash = None;
        for (key, value) in lifted {
            let value = value.as_str().map(str::to_string);
            match key.as_str() {
                "Sampler" => sampler_name = value.unwrap_or(sampler_name),
                "Model" => model_name = value,
                _ => model_hash = value,
            }
        }

        let model = if model_name.is_some() || model_hash.is_some() {
            Some(Arc::new(Model::new(model_name, model_hash)?))
        } else {
            None
        };

        let parameters = normalize_parameters(self.normalize, settings, &[], true, true);

        let mut metadata = MetadataMap::new();
        let loras = extra_networks(&sections.prompt);
        if !loras.is_empty() {
            metadata.insert("loras".into(), Value::Array(loras));
        }

        let prompts = prompt_list(sections.prompt);
        let negative_prompts = prompt_list(sections.negative_prompt);

        let sampler = Sampler::new(sampler_name, parameters)
            .with_model(model)
            .with_prompts(prompts)
            .with_negative_prompts(negative_prompts);

        Ok(PromptInfo::new(
            self.generator(),
            vec![sampler],
            metadata,
            bag.clone(),
        ))
    }
}

struct Sections {
    prompt: String,
    negative_prompt: String,
    settings: Vec<(String, Value)>,
}

fn split_sections(text: &str) -> Sections {
    let mut lines: Vec<&str> = text.split('\n').map(|l| l.trim_end_matches('\r')).collect();
    while lines.last().is_some_and(|l| l.trim().is_empty()) {
        lines.pop();
    }

    let settings = match lines.last() {
        Some(last) if !last.trim_start().starts_with(NEGATIVE_PROMPT_MARKER) => {
            tokenize_settings(last).filter(|pairs| is_settings_line(pairs))
        }
        _ => None,
    };
    if settings.is_some() {
        lines.pop();
    }

    let marker = lines
        .iter()
        .position(|l| l.trim_start().starts_with(NEGATIVE_PROMPT_MARKER));

    let (prompt, negative_prompt) = match marker {
        Some(idx) => {
            let mut negative = vec![
                lines[idx]
                    .trim_start()
                    .trim_start_matches(NEGATIVE_PROMPT_MARKER),
            ];
            negative.extend_from_slice(&lines[idx + 1..]);
            (lines[..idx].join("\n"), negative.join("\n"))
        }
        None => (lines.join("\n"), String::new()),
    };

    Sections {
        prompt: prompt.trim().to_string(),
        negative_prompt: negative_prompt.trim().to_string(),
        settings: settings.unwrap_or_default(),
    }
}

fn is_settings_line(pairs: &[(String, Value)]) -> bool {
    pairs.len() >= MIN_SETTINGS || pairs.first().is_some_and(|(key, _)| key == "Steps")
}

/// Split a settings line into `(key, value)` pairs.
///
/// Returns `None` unless the matches cover the line completely.
fn tokenize_settings(line: &str) -> Option<Vec<(String, Value)>> {
    let line = line.trim();
    let mut pairs = Vec::new();
    let mut cursor = 0;

    for caps in SETTING_RE.captures_iter(line) {
        let whole = caps.get(0)?;
        if whole.start() != cursor {
            return None;
        }
        cursor = whole.end();
        if whole.as_str().is_empty() {
            break;
        }
        let key = caps[1].trim().to_string();
        let value = unquote(caps[2].trim());
        pairs.push((key, Value::String(value)));
    }

    if pairs.is_empty() || cursor != line.len() {
        return None;
    }
    Some(pairs)
}

fn unquote(value: &str) -> String {
    if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
        if let Ok(unquoted) = serde_json::from_str::<String>(value) {
            return unquoted;
        }
    }
    value.to_string()
}

fn extra_networks(prompt: &str) -> Vec<Value> {
    EXTRA_NETWORK_RE
        .captures_iter(prompt)
        .map(|caps| {
            let weight = caps
                .get(3)
                .map(|m| m.as_str().trim())
                .filter(|w| !w.is_empty())
                .unwrap_or("1");
            json!({
                "type": &caps[1],
                "name": caps[2].trim(),
                "weight": weight,
            })
        })
        .collect()
}

fn prompt_list(text: String) -> Vec<Prompt> {
    if text.is_empty() {
        Vec::new()
    } else {
        vec![Prompt::new(text)]
    }
}
