//! Key renaming and formatting shared by the generator grammars.

use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

use crate::data::MetadataMap;

static WHITESPACE_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").expect("valid regex"));

/// A directive applied before the generic key clean-up.
#[derive(Debug, Clone, PartialEq)]
pub enum ReplacementRule {
    /// Move the value of `from` to `to`.
    Rename { from: &'static str, to: &'static str },
    /// Store `template` under `key`, with `{source}` placeholders replaced by
    /// the values of the listed sources that are present.
    Format {
        key: &'static str,
        sources: &'static [&'static str],
        template: &'static str,
    },
}

/// Apply `rules`, then lower-case keys and replace whitespace runs with `_`.
///
/// Leading and trailing whitespace is replaced too: `" Steps"` becomes `"_steps"`.
///
/// With `enabled == false` the input is collected as-is.
pub fn normalize_parameters<I>(
    enabled: bool,
    parameters: I,
    rules: &[ReplacementRule],
    to_lower_case: bool,
    replace_whitespace: bool,
) -> MetadataMap
where
    I: IntoIterator<Item = (String, Value)>,
{
    let mut raw: MetadataMap = parameters.into_iter().collect();
    if !enabled {
        return raw;
    }

    let mut processed = MetadataMap::new();

    for rule in rules {
        match rule {
            ReplacementRule::Rename { from, to } => {
                if let Some(value) = raw.shift_remove(*from) {
                    processed.insert((*to).to_string(), value);
                }
            }
            ReplacementRule::Format {
                key,
                sources,
                template,
            } => {
                if raw.contains_key(*key) {
                    let mut formatted = (*template).to_string();
                    for source in sources.iter() {
                        if let Some(value) = raw.get(*source) {
                            formatted =
                                formatted.replace(&format!("{{{source}}}"), &plain_string(value));
                        }
                    }
                    processed.insert((*key).to_string(), Value::String(formatted));
                }
            }
        }
    }

    for (key, value) in raw {
        let key = if to_lower_case { key.to_lowercase() } else { key };
        let key = if replace_whitespace {
            WHITESPACE_RE.replace_all(&key, "_").into_owned()
        } else {
            key
        };
        processed.insert(key, value);
    }

    processed
}

/// Remove the given keys from `dict`, returning the removed pairs in `keys` order.
pub fn pop_keys(keys: &[&str], dict: &mut MetadataMap) -> Vec<(String, Value)> {
    keys.iter()
        .filter_map(|key| dict.shift_remove(*key).map(|v| ((*key).to_string(), v)))
        .collect()
}

/// Strings verbatim, anything else as JSON text.
pub(crate) fn plain_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
