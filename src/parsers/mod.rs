//! Generator grammars.
//!
//! Every grammar turns the raw bag produced by an extractor into a
//! [`PromptInfo`], or rejects it with [`Error::Parse`] so the next grammar can
//! try. The set of grammars is closed: [`Parser`] enumerates them and
//! [`Parser::managed`] lists them in auto-detection precedence.

mod automatic1111;
mod comfyui;
mod dummy;
mod fooocus;
mod invokeai;
pub mod normalize;
mod novelai;

pub use automatic1111::Automatic1111Parser;
pub use comfyui::ComfyUiParser;
pub use dummy::DummyParser;
pub use fooocus::FooocusParser;
pub use invokeai::InvokeAiParser;
pub use normalize::{ReplacementRule, normalize_parameters, pop_keys};
pub use novelai::NovelAiParser;

use serde_json::Value;

use crate::data::{Generator, MetadataMap, PromptInfo};
use crate::error::{Error, Result};

/// Capability shared by all generator grammars.
pub trait Parse {
    /// The generator whose metadata convention this grammar reads.
    fn generator(&self) -> Generator;

    /// Interpret `bag`, failing with [`Error::Parse`] when it does not match.
    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo>;
}

/// One configured grammar.
#[derive(Debug, Clone)]
pub enum Parser {
    Automatic1111(Automatic1111Parser),
    ComfyUi(ComfyUiParser),
    Fooocus(FooocusParser),
    InvokeAi(InvokeAiParser),
    NovelAi(NovelAiParser),
    Dummy(DummyParser),
}

impl Parser {
    /// Auto-detection order.
    ///
    /// Several generators store a field named `parameters`; the JSON shaped
    /// Fooocus grammar must run before the free-text one.
    pub const PRECEDENCE: [Generator; 5] = [
        Generator::Fooocus,
        Generator::Automatic1111,
        Generator::ComfyUi,
        Generator::InvokeAi,
        Generator::NovelAi,
    ];

    /// The default grammar list, in [`Parser::PRECEDENCE`] order.
    pub fn managed(normalize: bool) -> Vec<Parser> {
        Self::PRECEDENCE
            .iter()
            .map(|g| Self::for_generator(*g, normalize))
            .collect()
    }

    /// Build the grammar for `generator`. [`Generator::Unknown`] gives the stub.
    pub fn for_generator(generator: Generator, normalize: bool) -> Parser {
        match generator {
            Generator::Automatic1111 => Self::Automatic1111(Automatic1111Parser::new(normalize)),
            Generator::ComfyUi => Self::ComfyUi(ComfyUiParser::new(normalize)),
            Generator::Fooocus => Self::Fooocus(FooocusParser::new(normalize)),
            Generator::InvokeAi => Self::InvokeAi(InvokeAiParser::new(normalize)),
            Generator::NovelAi => Self::NovelAi(NovelAiParser::new(normalize)),
            Generator::Unknown => Self::Dummy(DummyParser),
        }
    }

    fn inner(&self) -> &dyn Parse {
        match self {
            Self::Automatic1111(p) => p,
            Self::ComfyUi(p) => p,
            Self::Fooocus(p) => p,
            Self::InvokeAi(p) => p,
            Self::NovelAi(p) => p,
            Self::Dummy(p) => p,
        }
    }
}

impl Parse for Parser {
    fn generator(&self) -> Generator {
        self.inner().generator()
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        self.inner().parse(bag)
    }
}

/// Read `field` as a JSON object: either an encoded string or an object
/// already decoded by the extractor.
pub(crate) fn json_object_field(bag: &MetadataMap, field: &str) -> Result<Option<MetadataMap>> {
    let decoded = match bag.get(field) {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::String(text)) => serde_json::from_str::<Value>(text)
            .map_err(|e| Error::parse(format!("invalid JSON in {field}: {e}")))?,
        Some(other) => other.clone(),
    };
    match decoded {
        Value::Object(map) => Ok(Some(map)),
        other => Err(Error::parse(format!(
            "{field} data is not a JSON object (found {})",
            json_kind(&other)
        ))),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// A non-empty trimmed string value.
pub(crate) fn non_empty_str(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}
