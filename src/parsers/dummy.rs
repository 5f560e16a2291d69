use serde_json::Value;

use super::Parse;
use crate::data::{Generator, MetadataMap, PromptInfo, Sampler};
use crate::error::Result;

/// Placeholder grammar that accepts anything.
///
/// Useful as a template for new grammars and in tests; it is never part of
/// the default precedence list.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyParser;

impl Parse for DummyParser {
    fn generator(&self) -> Generator {
        Generator::Unknown
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let sampler = Sampler::new("dummy_sampler", MetadataMap::new());
        let mut metadata = MetadataMap::new();
        metadata.insert("some other".into(), Value::String("metadata".into()));
        Ok(PromptInfo::new(self.generator(), vec![sampler], metadata, bag.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accepts_anything() {
        let bag = json!({"whatever": [1, 2]}).as_object().cloned().unwrap();
        let info = DummyParser.parse(&bag).unwrap();
        assert_eq!(info.generator, Generator::Unknown);
        assert_eq!(info.samplers[0].name, "dummy_sampler");
        assert_eq!(info.metadata["some other"], "metadata");
        assert_eq!(info.raw_parameters, bag);
    }
}
