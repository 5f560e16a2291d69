use serde_json::Value;
use std::sync::Arc;

use super::{Parse, ReplacementRule, json_object_field, non_empty_str, normalize_parameters, pop_keys};
use crate::data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler, UNKNOWN_SAMPLER};
use crate::error::{Error, Result};

const SAMPLER_PARAMS: &[&str] = &[
    "steps",
    "cfg_scale",
    "guidance_scale",
    "seed",
    "scheduler",
    "sharpness",
    "adm_guidance",
    "resolution",
    "denoising_strength",
    "clip_skip",
];

const REPLACEMENT_RULES: &[ReplacementRule] = &[ReplacementRule::Rename {
    from: "guidance_scale",
    to: "cfg_scale",
}];

/// Fooocus stores one flat JSON object in `parameters`.
#[derive(Debug, Clone)]
pub struct FooocusParser {
    normalize: bool,
}

impl FooocusParser {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for FooocusParser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Parse for FooocusParser {
    fn generator(&self) -> Generator {
        Generator::Fooocus
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let mut data = match bag.get("parameters") {
            Some(Value::String(_)) | Some(Value::Object(_)) => {
                json_object_field(bag, "parameters").map_err(|e| {
                    Error::parse(format!("Error decoding parameter data: {e}"))
                })?
            }
            _ => None,
        }
        .ok_or_else(|| Error::parse("parameters field is missing"))?;

        let model_name = take_string(&mut data, "base_model");
        let model_hash = take_string(&mut data, "base_model_hash");
        let model = if model_name.is_some() || model_hash.is_some() {
            Some(Arc::new(Model::new(model_name, model_hash)?))
        } else {
            None
        };

        let prompt = take_string(&mut data, "prompt")
            .or_else(|| non_empty_str(data.get("full_prompt")));
        let negative_prompt = take_string(&mut data, "negative_prompt")
            .or_else(|| non_empty_str(data.get("full_negative_prompt")));

        let sampler_name = take_string(&mut data, "sampler").unwrap_or_else(|| UNKNOWN_SAMPLER.into());
        let parameters = normalize_parameters(
            self.normalize,
            pop_keys(SAMPLER_PARAMS, &mut data),
            REPLACEMENT_RULES,
            true,
            true,
        );

        let sampler = Sampler::new(sampler_name, parameters)
            .with_model(model)
            .with_prompts(prompt.map(Prompt::new).into_iter().collect())
            .with_negative_prompts(negative_prompt.map(Prompt::new).into_iter().collect());

        Ok(PromptInfo::new(self.generator(), vec![sampler], data, bag.clone()))
    }
}

/// Remove `key`, keeping it only when it is a non-empty string.
fn take_string(data: &mut MetadataMap, key: &str) -> Option<String> {
    let value = data.shift_remove(key);
    non_empty_str(value.as_ref())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(parameters: Value) -> Result<PromptInfo> {
        let mut bag = MetadataMap::new();
        bag.insert("parameters".into(), parameters);
        FooocusParser::default().parse(&bag)
    }

    fn encoded(value: Value) -> Value {
        Value::String(value.to_string())
    }

    #[test]
    fn distributes_known_keys() {
        let info = parse(encoded(json!({
            "base_model": "test_model",
            "base_model_hash": "hash123",
            "sampler": "DPM++ 2M",
            "guidance_scale": 7.5,
            "steps": 30,
            "prompt": "beautiful artwork",
            "negative_prompt": "ugly, distorted"
        })))
        .unwrap();

        assert_eq!(info.generator, Generator::Fooocus);
        assert_eq!(info.samplers.len(), 1);
        let sampler = &info.samplers[0];
        assert_eq!(sampler.name, "DPM++ 2M");
        assert_eq!(sampler.parameters["cfg_scale"], 7.5);
        assert_eq!(sampler.parameters["steps"], 30);
        assert!(!sampler.parameters.contains_key("guidance_scale"));
        let model = sampler.model.as_ref().unwrap();
        assert_eq!(model.name.as_deref(), Some("test_model"));
        assert_eq!(model.hash.as_deref(), Some("hash123"));
        assert_eq!(sampler.prompts[0].value, "beautiful artwork");
        assert_eq!(sampler.negative_prompts[0].value, "ugly, distorted");
        assert!(info.metadata.is_empty());
    }

    #[test]
    fn full_prompts_stay_in_metadata() {
        let info = parse(encoded(json!({
            "base_model": "realismEngineSDXL_v30VAE",
            "full_prompt": "masterpiece, best quality, detailed artwork",
            "full_negative_prompt": "worst quality, low quality, blurry",
            "sampler": "dpmpp_2m_sde_gpu",
            "scheduler": "karras",
            "steps": 25,
            "cfg_scale": 4.5,
            "seed": 123456789,
            "resolution": [1024, 1024]
        })))
        .unwrap();

        assert_eq!(info.metadata["full_prompt"], "masterpiece, best quality, detailed artwork");
        assert_eq!(info.full_negative_prompt(), "worst quality, low quality, blurry");
        let sampler = &info.samplers[0];
        assert_eq!(sampler.parameters["cfg_scale"], 4.5);
        assert_eq!(sampler.parameters["steps"], 25);
        assert_eq!(sampler.parameters["scheduler"], "karras");
        assert_eq!(sampler.parameters["resolution"], json!([1024, 1024]));
        assert_eq!(sampler.prompts[0].value, "masterpiece, best quality, detailed artwork");
    }

    #[test]
    fn unclaimed_keys_go_to_metadata() {
        let info = parse(encoded(json!({
            "base_model": "model_name",
            "refiner_model": "refiner_name",
            "refiner_switch": 0.8,
            "loras": [["lora1", 0.5], ["lora2", 1.0]],
            "styles": ["Fooocus V2", "Fooocus Enhance"],
            "performance": "Speed",
            "version": "Fooocus v2.4.0"
        })))
        .unwrap();

        assert_eq!(info.metadata["refiner_model"], "refiner_name");
        assert_eq!(info.metadata["refiner_switch"], 0.8);
        assert_eq!(info.metadata["loras"], json!([["lora1", 0.5], ["lora2", 1.0]]));
        assert_eq!(info.metadata["styles"], json!(["Fooocus V2", "Fooocus Enhance"]));
        assert_eq!(info.metadata["performance"], "Speed");
        assert_eq!(info.metadata["version"], "Fooocus v2.4.0");
        assert!(!info.metadata.contains_key("base_model"));
    }

    #[test]
    fn minimal_object() {
        let info = parse(json!("{\"base_model\":\"m1\"}")).unwrap();
        assert_eq!(info.samplers.len(), 1);
        let sampler = &info.samplers[0];
        assert_eq!(sampler.model.as_ref().unwrap().name.as_deref(), Some("m1"));
        assert!(sampler.prompts.is_empty());
        assert!(sampler.negative_prompts.is_empty());
        assert!(info.prompts().is_empty());
    }

    #[test]
    fn empty_object_is_valid() {
        let info = parse(json!("{}")).unwrap();
        assert_eq!(info.generator, Generator::Fooocus);
        assert!(info.samplers[0].model.is_none());
    }

    #[test]
    fn pre_decoded_object_is_accepted() {
        let info = parse(json!({"base_model": "m2", "steps": 10})).unwrap();
        assert_eq!(info.samplers[0].parameters["steps"], 10);
    }

    #[test]
    fn missing_field_fails() {
        let err = FooocusParser::default().parse(&MetadataMap::new()).unwrap_err();
        assert!(err.to_string().contains("parameters field is missing"));

        let err = parse(json!(42)).unwrap_err();
        assert!(err.to_string().contains("parameters field is missing"));
    }

    #[test]
    fn non_json_fails_with_decode_error() {
        let err = parse(json!("invalid json string")).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
        assert!(err.to_string().starts_with("Error decoding parameter data"));

        let err = parse(json!("a cat\nSteps: 20, Sampler: Euler")).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn json_array_is_rejected() {
        let err = parse(json!("[1, 2, 3]")).unwrap_err();
        assert!(err.to_string().starts_with("Error decoding parameter data"));
    }
}
