//! ComfyUI node graphs.
//!
//! The `prompt` text chunk holds the executed graph as JSON: node id →
//! `{"class_type": ..., "inputs": {...}}`. An input is either a literal value
//! or a link `[source_node_id, output_index]`. Samplers are found by class and
//! their `model`, `positive` and `negative` links are followed back to the
//! checkpoint loader and the text encoders.

use serde_json::{Value, json};
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use super::{Parse, json_object_field, non_empty_str, normalize_parameters};
use crate::data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler, UNKNOWN_SAMPLER};
use crate::error::{Error, Result};

const SAMPLER_CLASSES: &[&str] = &["KSampler", "SamplerCustom"];
const MODEL_NAME_INPUTS: &[&str] = &["ckpt_name", "unet_name", "model_name"];
const TEXT_INPUTS: &[&str] = &["text", "text_g", "text_l", "string", "prompt"];
/// Links never leading to prompt text.
const NON_TEXT_LINKS: &[&str] = &["clip", "model", "vae", "image", "pixels", "samples", "latent_image", "mask"];
const CONDITIONING_SIDES: [&str; 2] = ["positive", "negative"];
/// Sampler inputs commonly fed by primitive nodes.
const SCALAR_LINKS: &[&str] = &["seed", "noise_seed", "steps", "cfg", "denoise", "sampler_name", "scheduler"];

#[derive(Debug, Clone)]
pub struct ComfyUiParser {
    normalize: bool,
}

impl ComfyUiParser {
    pub fn new(normalize: bool) -> Self {
        Self { normalize }
    }
}

impl Default for ComfyUiParser {
    fn default() -> Self {
        Self::new(true)
    }
}

impl Parse for ComfyUiParser {
    fn generator(&self) -> Generator {
        Generator::ComfyUi
    }

    fn parse(&self, bag: &MetadataMap) -> Result<PromptInfo> {
        let nodes = json_object_field(bag, "prompt")
            .map_err(|e| Error::parse(format!("Error decoding prompt graph: {e}")))?
            .ok_or_else(|| Error::parse("prompt field is missing"))?;
        let graph = Graph { nodes: &nodes };

        let mut sampler_ids: Vec<&String> = nodes
            .iter()
            .filter(|(_, node)| is_sampler_class(class_type(node)))
            .map(|(id, _)| id)
            .collect();
        if sampler_ids.is_empty() {
            return Err(Error::parse("No sampler node found in prompt graph"));
        }
        sampler_ids.sort_by(|a, b| compare_node_ids(a, b));

        let mut models: HashMap<String, Arc<Model>> = HashMap::new();
        let mut samplers = Vec::with_capacity(sampler_ids.len());
        for id in sampler_ids {
            samplers.push(self.sampler(&graph, id, &mut models)?);
        }

        let mut metadata = MetadataMap::new();
        if bag.contains_key("workflow") {
            metadata.insert("has_workflow".into(), Value::Bool(true));
        }

        Ok(PromptInfo::new(self.generator(), samplers, metadata, bag.clone()))
    }
}

impl ComfyUiParser {
    fn sampler(
        &self,
        graph: &Graph<'_>,
        id: &str,
        models: &mut HashMap<String, Arc<Model>>,
    ) -> Result<Sampler> {
        let empty = MetadataMap::new();
        let inputs = graph.inputs(id).unwrap_or(&empty);

        let mut name = UNKNOWN_SAMPLER.to_string();
        let mut parameters = Vec::new();
        for (key, value) in inputs {
            let value = if link_target(value).is_some() {
                if !SCALAR_LINKS.contains(&key.as_str()) {
                    continue;
                }
                match graph.resolve_scalar(key, value) {
                    Some(resolved) => resolved,
                    None => continue,
                }
            } else {
                value.clone()
            };
            if key == "sampler_name" {
                if let Some(n) = non_empty_str(Some(&value)) {
                    name = n;
                }
                continue;
            }
            parameters.push((key.clone(), value));
        }
        // SamplerCustom takes its sampler from a KSamplerSelect node.
        if name == UNKNOWN_SAMPLER {
            if let Some(selected) = inputs
                .get("sampler")
                .and_then(|link| graph.resolve_scalar("sampler_name", link))
                .and_then(|v| non_empty_str(Some(&v)))
            {
                name = selected;
            }
        }

        let model = match inputs.get("model") {
            Some(link) => graph.model(link, models)?,
            None => None,
        };

        let [prompts, negative_prompts] = CONDITIONING_SIDES.map(|side| match inputs.get(side) {
            Some(link) => graph.collect_prompts(link, side),
            None => Vec::new(),
        });

        let parameters = normalize_parameters(self.normalize, parameters, &[], true, true);
        Ok(Sampler::new(name, parameters)
            .with_id(id)
            .with_model(model)
            .with_prompts(prompts)
            .with_negative_prompts(negative_prompts))
    }
}

struct Graph<'a> {
    nodes: &'a MetadataMap,
}

impl Graph<'_> {
    fn inputs(&self, id: &str) -> Option<&MetadataMap> {
        self.nodes.get(id)?.get("inputs")?.as_object()
    }

    fn class_type(&self, id: &str) -> &str {
        self.nodes.get(id).map(class_type).unwrap_or("")
    }

    /// Follow a link to a node holding a literal for `key` (or a `value` input).
    fn resolve_scalar(&self, key: &str, link: &Value) -> Option<Value> {
        let inputs = self.inputs(&link_target(link)?)?;
        [key, "value"]
            .iter()
            .filter_map(|k| inputs.get(*k))
            .find(|v| !v.is_array() && !v.is_object())
            .cloned()
    }

    /// Walk the `model` chain back to its loader, recording LoRA loaders on the way.
    fn model(
        &self,
        link: &Value,
        models: &mut HashMap<String, Arc<Model>>,
    ) -> Result<Option<Arc<Model>>> {
        let mut visited = HashSet::new();
        let mut loras = Vec::new();
        let mut current = link.clone();

        loop {
            let Some(id) = link_target(&current) else {
                return Ok(None);
            };
            if !visited.insert(id.clone()) {
                return Ok(None);
            }
            let Some(inputs) = self.inputs(&id) else {
                return Ok(None);
            };

            if let Some(name) = MODEL_NAME_INPUTS
                .iter()
                .find_map(|k| non_empty_str(inputs.get(*k)))
            {
                let cache_key = format!("{id}:{}", Value::Array(loras.clone()));
                if let Some(model) = models.get(&cache_key) {
                    return Ok(Some(model.clone()));
                }
                let mut metadata = MetadataMap::new();
                if !loras.is_empty() {
                    metadata.insert("loras".into(), Value::Array(loras));
                }
                let model = Arc::new(
                    Model::new(Some(name), None)?
                        .with_id(id.as_str())
                        .with_metadata(metadata),
                );
                models.insert(cache_key, model.clone());
                return Ok(Some(model));
            }

            if self.class_type(&id).starts_with("LoraLoader") {
                if let Some(lora) = non_empty_str(inputs.get("lora_name")) {
                    loras.push(json!({
                        "name": lora,
                        "strength_model": inputs.get("strength_model").cloned().unwrap_or(Value::Null),
                        "strength_clip": inputs.get("strength_clip").cloned().unwrap_or(Value::Null),
                    }));
                }
            }

            match inputs.get("model") {
                Some(next) => current = next.clone(),
                None => return Ok(None),
            }
        }
    }

    /// Gather the prompt texts feeding the `side` (`positive` or `negative`)
    /// conditioning link, depth first in input order.
    ///
    /// Nodes carrying both conditioning inputs (`ControlNetApplyAdvanced` and
    /// friends) are only followed through the input matching `side`.
    fn collect_prompts(&self, link: &Value, side: &str) -> Vec<Prompt> {
        let mut out = Vec::new();
        let mut visited = HashSet::new();
        let mut pending: Vec<String> = link_target(link).into_iter().collect();

        while let Some(id) = pending.pop() {
            if !visited.insert(id.clone()) {
                continue;
            }
            let Some(inputs) = self.inputs(&id) else {
                continue;
            };

            let mut texts: Vec<String> = Vec::new();
            let mut next: Vec<String> = Vec::new();
            for key in TEXT_INPUTS {
                match inputs.get(*key) {
                    Some(Value::String(text)) => {
                        let text = text.trim();
                        if !text.is_empty() && !texts.iter().any(|t| t == text) {
                            texts.push(text.to_string());
                        }
                    }
                    Some(linked) => next.extend(link_target(linked)),
                    None => {}
                }
            }
            out.extend(texts.into_iter().map(|t| Prompt::new(t).with_id(id.as_str())));

            let split = CONDITIONING_SIDES.iter().all(|k| inputs.contains_key(*k));
            for (key, value) in inputs {
                let key = key.as_str();
                if TEXT_INPUTS.contains(&key) || NON_TEXT_LINKS.contains(&key) {
                    continue;
                }
                if split && key != side {
                    continue;
                }
                next.extend(link_target(value));
            }
            pending.extend(next.into_iter().rev());
        }
        out
    }
}

/// `KSamplerSelect` only picks an algorithm for `SamplerCustom`.
fn is_sampler_class(class: &str) -> bool {
    SAMPLER_CLASSES.iter().any(|c| class.contains(c)) && !class.ends_with("Select")
}

fn class_type(node: &Value) -> &str {
    node.get("class_type").and_then(Value::as_str).unwrap_or("")
}

/// `["12", 0]` (or `[12, 0]`) → `"12"`.
fn link_target(value: &Value) -> Option<String> {
    let [source, index] = value.as_array()?.as_slice() else {
        return None;
    };
    if !index.is_u64() {
        return None;
    }
    match source {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

fn compare_node_ids(a: &str, b: &str) -> Ordering {
    match (a.parse::<u64>(), b.parse::<u64>()) {
        (Ok(x), Ok(y)) => x.cmp(&y),
        _ => a.cmp(b),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(prompt: Value) -> Result<PromptInfo> {
        let mut bag = MetadataMap::new();
        bag.insert("prompt".into(), Value::String(prompt.to_string()));
        ComfyUiParser::default().parse(&bag)
    }

    fn txt2img_graph() -> Value {
        json!({
            "3": {
                "class_type": "KSampler",
                "inputs": {
                    "seed": 156680208700286u64,
                    "steps": 20,
                    "cfg": 8.0,
                    "sampler_name": "euler",
                    "scheduler": "normal",
                    "denoise": 1.0,
                    "model": ["10", 0],
                    "positive": ["6", 0],
                    "negative": ["7", 0],
                    "latent_image": ["5", 0]
                }
            },
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "v1-5-pruned-emaonly.safetensors"}},
            "5": {"class_type": "EmptyLatentImage", "inputs": {"width": 512, "height": 512, "batch_size": 1}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "beautiful scenery", "clip": ["4", 1]}},
            "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "text, watermark", "clip": ["4", 1]}},
            "10": {
                "class_type": "LoraLoader",
                "inputs": {"lora_name": "detail.safetensors", "strength_model": 0.8, "strength_clip": 1.0, "model": ["4", 0], "clip": ["4", 1]}
            }
        })
    }

    #[test]
    fn basic_sampler_keeps_numeric_types() {
        let info = parse(json!({
            "1": {"class_type": "KSampler", "inputs": {"sampler_name": "euler", "steps": 20, "cfg": 7.5}}
        }))
        .unwrap();
        assert_eq!(info.generator, Generator::ComfyUi);
        assert_eq!(info.samplers.len(), 1);
        let sampler = &info.samplers[0];
        assert_eq!(sampler.name, "euler");
        assert_eq!(sampler.parameters["steps"], 20);
        assert_eq!(sampler.parameters["cfg"], 7.5);
        assert_eq!(sampler.sampler_id.as_deref(), Some("1"));
        assert!(!info.metadata.contains_key("has_workflow"));
    }

    #[test]
    fn follows_links_to_prompts_and_model() {
        let info = parse(txt2img_graph()).unwrap();
        let sampler = &info.samplers[0];

        assert_eq!(sampler.prompts.len(), 1);
        assert_eq!(sampler.prompts[0].value, "beautiful scenery");
        assert_eq!(sampler.prompts[0].prompt_id.as_deref(), Some("6"));
        assert_eq!(sampler.negative_prompts[0].value, "text, watermark");

        let model = sampler.model.as_ref().unwrap();
        assert_eq!(model.name.as_deref(), Some("v1-5-pruned-emaonly.safetensors"));
        assert_eq!(model.model_id.as_deref(), Some("4"));
        assert_eq!(model.metadata["loras"][0]["name"], "detail.safetensors");
        assert_eq!(model.metadata["loras"][0]["strength_model"], 0.8);

        assert!(!sampler.parameters.contains_key("model"));
        assert!(!sampler.parameters.contains_key("latent_image"));
        assert_eq!(sampler.parameters["seed"], 156680208700286u64);
        assert_eq!(info.full_prompt(), "beautiful scenery");
    }

    #[test]
    fn samplers_sharing_a_loader_share_the_model() {
        let info = parse(json!({
            "12": {"class_type": "KSamplerAdvanced", "inputs": {"sampler_name": "dpmpp_2m", "noise_seed": 5, "model": ["4", 0], "positive": ["6", 0]}},
            "3": {"class_type": "KSampler", "inputs": {"sampler_name": "euler", "model": ["4", 0], "positive": ["6", 0]}},
            "4": {"class_type": "CheckpointLoaderSimple", "inputs": {"ckpt_name": "sdxl.safetensors"}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a cat"}}
        }))
        .unwrap();

        assert_eq!(info.samplers.len(), 2);
        assert_eq!(info.samplers[0].sampler_id.as_deref(), Some("3"));
        assert_eq!(info.samplers[1].name, "dpmpp_2m");
        let first = info.samplers[0].model.as_ref().unwrap();
        let second = info.samplers[1].model.as_ref().unwrap();
        assert!(Arc::ptr_eq(first, second));
        assert_eq!(info.models().len(), 1);
        assert_eq!(info.prompts().len(), 1);
    }

    #[test]
    fn combined_conditioning_and_sdxl_encoders() {
        let info = parse(json!({
            "1": {"class_type": "KSampler", "inputs": {"sampler_name": "euler", "positive": ["2", 0], "negative": ["5", 0]}},
            "2": {"class_type": "ConditioningCombine", "inputs": {"conditioning_1": ["3", 0], "conditioning_2": ["4", 0]}},
            "3": {"class_type": "CLIPTextEncodeSDXL", "inputs": {"text_g": "castle", "text_l": "castle", "clip": ["9", 1]}},
            "4": {"class_type": "CLIPTextEncode", "inputs": {"text": ["8", 0]}},
            "5": {"class_type": "CLIPTextEncode", "inputs": {"text": "blurry"}},
            "8": {"class_type": "PrimitiveString", "inputs": {"string": "moat"}}
        }))
        .unwrap();
        let values: Vec<_> = info.samplers[0].prompts.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(values, ["castle", "moat"]);
        assert_eq!(info.samplers[0].prompts[1].prompt_id.as_deref(), Some("8"));
        assert_eq!(info.full_negative_prompt(), "blurry");
    }

    #[test]
    fn controlnet_keeps_conditioning_sides_apart() {
        let info = parse(json!({
            "3": {"class_type": "KSampler", "inputs": {"sampler_name": "euler", "positive": ["10", 0], "negative": ["10", 1]}},
            "6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a castle"}},
            "7": {"class_type": "CLIPTextEncode", "inputs": {"text": "blurry"}},
            "10": {
                "class_type": "ControlNetApplyAdvanced",
                "inputs": {"positive": ["6", 0], "negative": ["7", 0], "control_net": ["11", 0], "image": ["12", 0], "strength": 0.9}
            },
            "11": {"class_type": "ControlNetLoader", "inputs": {"control_net_name": "canny.safetensors"}},
            "12": {"class_type": "LoadImage", "inputs": {"image": "edges.png"}}
        }))
        .unwrap();
        let sampler = &info.samplers[0];
        let positive: Vec<_> = sampler.prompts.iter().map(|p| p.value.as_str()).collect();
        let negative: Vec<_> = sampler.negative_prompts.iter().map(|p| p.value.as_str()).collect();
        assert_eq!(positive, ["a castle"]);
        assert_eq!(negative, ["blurry"]);
        assert_eq!(info.full_prompt(), "a castle");
    }

    #[test]
    fn long_conditioning_chains_do_not_recurse() {
        let mut nodes = serde_json::Map::new();
        nodes.insert(
            "0".into(),
            json!({"class_type": "KSampler", "inputs": {"sampler_name": "euler", "positive": ["1", 0]}}),
        );
        let depth = 50_000;
        for i in 1..depth {
            nodes.insert(
                i.to_string(),
                json!({"class_type": "ConditioningZeroOut", "inputs": {"conditioning": [(i + 1).to_string(), 0]}}),
            );
        }
        nodes.insert(
            depth.to_string(),
            json!({"class_type": "CLIPTextEncode", "inputs": {"text": "end of the line"}}),
        );
        let info = parse(Value::Object(nodes)).unwrap();
        assert_eq!(info.full_prompt(), "end of the line");
    }

    #[test]
    fn sampler_custom_reads_linked_sampler_and_seed() {
        let info = parse(json!({
            "1": {"class_type": "SamplerCustom", "inputs": {"sampler": ["2", 0], "noise_seed": ["3", 0], "cfg": 4.5}},
            "2": {"class_type": "KSamplerSelect", "inputs": {"sampler_name": "dpmpp_2m_sde"}},
            "3": {"class_type": "PrimitiveNode", "inputs": {"value": 42}}
        }))
        .unwrap();
        assert_eq!(info.samplers.len(), 1);
        let custom = &info.samplers[0];
        assert_eq!(custom.name, "dpmpp_2m_sde");
        assert_eq!(custom.parameters["noise_seed"], 42);
        assert_eq!(custom.parameters["cfg"], 4.5);
        assert!(!custom.parameters.contains_key("sampler"));
    }

    #[test]
    fn cyclic_links_terminate() {
        let info = parse(json!({
            "1": {"class_type": "KSampler", "inputs": {"sampler_name": "euler", "model": ["2", 0], "positive": ["3", 0]}},
            "2": {"class_type": "ModelMerge", "inputs": {"model": ["2", 0]}},
            "3": {"class_type": "ConditioningConcat", "inputs": {"conditioning_to": ["3", 0]}}
        }))
        .unwrap();
        assert!(info.samplers[0].model.is_none());
        assert!(info.samplers[0].prompts.is_empty());
    }

    #[test]
    fn workflow_is_optional() {
        let mut bag = MetadataMap::new();
        bag.insert(
            "prompt".into(),
            json!("{\"1\": {\"class_type\": \"KSampler\", \"inputs\": {\"sampler_name\": \"dpmpp_2m\", \"steps\": 25}}}"),
        );
        bag.insert("workflow".into(), json!("{\"links\": []}"));
        let info = ComfyUiParser::default().parse(&bag).unwrap();
        assert_eq!(info.metadata["has_workflow"], true);
        assert_eq!(info.raw_parameters["workflow"], "{\"links\": []}");
    }

    #[test]
    fn rejects_missing_or_invalid_graph() {
        let err = ComfyUiParser::default().parse(&MetadataMap::new()).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));

        let mut bag = MetadataMap::new();
        bag.insert("prompt".into(), json!("invalid json"));
        let err = ComfyUiParser::default().parse(&bag).unwrap_err();
        assert!(err.to_string().starts_with("Error decoding prompt graph"));
    }

    #[test]
    fn graph_without_sampler_fails() {
        let err = parse(json!({"6": {"class_type": "CLIPTextEncode", "inputs": {"text": "a"}}})).unwrap_err();
        assert!(matches!(err, Error::Parse(_)));
    }

    #[test]
    fn sampler_classes() {
        assert!(is_sampler_class("KSampler"));
        assert!(is_sampler_class("KSamplerAdvanced"));
        assert!(is_sampler_class("SamplerCustomAdvanced"));
        assert!(!is_sampler_class("KSamplerSelect"));
        assert!(!is_sampler_class("CLIPTextEncode"));
    }

    #[test]
    fn link_detection() {
        assert_eq!(link_target(&json!(["4", 0])), Some("4".to_string()));
        assert_eq!(link_target(&json!([4, 1])), Some("4".to_string()));
        assert_eq!(link_target(&json!([1024, 1024.5])), None);
        assert_eq!(link_target(&json!(["a", "b"])), None);
        assert_eq!(link_target(&json!("4")), None);
    }
}
