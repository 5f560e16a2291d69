//! # sd-parsers
//!
//! Read the prompts, sampler settings and model references that image
//! generators (AUTOMATIC1111, ComfyUI, Fooocus, InvokeAI, NovelAI) embed in
//! the images they produce.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use sd_parsers::ParserManager;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let manager = ParserManager::default();
//!
//!     match manager.parse(std::path::PathBuf::from("image.png"), None).await? {
//!         Some(info) => {
//!             println!("Generator: {}", info.generator);
//!             println!("Prompt: {}", info.full_prompt());
//!             println!("Negative prompt: {}", info.full_negative_prompt());
//!             for model in info.models() {
//!                 println!("Model: {model}");
//!             }
//!         }
//!         None => println!("No generation metadata found"),
//!     }
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Lower-Level Usage
//!
//! Grammars can be run directly on a metadata bag, for example one read from
//! a sidecar file:
//!
//! ```rust
//! use sd_parsers::data::MetadataMap;
//! use sd_parsers::parsers::{Automatic1111Parser, Parse};
//! use serde_json::json;
//!
//! let mut bag = MetadataMap::new();
//! bag.insert("parameters".into(), json!("a cat\nSteps: 20, Sampler: Euler a, CFG scale: 7"));
//!
//! let info = Automatic1111Parser::default().parse(&bag).unwrap();
//! assert_eq!(info.samplers[0].name, "Euler a");
//! assert_eq!(info.samplers[0].parameters["cfg_scale"], "7");
//! ```
//!
//! ## Supported Formats
//!
//! | Format | Low effort | Default effort | High effort |
//! |--------|------------|----------------|-------------|
//! | PNG (`.png`) | dimensions, DPI | `tEXt` chunks | alpha channel (not implemented) |
//! | JPEG (`.jpg`, `.jpeg`) | EXIF `UserComment` | | |
//! | WebP (`.webp`) | EXIF `UserComment` | | |
//!
//! ## Modules
//!
//! - [`config`]: configuration types and loading/saving
//! - [`data`]: the parse result model
//! - [`error`]: error type shared by the whole crate
//! - [`extractors`]: container level metadata readers and effort levels
//! - [`parsers`]: generator grammars and key normalization
//! - [`pipeline`]: the search loop and image collection

pub mod config;
pub mod data;
pub mod error;
pub mod extractors;
pub mod parsers;
pub mod pipeline;

pub use data::{Generator, MetadataMap, Model, Prompt, PromptInfo, Sampler};
pub use error::{Error, Result};
pub use extractors::{DecodedImage, Effort};
pub use parsers::{Parse, Parser};
pub use pipeline::{ManagerOptions, ParseInput, ParserManager};
