//! Container level metadata readers.
//!
//! An extractor pulls a raw key/value bag out of one container format. It
//! returns `Ok(None)` when the container is intact but carries nothing it
//! understands, and [`Error::Metadata`] when the container cannot be read.

pub mod exif;
pub mod png;

#[cfg(test)]
pub(crate) mod fixtures;

use image::{ImageFormat, ImageReader};
use img_parts::Bytes;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;

use crate::data::{Generator, MetadataMap};
use crate::error::{Error, Result};

/// How hard to look for metadata. Higher levels add extractors, never remove them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[cfg_attr(feature = "cli", derive(clap::ValueEnum))]
#[serde(rename_all = "lowercase")]
#[repr(u8)]
pub enum Effort {
    Low = 1,
    #[default]
    Default = 2,
    High = 3,
}

impl Effort {
    pub const ALL: [Effort; 3] = [Effort::Low, Effort::Default, Effort::High];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Default => "default",
            Self::High => "high",
        }
    }

    /// Every level up to and including `self`, lowest first.
    pub fn up_to(self) -> impl Iterator<Item = Effort> {
        Self::ALL.into_iter().filter(move |e| *e <= self)
    }
}

impl fmt::Display for Effort {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Effort {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" | "1" => Ok(Self::Low),
            "default" | "2" => Ok(Self::Default),
            "high" | "3" => Ok(Self::High),
            other => Err(format!("unknown effort level '{other}' (expected low, default or high)")),
        }
    }
}

impl TryFrom<u8> for Effort {
    type Error = Error;

    fn try_from(value: u8) -> Result<Self> {
        match value {
            1 => Ok(Self::Low),
            2 => Ok(Self::Default),
            3 => Ok(Self::High),
            other => Err(Error::InvalidArgument(format!(
                "effort level must be 1, 2 or 3 (got {other})"
            ))),
        }
    }
}

/// Image containers with registered extractors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ContainerFormat {
    #[serde(rename = "PNG")]
    Png,
    #[serde(rename = "JPEG")]
    Jpeg,
    #[serde(rename = "WEBP")]
    WebP,
}

impl ContainerFormat {
    pub fn from_image_format(format: ImageFormat) -> Option<Self> {
        match format {
            ImageFormat::Png => Some(Self::Png),
            ImageFormat::Jpeg => Some(Self::Jpeg),
            ImageFormat::WebP => Some(Self::WebP),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Png => "PNG",
            Self::Jpeg => "JPEG",
            Self::WebP => "WEBP",
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encoded image bytes with their sniffed format.
#[derive(Debug, Clone)]
pub struct DecodedImage {
    data: Bytes,
    format: ImageFormat,
}

impl DecodedImage {
    pub fn from_bytes(bytes: impl Into<Bytes>) -> Result<Self> {
        let data = bytes.into();
        let format = image::guess_format(&data)?;
        Ok(Self { data, format })
    }

    /// The container, when it is one we have extractors for.
    pub fn format(&self) -> Option<ContainerFormat> {
        ContainerFormat::from_image_format(self.format)
    }

    pub fn image_format(&self) -> ImageFormat {
        self.format
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn shared_bytes(&self) -> Bytes {
        self.data.clone()
    }

    /// Width and height from the image header.
    pub fn dimensions(&self) -> Result<(u32, u32)> {
        let reader = ImageReader::with_format(Cursor::new(self.bytes()), self.format);
        Ok(reader.into_dimensions()?)
    }
}

pub type ExtractorFn = fn(&DecodedImage, Generator) -> Result<Option<MetadataMap>>;

/// A named extractor function.
#[derive(Debug, Clone, Copy)]
pub struct Extractor {
    pub name: &'static str,
    pub func: ExtractorFn,
}

impl Extractor {
    pub const fn new(name: &'static str, func: ExtractorFn) -> Self {
        Self { name, func }
    }

    /// Run the extractor for a target generator.
    pub fn extract(&self, image: &DecodedImage, generator: Generator) -> Result<Option<MetadataMap>> {
        (self.func)(image, generator)
    }
}

/// Extractors per container and effort level.
#[derive(Debug, Clone)]
pub struct ExtractorRegistry {
    table: HashMap<ContainerFormat, BTreeMap<Effort, Vec<Extractor>>>,
}

impl ExtractorRegistry {
    /// A registry without any extractor.
    pub fn empty() -> Self {
        Self {
            table: HashMap::new(),
        }
    }

    /// Append `extractor` to the list for `format` at `effort`.
    pub fn register(&mut self, format: ContainerFormat, effort: Effort, extractor: Extractor) -> &mut Self {
        self.table
            .entry(format)
            .or_default()
            .entry(effort)
            .or_default()
            .push(extractor);
        self
    }

    pub fn supports(&self, format: ContainerFormat) -> bool {
        self.table.contains_key(&format)
    }

    /// Extractors registered for exactly this level.
    pub fn extractors(&self, format: ContainerFormat, effort: Effort) -> &[Extractor] {
        self.table
            .get(&format)
            .and_then(|levels| levels.get(&effort))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

impl Default for ExtractorRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry
            .register(
                ContainerFormat::Png,
                Effort::Low,
                Extractor::new("png_image_info", png::image_info),
            )
            .register(
                ContainerFormat::Png,
                Effort::Default,
                Extractor::new("png_image_text", png::image_text),
            )
            .register(
                ContainerFormat::Png,
                Effort::High,
                Extractor::new("png_steganographic_alpha", png::steganographic_alpha),
            )
            .register(
                ContainerFormat::Jpeg,
                Effort::Low,
                Extractor::new("jpeg_user_comment", exif::user_comment),
            )
            .register(
                ContainerFormat::WebP,
                Effort::Low,
                Extractor::new("webp_user_comment", exif::user_comment),
            );
        registry
    }
}
