use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::config::Config;
use crate::data::PromptInfo;
use crate::error::{Error, Result};
use crate::extractors::{DecodedImage, Effort, ExtractorRegistry};
use crate::parsers::{Parse, Parser};

/// File extensions of the containers we can read.
const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "webp"];

/// Construction options for [`ParserManager`].
#[derive(Debug, Clone)]
pub struct ManagerOptions {
    /// Log every skipped extractor and grammar at debug level.
    pub debug: bool,
    /// Effort used when a call does not ask for one.
    pub effort: Effort,
    /// Grammars to try, in order. `None` uses [`Parser::managed`].
    pub parsers: Option<Vec<Parser>>,
    /// Clean up parameter keys (only for the default grammar list).
    pub normalize_parameters: bool,
}

impl Default for ManagerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            effort: Effort::Default,
            parsers: None,
            normalize_parameters: true,
        }
    }
}

/// What [`ParserManager::parse`] can read from.
#[derive(Debug, Clone)]
pub enum ParseInput {
    Path(PathBuf),
    Bytes(Vec<u8>),
    Image(DecodedImage),
}

impl From<PathBuf> for ParseInput {
    fn from(path: PathBuf) -> Self {
        Self::Path(path)
    }
}

impl From<&Path> for ParseInput {
    fn from(path: &Path) -> Self {
        Self::Path(path.to_path_buf())
    }
}

impl From<Vec<u8>> for ParseInput {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<DecodedImage> for ParseInput {
    fn from(image: DecodedImage) -> Self {
        Self::Image(image)
    }
}

/// Finds the first extractor/grammar pair that understands an image.
///
/// Extractors run by effort level, lowest first. Every extractor is run once
/// per grammar (it receives the grammar's generator as a hint); the first bag
/// a grammar accepts wins.
///
/// * [`Error::Metadata`] from an extractor abandons that extractor.
/// * [`Error::Parse`] from a grammar moves on to the next grammar.
/// * Any other error ends the search.
///
/// The manager holds no per-call state and can be shared between tasks.
///
/// # Example
///
/// ```rust,no_run
/// use sd_parsers::pipeline::ParserManager;
/// use std::path::PathBuf;
///
/// # async fn example() -> sd_parsers::error::Result<()> {
/// let manager = ParserManager::default();
/// if let Some(info) = manager.parse(PathBuf::from("image.png"), None).await? {
///     println!("{}: {}", info.generator, info.full_prompt());
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ParserManager {
    debug: bool,
    effort: Effort,
    parsers: Vec<Parser>,
    extractors: ExtractorRegistry,
}

impl ParserManager {
    pub fn new(options: ManagerOptions) -> Self {
        let parsers = options
            .parsers
            .unwrap_or_else(|| Parser::managed(options.normalize_parameters));
        Self {
            debug: options.debug,
            effort: options.effort,
            parsers,
            extractors: ExtractorRegistry::default(),
        }
    }

    /// Build a manager from the `parser` section of a [`Config`].
    pub fn from_config(config: &Config) -> Self {
        Self::new(ManagerOptions {
            debug: config.parser.debug,
            effort: config.parser.effort,
            parsers: Some(config.managed_parsers()),
            normalize_parameters: config.parser.normalize_parameters,
        })
    }

    /// Replace the extractor table.
    pub fn with_extractors(mut self, extractors: ExtractorRegistry) -> Self {
        self.extractors = extractors;
        self
    }

    pub fn parsers(&self) -> &[Parser] {
        &self.parsers
    }

    pub fn effort(&self) -> Effort {
        self.effort
    }

    /// Read generation metadata from a file, raw bytes or a decoded image.
    ///
    /// Returns `Ok(None)` when nothing in the image matches a known generator.
    pub async fn parse(
        &self,
        input: impl Into<ParseInput>,
        effort: Option<Effort>,
    ) -> Result<Option<PromptInfo>> {
        let image = match input.into() {
            ParseInput::Path(path) => {
                let bytes = tokio::fs::read(&path)
                    .await
                    .map_err(|source| Error::Io {
                        path: path.clone(),
                        source,
                    })?;
                DecodedImage::from_bytes(bytes)?
            }
            ParseInput::Bytes(bytes) => DecodedImage::from_bytes(bytes)?,
            ParseInput::Image(image) => image,
        };
        self.parse_image(&image, effort)
    }

    /// The search loop over an already sniffed image.
    pub fn parse_image(&self, image: &DecodedImage, effort: Option<Effort>) -> Result<Option<PromptInfo>> {
        let Some(format) = image.format().filter(|f| self.extractors.supports(*f)) else {
            if self.debug {
                log::debug!("No extractors for {:?} images", image.image_format());
            }
            return Ok(None);
        };

        let target = effort.unwrap_or(self.effort);
        for level in target.up_to() {
            for extractor in self.extractors.extractors(format, level) {
                'parsers: for parser in &self.parsers {
                    let generator = parser.generator();
                    let bag = match extractor.extract(image, generator) {
                        Ok(Some(bag)) => bag,
                        Ok(None) => continue,
                        Err(Error::Metadata(msg)) => {
                            if self.debug {
                                log::debug!("Extractor {} failed on {format} image: {msg}", extractor.name);
                            }
                            break 'parsers;
                        }
                        Err(e) => return Err(e),
                    };

                    match parser.parse(&bag) {
                        Ok(info) => {
                            if self.debug {
                                log::debug!("Matched {generator} using {} ({level} effort)", extractor.name);
                            }
                            return Ok(Some(info));
                        }
                        Err(Error::Parse(msg)) => {
                            if self.debug {
                                log::debug!("{generator} grammar skipped for {}: {msg}", extractor.name);
                            }
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        Ok(None)
    }
}

impl Default for ParserManager {
    fn default() -> Self {
        Self::new(ManagerOptions::default())
    }
}

/// Collect supported image files from the given paths.
///
/// Accepts a mix of file paths and directory paths. Directories are walked
/// recursively (following symlinks). Only PNG, JPEG and WebP extensions are
/// kept.
pub fn collect_images(paths: &[PathBuf]) -> Vec<PathBuf> {
    let mut images = Vec::new();

    for path in paths {
        if path.is_file() {
            if is_supported_image(path) {
                images.push(path.clone());
            } else {
                log::warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            for entry in WalkDir::new(path)
                .follow_links(true)
                .sort_by_file_name()
                .into_iter()
                .filter_map(|e| e.ok())
            {
                let p = entry.path();
                if p.is_file() && is_supported_image(p) {
                    images.push(p.to_path_buf());
                }
            }
        } else {
            log::warn!("Path does not exist: {}", path.display());
        }
    }

    images
}

fn is_supported_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}
