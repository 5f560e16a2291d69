use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::data::Generator;
use crate::extractors::Effort;
use crate::parsers::Parser;

/// Top-level configuration for the sd-parsers library and CLI.
///
/// # Loading
///
/// ```rust,no_run
/// use sd_parsers::config::Config;
/// use sd_parsers::extractors::Effort;
///
/// // From a JSON file
/// let config = Config::load(Some("config.json".as_ref())).unwrap();
///
/// // Or use defaults and customize
/// let mut config = Config::default();
/// config.parser.effort = Effort::High;
/// config.output.json = true;
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// How images are searched for metadata.
    pub parser: ParserConfig,
    /// How results are printed by the CLI.
    pub output: OutputConfig,
}

/// Search behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ParserConfig {
    /// Effort level used when none is given on the command line.
    pub effort: Effort,
    /// Log skipped extractors and grammars.
    pub debug: bool,
    /// Lower-case parameter keys and join their words with `_`.
    pub normalize_parameters: bool,
    /// Grammars to try, in order.
    pub parsers: Vec<Generator>,
}

/// Output behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Print JSON instead of tables.
    pub json: bool,
    /// Indent JSON output.
    pub pretty: bool,
    /// Include the raw extracted metadata in the output.
    pub include_raw: bool,
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self {
            effort: Effort::Default,
            debug: false,
            normalize_parameters: true,
            parsers: Parser::PRECEDENCE.to_vec(),
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            json: false,
            pretty: true,
            include_raw: false,
        }
    }
}

impl Config {
    /// `config.json` next to the executable.
    pub fn config_path() -> Result<PathBuf> {
        let exe_path = std::env::current_exe().context("Failed to get executable path")?;
        let exe_dir = exe_path
            .parent()
            .context("Failed to get executable directory")?;
        Ok(exe_dir.join("config.json"))
    }

    /// Load config from the given path, or from the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        if !config_path.exists() {
            log::debug!(
                "Config file not found at {}. Using defaults.",
                config_path.display()
            );
            return Ok(Self::default());
        }

        let contents =
            std::fs::read_to_string(&config_path).context("Failed to read config file")?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config file")?;
        Ok(config)
    }

    /// Save config to the given path, or to the default location.
    pub fn save(&self, path: Option<&Path>) -> Result<()> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::config_path()?,
        };

        let contents = serde_json::to_string_pretty(self).context("Failed to serialize config")?;
        std::fs::write(&config_path, contents).context("Failed to write config file")?;
        log::info!("Config saved to {}", config_path.display());
        Ok(())
    }

    /// The configured grammars, in order. Unknown entries give the stub grammar.
    pub fn managed_parsers(&self) -> Vec<Parser> {
        self.parser
            .parsers
            .iter()
            .map(|g| Parser::for_generator(*g, self.parser.normalize_parameters))
            .collect()
    }
}
