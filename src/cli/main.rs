use anyhow::Result;
use clap::Parser;
use serde_json::Value;
use std::path::PathBuf;

use sd_parsers::{Effort, Generator, PromptInfo, config, pipeline};

#[derive(Parser, Debug)]
#[command(
    name = "sd-parsers-cli",
    version,
    about = "Show the prompts, samplers and models embedded in AI generated images"
)]
struct Cli {
    /// Image files or directories to read
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// How hard to look for metadata
    #[arg(short, long, value_enum)]
    effort: Option<Effort>,

    /// Only try these generators, in this order (repeatable)
    #[arg(short, long = "parser", value_name = "GENERATOR")]
    parsers: Vec<Generator>,

    /// Keep parameter keys exactly as the generator wrote them
    #[arg(long)]
    no_normalize: bool,

    /// Output results as JSON
    #[arg(long)]
    json: bool,

    /// Include the raw extracted metadata
    #[arg(long)]
    raw: bool,

    /// Verbose output, including skipped extractors and grammars
    #[arg(short, long, visible_alias = "debug")]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = config::Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => config::Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    if cli.paths.is_empty() {
        anyhow::bail!("No input files or directories specified. Use --help for usage.");
    }

    // Load config, command line flags win
    let mut config = config::Config::load(cli.config.as_deref())?;
    if let Some(effort) = cli.effort {
        config.parser.effort = effort;
    }
    if !cli.parsers.is_empty() {
        config.parser.parsers = cli.parsers.clone();
    }
    if cli.no_normalize {
        config.parser.normalize_parameters = false;
    }
    if cli.verbose {
        config.parser.debug = true;
    }
    if cli.json {
        config.output.json = true;
    }
    if cli.raw {
        config.output.include_raw = true;
    }

    let images = pipeline::collect_images(&cli.paths);
    if images.is_empty() {
        anyhow::bail!("No supported image files found in the specified paths.");
    }
    log::info!("Found {} image(s) to read", images.len());
    log::debug!(
        "Grammars: {}",
        config
            .parser
            .parsers
            .iter()
            .map(Generator::as_str)
            .collect::<Vec<_>>()
            .join(" → ")
    );

    let manager = pipeline::ParserManager::from_config(&config);
    let total = images.len();
    let mut found = 0;
    let mut failed = 0;
    let mut json_results = Vec::new();

    for (i, image_path) in images.iter().enumerate() {
        log::debug!("[{}/{}] Reading: {}", i + 1, total, image_path.display());

        let outcome = manager.parse(image_path.clone(), None).await;
        let info = match outcome {
            Ok(info) => info,
            Err(e) => {
                log::error!("{}: {e}", image_path.display());
                failed += 1;
                continue;
            }
        };
        if info.is_some() {
            found += 1;
        }

        if config.output.json {
            let result = match &info {
                Some(info) => {
                    let mut value = info.to_value()?;
                    if !config.output.include_raw {
                        if let Some(map) = value.as_object_mut() {
                            map.shift_remove("rawParameters");
                        }
                    }
                    value
                }
                None => Value::Null,
            };
            json_results.push(serde_json::json!({
                "path": image_path.display().to_string(),
                "result": result,
            }));
        } else {
            print_info(image_path, info.as_ref(), config.output.include_raw);
        }
    }

    if config.output.json {
        let output = if config.output.pretty {
            serde_json::to_string_pretty(&json_results)?
        } else {
            serde_json::to_string(&json_results)?
        };
        println!("{output}");
    }

    log::info!(
        "Done: {found} with metadata, {} without, {failed} failed out of {total} images",
        total - found - failed
    );

    Ok(())
}

// ANSI color codes
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Value column width for wrapping
const VAL_WIDTH: usize = 46;
/// Indentation for continuation lines (2 + 22 + 3 = 27 chars)
const INDENT: &str = "                           ";

/// Print one image as a table of prompts, models and samplers.
fn print_info(path: &std::path::Path, info: Option<&PromptInfo>, include_raw: bool) {
    println!();
    println!("{BOLD}File:{RESET} {}", path.display());
    println!("{DIM}{}{RESET}", "═".repeat(72));

    let Some(info) = info else {
        println!("  {DIM}(no generation metadata found){RESET}");
        println!();
        return;
    };

    print_row("Generator", info.generator.as_str());
    let prompt = info.full_prompt();
    if !prompt.is_empty() {
        print_row("Prompt", &prompt);
    }
    let negative = info.full_negative_prompt();
    if !negative.is_empty() {
        print_row("Negative prompt", &negative);
    }
    for model in info.models() {
        print_row("Model", &model.to_string());
    }
    println!();

    for (i, sampler) in info.samplers.iter().enumerate() {
        let title = match &sampler.sampler_id {
            Some(id) => format!("Sampler {} (node {id})", i + 1),
            None => format!("Sampler {}", i + 1),
        };
        println!("  {BOLD}{title}{RESET}");
        println!("  {DIM}{}{RESET}", "─".repeat(70));
        print_row("name", &sampler.name);
        for (key, value) in &sampler.parameters {
            print_row(key, &plain(value));
        }
        println!();
    }

    if !info.metadata.is_empty() {
        print_section("Metadata", &info.metadata);
    }
    if include_raw {
        print_section("Raw metadata", &info.raw_parameters);
    }
}

fn print_section(title: &str, map: &sd_parsers::MetadataMap) {
    println!("  {BOLD}{title}{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(70));
    for (key, value) in map {
        print_row(key, &plain(value));
    }
    println!();
}

fn plain(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Print a single row in the display table.
fn print_row(tag: &str, val: &str) {
    let tag_col = format!("{:<22}", tag);
    let lines = wrap_text(val, VAL_WIDTH);
    for (i, line) in lines.iter().enumerate() {
        if i == 0 {
            println!("  {tag_col} : {line}");
        } else {
            println!("  {INDENT}{line}");
        }
    }
}

/// Wrap text at word boundaries to fit within max_width.
fn wrap_text(s: &str, max_width: usize) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current_line = String::new();

    for word in s.split_whitespace() {
        if current_line.is_empty() {
            current_line = word.to_string();
        } else if current_line.len() + 1 + word.len() <= max_width {
            current_line.push(' ');
            current_line.push_str(word);
        } else {
            lines.push(current_line);
            current_line = word.to_string();
        }
    }

    if !current_line.is_empty() {
        lines.push(current_line);
    }

    if lines.is_empty() {
        lines.push(s.to_string());
    }

    lines
}
