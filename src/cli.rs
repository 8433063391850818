use crate::config::CompilerConfig;
use crate::pipeline::Compiler;
use crate::serializer::{serialize_json, serialize_yaml, write_to_file};
use anyhow::Result;
use clap::{Parser, ValueEnum};
use log::{debug, info};
use std::path::PathBuf;

/// OpenAPI from annotations - Compile OpenAPI annotations in source comments into an OpenAPI document
#[derive(Parser, Debug)]
#[command(name = "openapi-from-annotations")]
#[command(author, version, about, long_about = None)]
pub struct CliArgs {
    /// Source root directories to scan
    #[arg(value_name = "ROOTS")]
    pub roots: Vec<PathBuf>,

    /// Configuration file (YAML or JSON)
    #[arg(short = 'c', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Only scan root-relative paths matching this glob (repeatable)
    #[arg(short = 'i', long = "include", value_name = "GLOB")]
    pub include: Vec<String>,

    /// Skip root-relative paths matching this glob (repeatable)
    #[arg(short = 'e', long = "exclude", value_name = "GLOB")]
    pub exclude: Vec<String>,

    /// Define an annotation constant (repeatable)
    #[arg(short = 'D', long = "define", value_name = "NAME=VALUE")]
    pub define: Vec<String>,

    /// Override the document title
    #[arg(long = "title")]
    pub title: Option<String>,

    /// Override the document version
    #[arg(long = "api-version")]
    pub api_version: Option<String>,

    /// Add a server URL in front of the annotated servers
    #[arg(long = "server-url", value_name = "URL")]
    pub server_url: Option<String>,

    /// Output format (yaml or json)
    #[arg(short = 'f', long = "format", value_enum, default_value = "yaml")]
    pub output_format: OutputFormat,

    /// Output file path (if not specified, outputs to stdout)
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    pub output_path: Option<PathBuf>,

    /// Persist the incremental cache in this file
    #[arg(long = "cache", value_name = "FILE")]
    pub cache: Option<PathBuf>,

    /// Generate media type examples from schemas
    #[arg(long = "examples")]
    pub examples: bool,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose")]
    pub verbose: bool,
}

/// Output format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// YAML format
    Yaml,
    /// JSON format
    Json,
}

/// Parse command line arguments
pub fn parse_args() -> Result<CliArgs> {
    let args = CliArgs::parse();
    parse_args_from_parsed(args)
}

/// Validate and log already-parsed arguments
pub fn parse_args_from_parsed(args: CliArgs) -> Result<CliArgs> {
    debug!("Parsed arguments: {:?}", args);

    if args.roots.is_empty() && args.config.is_none() {
        anyhow::bail!("No source roots given. Pass at least one ROOT or a --config file");
    }

    for root in &args.roots {
        info!("Source root: {}", root.display());
    }
    info!("Output format: {:?}", args.output_format);
    if let Some(ref output) = args.output_path {
        info!("Output file: {}", output.display());
    } else {
        info!("Output: stdout");
    }

    Ok(args)
}

/// Merges the configuration file (if any) with command-line overrides.
pub fn build_config(args: &CliArgs) -> Result<CompilerConfig> {
    let mut config = match &args.config {
        Some(path) => CompilerConfig::load(path)?,
        None => CompilerConfig::default(),
    };

    if !args.roots.is_empty() {
        config.roots = args.roots.clone();
    }
    config.include.extend(args.include.iter().cloned());
    config.exclude.extend(args.exclude.iter().cloned());
    for definition in &args.define {
        config.define(definition)?;
    }
    if args.title.is_some() {
        config.metadata.title = args.title.clone();
    }
    if args.api_version.is_some() {
        config.metadata.version = args.api_version.clone();
    }
    if args.server_url.is_some() {
        config.metadata.server_url = args.server_url.clone();
    }
    if args.cache.is_some() {
        config.cache_path = args.cache.clone();
    }
    if args.examples {
        config.synthesize_examples = true;
    }

    if config.roots.is_empty() {
        anyhow::bail!("No source roots configured");
    }
    Ok(config)
}

/// Run the main workflow
pub fn run(args: CliArgs) -> Result<()> {
    info!("Starting OpenAPI document compilation...");
    let config = build_config(&args)?;

    let output = Compiler::new(config).compile()?;
    for diagnostic in &output.diagnostics {
        eprintln!("{}", diagnostic);
    }

    info!("Summary:");
    info!("  - Units located: {}", output.stats.located);
    info!("  - Units reused from cache: {}", output.stats.reused);
    info!("  - Units extracted: {}", output.stats.extracted);
    info!("  - Diagnostics: {}", output.diagnostics.len());

    let document = output.into_document()?;

    info!("Serializing to {:?} format...", args.output_format);
    let content = match args.output_format {
        OutputFormat::Yaml => serialize_yaml(&document)?,
        OutputFormat::Json => serialize_json(&document)?,
    };

    if let Some(output_path) = &args.output_path {
        info!("Writing output to: {}", output_path.display());
        write_to_file(&content, output_path)?;
        info!("Successfully wrote OpenAPI document to {}", output_path.display());
    } else {
        println!("{}", content);
    }

    Ok(())
}
