//! OpenAPI from annotations - Command-line compiler for annotated API sources.
//!
//! This binary scans source roots for OpenAPI annotations embedded in doc
//! comments (PHP/Java/TypeScript/JavaScript/C# docblocks and Rust doc comments),
//! assembles them into one document model, resolves references, validates the
//! result and writes an OpenAPI 3.0 document.
//!
//! # Usage
//!
//! ```bash
//! openapi-from-annotations [OPTIONS] <ROOTS>...
//! ```
//!
//! # Examples
//!
//! Generate YAML documentation:
//! ```bash
//! openapi-from-annotations ./app -o openapi.yaml
//! ```
//!
//! Generate JSON with a constant and an incremental cache:
//! ```bash
//! openapi-from-annotations ./app -D API_VERSION=2 --cache .openapi-cache.json -f json
//! ```
//!
//! Enable verbose logging:
//! ```bash
//! openapi-from-annotations ./app -v
//! ```

use anyhow::Result;
use clap::Parser;
use log::info;
use openapi_from_annotations::cli;

fn main() -> Result<()> {
    // Parse first so the verbose flag can pick the log level
    let args_for_verbose = cli::CliArgs::parse();

    let log_level = if args_for_verbose.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .init();

    info!("OpenAPI annotation compiler starting...");

    let args = cli::parse_args_from_parsed(args_for_verbose)?;

    cli::run(args)?;

    info!("OpenAPI document generation completed successfully");

    Ok(())
}
