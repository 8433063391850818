//! OpenAPI from annotations - Compile annotations embedded in source comments
//! into an OpenAPI 3.0 document.
//!
//! Annotations such as `@OA\Get(path="/projects", ...)` are written in doc
//! comments next to controllers, request shapes and resource shapes. This
//! library finds them, parses them into annotation trees, folds them into a
//! single document model, resolves cross-references, validates the result and
//! serializes it deterministically.
//!
//! # Supported Sources
//!
//! - **Docblocks**: `/** ... */` comments in PHP, Java, TypeScript, JavaScript and C#
//! - **Rust**: outer and inner doc comments, bound to items parsed with `syn`
//!
//! # Architecture
//!
//! The library is organized into several modules that work together:
//!
//! 1. [`scanner`] - Locates source units under the configured roots
//! 2. [`extractor`] - Lifts annotation blocks and their owning declarations
//! 3. [`parser`] - Parses annotation text into [`annotation`] trees
//! 4. [`model_builder`] - Folds the trees into a [`model::DocumentModel`],
//!    with [`schema_generator`] and [`type_resolver`] inferring field schemas
//! 5. [`resolver`] - Resolves references into the component registry
//! 6. [`validator`] - Checks the semantic rules of the document
//! 7. [`serializer`] - Lowers the model into an [`openapi`] document and renders it
//! 8. [`cache`] - Reuses per-unit results for unchanged sources
//!
//! [`pipeline`] runs all of them in order.
//!
//! # Example Usage
//!
//! ```no_run
//! use openapi_from_annotations::{
//!     config::CompilerConfig,
//!     pipeline::Compiler,
//!     serializer::serialize_yaml,
//! };
//! use std::path::PathBuf;
//!
//! let config = CompilerConfig::with_roots(vec![PathBuf::from("./app")]);
//! let output = Compiler::new(config).compile().unwrap();
//!
//! for diagnostic in &output.diagnostics {
//!     eprintln!("{}", diagnostic);
//! }
//!
//! if let Some(document) = output.document {
//!     println!("{}", serialize_yaml(&document).unwrap());
//! }
//! ```
//!
//! # Command-Line Interface
//!
//! For command-line usage, see the [`cli`] module which provides a complete CLI application.

pub mod annotation;
pub mod cache;
pub mod cli;
pub mod config;
pub mod error;
pub mod example_generator;
pub mod extractor;
pub mod model;
pub mod model_builder;
pub mod openapi;
pub mod parser;
pub mod pipeline;
pub mod resolver;
pub mod scanner;
pub mod schema_generator;
pub mod serializer;
pub mod type_resolver;
pub mod validator;
