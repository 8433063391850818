//! Annotation extraction from source units.
//!
//! This module provides a unified interface for lifting raw annotation blocks out
//! of source files. Each source-artifact kind has its own [`BoundaryDetector`]
//! that knows where comments and declarations begin and end; the annotation
//! grammar itself is handled separately by [`crate::parser`].
//!
//! # Supported Sources
//!
//! - **Rust**: See [`rust::RustDetector`]
//! - **C-family docblocks** (PHP, Java, TypeScript, JavaScript, C#): See [`docblock::DocblockDetector`]
//!
//! # Example
//!
//! ```no_run
//! use openapi_from_annotations::extractor::Extractors;
//! use openapi_from_annotations::scanner::SourceUnit;
//! use std::path::Path;
//!
//! let unit = SourceUnit::read(Path::new("app/Http/Controllers/ProjectController.php")).unwrap();
//! let extraction = Extractors::default().extract(&unit);
//! println!("Found {} annotation blocks", extraction.blocks.len());
//! ```

pub mod docblock;
pub mod rust;

use crate::error::{Diagnostic, Phase, Position, SourceLocation};
use crate::scanner::SourceUnit;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Trait for finding annotation blocks and the declarations they belong to.
///
/// Implementations only need to understand comment and declaration boundaries of
/// their source format; they never interpret the annotation text.
pub trait BoundaryDetector: Send + Sync {
    /// Short backend name used in logs
    fn name(&self) -> &'static str;

    /// Whether this backend understands the given file
    fn handles(&self, path: &Path) -> bool;

    /// Lifts all annotation blocks out of a unit.
    ///
    /// Malformed comments are reported as extraction diagnostics; blocks found
    /// before the problem are still returned.
    fn extract(&self, unit: &SourceUnit) -> Extraction;
}

/// Blocks and diagnostics produced for one unit.
#[derive(Debug, Default)]
pub struct Extraction {
    pub blocks: Vec<RawAnnotationBlock>,
    pub diagnostics: Vec<Diagnostic>,
}

/// The kind of declaration an annotation block is attached to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SymbolKind {
    Type,
    Method,
    Field,
    /// No declaration follows the block
    File,
}

/// The declaration owning an annotation block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Symbol {
    pub kind: SymbolKind,
    /// Qualified name: `Type`, `Type::method`, `Type.field`, or `<file>`
    pub name: String,
    /// Declared type of a field, as written in the source
    pub declared_type: Option<String>,
}

impl Symbol {
    pub fn file() -> Self {
        Self {
            kind: SymbolKind::File,
            name: "<file>".to_string(),
            declared_type: None,
        }
    }

    pub fn new(kind: SymbolKind, name: impl Into<String>) -> Self {
        Self {
            kind,
            name: name.into(),
            declared_type: None,
        }
    }

    pub fn field(name: impl Into<String>, declared_type: Option<String>) -> Self {
        Self {
            kind: SymbolKind::Field,
            name: name.into(),
            declared_type,
        }
    }

    /// Unqualified name of the declaration (`Project` for `models::Project`).
    pub fn short_name(&self) -> &str {
        let name = self.name.rsplit('.').next().unwrap_or(&self.name);
        name.rsplit("::").next().unwrap_or(name)
    }

    /// Qualified name of the enclosing type of a field or method.
    pub fn owner(&self) -> Option<&str> {
        match self.kind {
            SymbolKind::Field => self.name.rsplit_once('.').map(|(owner, _)| owner),
            SymbolKind::Method => self.name.rsplit_once("::").map(|(owner, _)| owner),
            SymbolKind::Type | SymbolKind::File => None,
        }
    }
}

/// A comment block carrying annotations, tagged with its owning symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAnnotationBlock {
    pub symbol: Symbol,
    /// Where the comment starts; text line `i` is source line `start.line + i`
    pub start: Position,
    pub end: Position,
    /// Comment text with delimiters and `*` gutters removed
    pub text: String,
}

/// Strips a leading `*` gutter (and one following space) from a comment line.
pub(crate) fn strip_gutter(line: &str) -> &str {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix('*') {
        Some(rest) => rest.strip_prefix(' ').unwrap_or(rest),
        None => trimmed,
    }
}

pub(crate) fn extraction_error(unit: &SourceUnit, position: Position, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(Phase::Extraction, message).at(SourceLocation::new(&unit.path, position))
}

/// The set of registered boundary detectors, dispatched by file.
pub struct Extractors {
    detectors: Vec<Box<dyn BoundaryDetector>>,
}

impl Default for Extractors {
    fn default() -> Self {
        Self::new(vec![
            Box::new(rust::RustDetector),
            Box::new(docblock::DocblockDetector),
        ])
    }
}

impl Extractors {
    pub fn new(detectors: Vec<Box<dyn BoundaryDetector>>) -> Self {
        Self { detectors }
    }

    pub fn handles(&self, path: &Path) -> bool {
        self.detector_for(path).is_some()
    }

    pub fn detector_for(&self, path: &Path) -> Option<&dyn BoundaryDetector> {
        self.detectors
            .iter()
            .find(|d| d.handles(path))
            .map(|d| d.as_ref())
    }

    /// Extracts a unit with the first detector that handles it.
    pub fn extract(&self, unit: &SourceUnit) -> Extraction {
        match self.detector_for(&unit.path) {
            Some(detector) => {
                log::debug!("Extracting {} with {} backend", unit.path.display(), detector.name());
                detector.extract(unit)
            }
            None => Extraction {
                blocks: Vec::new(),
                diagnostics: vec![Diagnostic::warning(
                    Phase::Extraction,
                    format!("No extraction backend for {}", unit.path.display()),
                )],
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_symbol_names() {
        let field = Symbol::field("models::Project.name", Some("String".to_string()));
        assert_eq!(field.short_name(), "name");
        assert_eq!(field.owner(), Some("models::Project"));

        let method = Symbol::new(SymbolKind::Method, "ProjectController::index");
        assert_eq!(method.short_name(), "index");
        assert_eq!(method.owner(), Some("ProjectController"));

        let ty = Symbol::new(SymbolKind::Type, "models::Project");
        assert_eq!(ty.short_name(), "Project");
        assert_eq!(ty.owner(), None);
    }

    #[test]
    fn test_strip_gutter() {
        assert_eq!(strip_gutter("   * @Get(path=\"/\")"), "@Get(path=\"/\")");
        assert_eq!(strip_gutter("   *     @Response()"), "    @Response()");
        assert_eq!(strip_gutter("   *"), "");
        assert_eq!(strip_gutter("  plain"), "plain");
    }

    #[test]
    fn test_dispatch_by_extension() {
        let extractors = Extractors::default();
        assert_eq!(extractors.detector_for(Path::new("a.rs")).unwrap().name(), "rust");
        assert_eq!(extractors.detector_for(Path::new("A.php")).unwrap().name(), "docblock");
        assert!(!extractors.handles(Path::new("README.md")));

        let unit = SourceUnit::new(PathBuf::from("notes.txt"), "/** @Tag(name=\"x\") */".into());
        let extraction = extractors.extract(&unit);
        assert!(extraction.blocks.is_empty());
        assert_eq!(extraction.diagnostics.len(), 1);
    }
}
