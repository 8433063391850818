//! End-to-end compilation: locate, extract and parse (cached, in parallel),
//! build, resolve, validate and lower into the output document.
//!
//! Per-unit work runs on a `rayon` pool; results are put back into unit path
//! order before the single-threaded build so the document never depends on
//! scheduling. No document is produced unless build, resolution and
//! validation all finish without fatal diagnostics.

use crate::cache::{IncrementalCache, ParsedBlock, UnitAnalysis};
use crate::config::CompilerConfig;
use crate::error::{Diagnostic, Error, Phase, Result, SourceLocation};
use crate::example_generator::synthesize_examples;
use crate::extractor::Extractors;
use crate::model_builder::build_model;
use crate::openapi::OpenApiDocument;
use crate::parser::AnnotationParser;
use crate::resolver::resolve;
use crate::scanner::{FileScanner, SourceUnit};
use crate::serializer::to_document;
use crate::validator::validate;
use log::{debug, info, warn};
use rayon::prelude::*;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Unit counts of one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileStats {
    /// Source units found by the locator
    pub located: usize,
    /// Units whose cached analysis was reused
    pub reused: usize,
    /// Units extracted and parsed in this run
    pub extracted: usize,
}

/// Result of a compilation run.
#[derive(Debug)]
pub struct CompileOutput {
    /// The emitted document, absent when any fatal diagnostic was reported
    pub document: Option<OpenApiDocument>,
    /// All diagnostics in phase order
    pub diagnostics: Vec<Diagnostic>,
    pub stats: CompileStats,
}

impl CompileOutput {
    pub fn fatal_count(&self) -> usize {
        self.diagnostics.iter().filter(|d| d.is_fatal()).count()
    }

    /// Takes the document, or explains why none was emitted.
    pub fn into_document(self) -> Result<OpenApiDocument> {
        let fatal = self.fatal_count();
        self.document.ok_or(Error::EmissionRefused { fatal })
    }
}

enum UnitOutcome {
    Reused(UnitAnalysis),
    Fresh { fingerprint: String, analysis: UnitAnalysis },
    Unreadable(UnitAnalysis),
}

/// Drives one compilation over the configured roots.
///
/// # Example
///
/// ```no_run
/// use openapi_from_annotations::config::CompilerConfig;
/// use openapi_from_annotations::pipeline::Compiler;
/// use std::path::PathBuf;
///
/// let config = CompilerConfig::with_roots(vec![PathBuf::from("./app")]);
/// let output = Compiler::new(config).compile().unwrap();
/// for diagnostic in &output.diagnostics {
///     eprintln!("{}", diagnostic);
/// }
/// ```
pub struct Compiler {
    config: CompilerConfig,
    extractors: Extractors,
    cancelled: Arc<AtomicBool>,
}

impl Compiler {
    pub fn new(config: CompilerConfig) -> Self {
        Self {
            config,
            extractors: Extractors::default(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Replaces the registered extraction backends.
    pub fn with_extractors(mut self, extractors: Extractors) -> Self {
        self.extractors = extractors;
        self
    }

    /// A handle that cancels the run when set to `true`.
    pub fn cancellation_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn check_cancelled(&self) -> Result<()> {
        if self.cancelled.load(Ordering::SeqCst) {
            info!("Compilation cancelled");
            return Err(Error::Cancelled);
        }
        Ok(())
    }

    /// Runs every phase and returns the document with all diagnostics.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] when no root resolves or a glob pattern
    /// is invalid, and [`Error::Cancelled`] when the cancellation flag was set.
    /// Problems inside the sources are diagnostics, not errors.
    pub fn compile(&self) -> Result<CompileOutput> {
        let mut diagnostics = Vec::new();
        let mut stats = CompileStats::default();

        info!("Locating source units...");
        let scanner = FileScanner::with_roots(self.config.roots.clone())
            .include(&self.config.include)?
            .exclude(&self.config.exclude)?;
        let scan = scanner.scan(|path| self.extractors.handles(path))?;
        diagnostics.extend(scan.warnings);
        stats.located = scan.files.len();
        info!("Found {} source units", stats.located);
        self.check_cancelled()?;

        let context = IncrementalCache::context_fingerprint(&self.config.constants);
        let mut cache = match &self.config.cache_path {
            Some(path) => IncrementalCache::load(path, &context),
            None => IncrementalCache::new(context),
        };

        info!("Extracting and parsing annotations...");
        let mut outcomes = self.analyze_units(&scan.files, &cache)?;
        outcomes.sort_by(|a, b| a.0.cmp(&b.0));
        self.check_cancelled()?;

        let present: BTreeSet<PathBuf> = scan.files.iter().cloned().collect();
        cache.retain_units(&present);

        let mut units = Vec::with_capacity(outcomes.len());
        for (path, outcome) in outcomes {
            let analysis = match outcome {
                UnitOutcome::Reused(analysis) => {
                    stats.reused += 1;
                    analysis
                }
                UnitOutcome::Fresh { fingerprint, analysis } => {
                    stats.extracted += 1;
                    cache.insert(path.clone(), fingerprint, analysis.clone());
                    analysis
                }
                UnitOutcome::Unreadable(analysis) => analysis,
            };
            diagnostics.extend(analysis.diagnostics);
            units.push((path, analysis.blocks));
        }
        info!(
            "Analyzed {} units ({} from cache, {} extracted)",
            stats.located, stats.reused, stats.extracted
        );

        if let Some(path) = &self.config.cache_path {
            if let Err(e) = cache.save(path) {
                let message = format!("Failed to save cache {}: {}", path.display(), e);
                warn!("{}", message);
                diagnostics.push(Diagnostic::warning(Phase::Configuration, message));
            }
        }

        info!("Building document model...");
        let (mut model, build_diagnostics) = build_model(&units, &self.config.metadata);
        diagnostics.extend(build_diagnostics);
        self.check_cancelled()?;

        info!("Resolving references...");
        diagnostics.extend(resolve(&mut model));
        self.check_cancelled()?;

        info!("Validating document model...");
        diagnostics.extend(validate(&model));
        self.check_cancelled()?;

        let fatal = diagnostics.iter().filter(|d| d.is_fatal()).count();
        let document = if fatal > 0 {
            warn!("{} fatal diagnostic(s), no document emitted", fatal);
            None
        } else {
            if self.config.synthesize_examples {
                synthesize_examples(&mut model);
            }
            Some(to_document(&model))
        };

        Ok(CompileOutput {
            document,
            diagnostics,
            stats,
        })
    }

    fn analyze_units(
        &self,
        files: &[PathBuf],
        cache: &IncrementalCache,
    ) -> Result<Vec<(PathBuf, UnitOutcome)>> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.threads.unwrap_or(0))
            .build()
            .map_err(|e| Error::Configuration(format!("failed to start worker pool: {}", e)))?;

        Ok(pool.install(|| {
            files
                .par_iter()
                .map(|path| (path.clone(), self.analyze_unit(path, cache)))
                .collect()
        }))
    }

    fn analyze_unit(&self, path: &Path, cache: &IncrementalCache) -> UnitOutcome {
        let unit = match SourceUnit::read(path) {
            Ok(unit) => unit,
            Err(e) => {
                let message = format!("Failed to read {}: {}", path.display(), e);
                warn!("{}", message);
                return UnitOutcome::Unreadable(UnitAnalysis {
                    blocks: Vec::new(),
                    diagnostics: vec![Diagnostic::error(Phase::Extraction, message)],
                });
            }
        };

        if let Some(analysis) = cache.lookup(path, &unit.fingerprint) {
            debug!("Reusing cached analysis for {}", path.display());
            return UnitOutcome::Reused(analysis.clone());
        }

        let analysis = analyze_source(&self.extractors, &self.config, &unit);
        UnitOutcome::Fresh {
            fingerprint: unit.fingerprint,
            analysis,
        }
    }
}

/// Extracts a unit's annotation blocks and parses each of them.
pub fn analyze_source(extractors: &Extractors, config: &CompilerConfig, unit: &SourceUnit) -> UnitAnalysis {
    let extraction = extractors.extract(unit);
    let parser = AnnotationParser::new(&config.constants);
    let mut diagnostics = extraction.diagnostics;
    let mut blocks = Vec::new();

    for block in extraction.blocks {
        let outcome = parser.parse(&block.text, block.start.line);
        for error in outcome.errors {
            warn!("{}:{}: {}", unit.path.display(), error.position.line, error.message);
            diagnostics.push(
                Diagnostic::error(Phase::Parse, error.message)
                    .at(SourceLocation::new(&unit.path, error.position)),
            );
        }
        if !outcome.nodes.is_empty() {
            blocks.push(ParsedBlock {
                symbol: block.symbol,
                start: block.start,
                nodes: outcome.nodes,
            });
        }
    }

    debug!(
        "{}: {} annotated blocks, {} diagnostics",
        unit.path.display(),
        blocks.len(),
        diagnostics.len()
    );
    UnitAnalysis { blocks, diagnostics }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const CONTROLLER: &str = r#"<?php

/**
 * @OA\Info(title="Projects API", version="2.0.0")
 */
class ProjectController
{
    /**
     * @OA\Get(
     *     path="/projects",
     *     @OA\Response(response=200, description="OK")
     * )
     */
    public function index() {}
}
"#;

    fn project(files: &[(&str, &str)]) -> TempDir {
        let dir = TempDir::new().unwrap();
        for (name, content) in files {
            fs::write(dir.path().join(name), content).unwrap();
        }
        dir
    }

    #[test]
    fn test_compile_emits_document() {
        let dir = project(&[("ProjectController.php", CONTROLLER)]);
        let output = Compiler::new(CompilerConfig::with_roots(vec![dir.path().to_path_buf()]))
            .compile()
            .unwrap();

        assert_eq!(output.stats.located, 1);
        assert_eq!(output.stats.extracted, 1);
        let document = output.document.unwrap();
        assert_eq!(document.info.title, "Projects API");
        let get = document.paths["/projects"].get.as_ref().unwrap();
        assert_eq!(get.operation_id, "ProjectController_index");
    }

    #[test]
    fn test_parse_errors_do_not_block_emission() {
        let broken = "<?php\n/**\n * @OA\\Get(path=\"/broken\"\n */\nfunction broken() {}\n";
        let dir = project(&[("ProjectController.php", CONTROLLER), ("broken.php", broken)]);
        let output = Compiler::new(CompilerConfig::with_roots(vec![dir.path().to_path_buf()]))
            .compile()
            .unwrap();

        assert!(output
            .diagnostics
            .iter()
            .any(|d| d.phase == Phase::Parse
                && d.location.as_ref().unwrap().path.ends_with("broken.php")));
        assert!(output.document.is_some());
    }

    #[test]
    fn test_fatal_diagnostics_refuse_emission() {
        let missing_response = "<?php\n/**\n * @OA\\Get(path=\"/empty\")\n */\nfunction empty() {}\n";
        let dir = project(&[("empty.php", missing_response)]);
        let output = Compiler::new(CompilerConfig::with_roots(vec![dir.path().to_path_buf()]))
            .compile()
            .unwrap();

        assert!(output.document.is_none());
        assert!(output.fatal_count() > 0);
        assert!(matches!(output.into_document(), Err(Error::EmissionRefused { .. })));
    }

    #[test]
    fn test_cancelled_run_publishes_nothing() {
        let dir = project(&[("ProjectController.php", CONTROLLER)]);
        let compiler = Compiler::new(CompilerConfig::with_roots(vec![dir.path().to_path_buf()]));
        compiler.cancellation_flag().store(true, Ordering::SeqCst);

        assert!(matches!(compiler.compile(), Err(Error::Cancelled)));
    }

    #[test]
    fn test_missing_root_is_configuration_error() {
        let config = CompilerConfig::with_roots(vec![PathBuf::from("/definitely/not/here")]);
        assert!(matches!(Compiler::new(config).compile(), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_cache_reuses_unchanged_units() {
        let dir = project(&[("ProjectController.php", CONTROLLER)]);
        let cache_dir = TempDir::new().unwrap();
        let mut config = CompilerConfig::with_roots(vec![dir.path().to_path_buf()]);
        config.cache_path = Some(cache_dir.path().join("cache.json"));

        let first = Compiler::new(config.clone()).compile().unwrap();
        let second = Compiler::new(config.clone()).compile().unwrap();

        assert_eq!(first.stats.extracted, 1);
        assert_eq!(second.stats.reused, 1);
        assert_eq!(second.stats.extracted, 0);
        assert_eq!(first.document, second.document);

        config.constants.insert("LIMIT".to_string(), serde_json::json!(10));
        let third = Compiler::new(config).compile().unwrap();
        assert_eq!(third.stats.reused, 0);
    }
}
