use crate::cache::fingerprint;
use crate::error::{Diagnostic, Error, Phase, Result};
use glob::Pattern;
use log::{debug, warn};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Source locator for traversing the configured source roots.
///
/// The `FileScanner` recursively walks every root to find candidate source units.
/// It automatically skips the `target` directory and hidden directories (those
/// starting with `.`), applies include/exclude glob patterns to the root-relative
/// path, and returns a sorted, duplicate-free list of files.
///
/// # Example
///
/// ```no_run
/// use openapi_from_annotations::scanner::FileScanner;
/// use std::path::PathBuf;
///
/// let scanner = FileScanner::new(PathBuf::from("./app"));
/// let result = scanner.scan(|_| true).unwrap();
/// println!("Found {} source units", result.files.len());
/// ```
pub struct FileScanner {
    roots: Vec<PathBuf>,
    include: Vec<Pattern>,
    exclude: Vec<Pattern>,
}

/// Result of a scanning operation.
pub struct ScanResult {
    /// Sorted, duplicate-free paths of all located source units
    pub files: Vec<PathBuf>,
    /// Non-fatal problems (missing roots, unreadable directories)
    pub warnings: Vec<Diagnostic>,
}

/// One located source file together with its contents and fingerprint.
#[derive(Debug, Clone)]
pub struct SourceUnit {
    pub path: PathBuf,
    pub contents: String,
    /// SHA-256 of `contents`, hex encoded
    pub fingerprint: String,
}

impl SourceUnit {
    pub fn new(path: PathBuf, contents: String) -> Self {
        let fingerprint = fingerprint(contents.as_bytes());
        Self {
            path,
            contents,
            fingerprint,
        }
    }

    /// Reads a source unit from disk.
    pub fn read(path: &Path) -> std::io::Result<Self> {
        let contents = fs::read_to_string(path)?;
        Ok(Self::new(path.to_path_buf(), contents))
    }
}

impl FileScanner {
    /// Creates a new `FileScanner` for a single root directory.
    pub fn new(root_path: PathBuf) -> Self {
        Self::with_roots(vec![root_path])
    }

    /// Creates a new `FileScanner` over several root directories.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            include: Vec::new(),
            exclude: Vec::new(),
        }
    }

    /// Restricts scanning to root-relative paths matching one of `patterns`.
    ///
    /// # Errors
    ///
    /// Returns a configuration error if a pattern is not a valid glob.
    pub fn include(mut self, patterns: &[String]) -> Result<Self> {
        self.include = compile_patterns(patterns)?;
        Ok(self)
    }

    /// Skips root-relative paths matching one of `patterns`.
    pub fn exclude(mut self, patterns: &[String]) -> Result<Self> {
        self.exclude = compile_patterns(patterns)?;
        Ok(self)
    }

    /// Scans all roots and collects the files `accepts` approves of.
    ///
    /// Missing roots are reported as warnings as long as at least one root
    /// exists. Inaccessible entries are recorded as warnings and scanning
    /// continues.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Configuration`] if no root can be resolved.
    pub fn scan(&self, accepts: impl Fn(&Path) -> bool) -> Result<ScanResult> {
        let mut files = BTreeSet::new();
        let mut warnings = Vec::new();
        let mut resolved_roots = 0;

        for root in &self.roots {
            let root = match fs::canonicalize(root) {
                Ok(root) if root.is_dir() => root,
                _ => {
                    let message = format!("Source root does not exist: {}", root.display());
                    warn!("{}", message);
                    warnings.push(Diagnostic::warning(Phase::Configuration, message));
                    continue;
                }
            };
            resolved_roots += 1;
            debug!("Scanning root: {}", root.display());

            for entry in WalkDir::new(&root).into_iter().filter_entry(|e| {
                // Don't filter the root directory itself
                if e.path() == root {
                    return true;
                }

                // Skip target directory and hidden directories
                let file_name = e.file_name().to_string_lossy();
                !file_name.starts_with('.') && file_name != "target"
            }) {
                match entry {
                    Ok(entry) => {
                        let path = entry.path();
                        if path.is_file() && accepts(path) && self.matches(&root, path) {
                            files.insert(path.to_path_buf());
                        }
                    }
                    Err(e) => {
                        let message = format!("Failed to access path: {}", e);
                        warn!("{}", message);
                        warnings.push(Diagnostic::warning(Phase::Configuration, message));
                    }
                }
            }
        }

        if resolved_roots == 0 {
            return Err(Error::Configuration(
                "none of the configured source roots exist".to_string(),
            ));
        }

        Ok(ScanResult {
            files: files.into_iter().collect(),
            warnings,
        })
    }

    fn matches(&self, root: &Path, path: &Path) -> bool {
        let relative = path.strip_prefix(root).unwrap_or(path);
        let included =
            self.include.is_empty() || self.include.iter().any(|p| p.matches_path(relative));
        included && !self.exclude.iter().any(|p| p.matches_path(relative))
    }
}

fn compile_patterns(patterns: &[String]) -> Result<Vec<Pattern>> {
    patterns
        .iter()
        .map(|p| {
            Pattern::new(p)
                .map_err(|e| Error::Configuration(format!("invalid glob pattern '{}': {}", p, e)))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn is_php(path: &Path) -> bool {
        path.extension().and_then(|s| s.to_str()) == Some("php")
    }

    fn file_names(result: &ScanResult) -> Vec<String> {
        result
            .files
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_scan_filters_by_acceptor() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::write(root.join("UserController.php"), "<?php").unwrap();
        fs::write(root.join("Project.php"), "<?php").unwrap();
        fs::write(root.join("readme.md"), "# README").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan(is_php).unwrap();

        assert_eq!(file_names(&result), vec!["Project.php", "UserController.php"]);
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_empty_directory() {
        let temp_dir = TempDir::new().unwrap();

        let result = FileScanner::new(temp_dir.path().to_path_buf())
            .scan(|_| true)
            .unwrap();

        assert!(result.files.is_empty());
        assert!(result.warnings.is_empty());
    }

    #[test]
    fn test_scan_skips_target_and_hidden_directories() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir(root.join("target")).unwrap();
        fs::create_dir(root.join(".git")).unwrap();
        fs::write(root.join("target/Built.php"), "<?php").unwrap();
        fs::write(root.join(".git/Hook.php"), "<?php").unwrap();
        fs::write(root.join("Api.php"), "<?php").unwrap();

        let result = FileScanner::new(root.to_path_buf()).scan(is_php).unwrap();

        assert_eq!(file_names(&result), vec!["Api.php"]);
    }

    #[test]
    fn test_include_and_exclude_patterns() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();

        fs::create_dir_all(root.join("Http/Controllers")).unwrap();
        fs::create_dir_all(root.join("tests")).unwrap();
        fs::write(root.join("Http/Controllers/ProjectController.php"), "<?php").unwrap();
        fs::write(root.join("tests/ProjectTest.php"), "<?php").unwrap();
        fs::write(root.join("helpers.php"), "<?php").unwrap();

        let result = FileScanner::new(root.to_path_buf())
            .include(&["Http/**".to_string(), "tests/**".to_string()])
            .unwrap()
            .exclude(&["tests/**".to_string()])
            .unwrap()
            .scan(is_php)
            .unwrap();

        assert_eq!(file_names(&result), vec!["ProjectController.php"]);
    }

    #[test]
    fn test_invalid_pattern_is_configuration_error() {
        let result = FileScanner::new(PathBuf::from(".")).include(&["[".to_string()]);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }

    #[test]
    fn test_missing_root_warns_when_another_resolves() {
        let temp_dir = TempDir::new().unwrap();
        fs::write(temp_dir.path().join("Api.php"), "<?php").unwrap();

        let scanner = FileScanner::with_roots(vec![
            temp_dir.path().join("does-not-exist"),
            temp_dir.path().to_path_buf(),
        ]);
        let result = scanner.scan(is_php).unwrap();

        assert_eq!(result.files.len(), 1);
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.warnings[0].phase, Phase::Configuration);
    }

    #[test]
    fn test_all_roots_missing_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let scanner = FileScanner::new(temp_dir.path().join("nope"));
        assert!(matches!(scanner.scan(|_| true), Err(Error::Configuration(_))));
    }

    #[test]
    fn test_overlapping_roots_are_deduplicated() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path();
        fs::create_dir(root.join("Models")).unwrap();
        fs::write(root.join("Models/Project.php"), "<?php").unwrap();

        let scanner = FileScanner::with_roots(vec![root.to_path_buf(), root.join("Models")]);
        let result = scanner.scan(is_php).unwrap();

        assert_eq!(result.files.len(), 1);
    }

    #[test]
    fn test_source_unit_fingerprint_tracks_contents() {
        let a = SourceUnit::new(PathBuf::from("a.php"), "<?php class A {}".to_string());
        let b = SourceUnit::new(PathBuf::from("b.php"), "<?php class A {}".to_string());
        let c = SourceUnit::new(PathBuf::from("a.php"), "<?php class B {}".to_string());

        assert_eq!(a.fingerprint, b.fingerprint);
        assert_ne!(a.fingerprint, c.fingerprint);
        assert_eq!(a.fingerprint.len(), 64);
    }
}
