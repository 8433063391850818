//! Incremental cache of per-unit extraction and parse results.
//!
//! Entries are keyed by unit path and carry the SHA-256 fingerprint of the
//! contents they were computed from. A unit whose fingerprint still matches is
//! not extracted or parsed again; its cached trees go straight to the builder.

use crate::annotation::AnnotationNode;
use crate::error::{Diagnostic, Position, Result};
use crate::extractor::Symbol;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Hex-encoded SHA-256 of `bytes`.
pub fn fingerprint(bytes: &[u8]) -> String {
    format!("{:x}", Sha256::digest(bytes))
}

/// The annotation trees parsed out of one raw block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParsedBlock {
    pub symbol: Symbol,
    pub start: Position,
    pub nodes: Vec<AnnotationNode>,
}

/// Everything the extract and parse phases produced for one unit.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UnitAnalysis {
    pub blocks: Vec<ParsedBlock>,
    /// Extraction and parse diagnostics, replayed on cache hits
    pub diagnostics: Vec<Diagnostic>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct CacheEntry {
    fingerprint: String,
    analysis: UnitAnalysis,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct IncrementalCache {
    /// Fingerprint of everything besides unit contents that affects parsing
    context: String,
    entries: BTreeMap<PathBuf, CacheEntry>,
}

impl IncrementalCache {
    pub fn new(context: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            entries: BTreeMap::new(),
        }
    }

    /// Context fingerprint over the constant table and the crate version.
    pub fn context_fingerprint(constants: &BTreeMap<String, serde_json::Value>) -> String {
        let mut hasher = Sha256::new();
        hasher.update(env!("CARGO_PKG_VERSION").as_bytes());
        hasher.update([0u8]);
        for (name, value) in constants {
            hasher.update(name.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.to_string().as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// Loads a persisted cache.
    ///
    /// A missing or unreadable file, or one written under another context,
    /// yields an empty cache.
    pub fn load(path: &Path, context: &str) -> Self {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                debug!("No cache loaded from {}: {}", path.display(), e);
                return Self::new(context);
            }
        };
        match serde_json::from_str::<IncrementalCache>(&content) {
            Ok(cache) if cache.context == context => {
                info!("Loaded cache with {} entries from {}", cache.len(), path.display());
                cache
            }
            Ok(_) => {
                info!("Cache context changed, discarding {}", path.display());
                Self::new(context)
            }
            Err(e) => {
                warn!("Ignoring corrupt cache {}: {}", path.display(), e);
                Self::new(context)
            }
        }
    }

    /// Persists the cache as JSON through a temporary sibling file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        fs::create_dir_all(dir)?;
        let json = serde_json::to_vec(self)?;

        let mut temp = tempfile::NamedTempFile::new_in(dir)?;
        temp.write_all(&json)?;
        temp.persist(path).map_err(|e| e.error)?;
        debug!("Saved cache with {} entries to {}", self.len(), path.display());
        Ok(())
    }

    /// Cached analysis for a unit, if its fingerprint is unchanged.
    pub fn lookup(&self, path: &Path, fingerprint: &str) -> Option<&UnitAnalysis> {
        self.entries
            .get(path)
            .filter(|entry| entry.fingerprint == fingerprint)
            .map(|entry| &entry.analysis)
    }

    pub fn insert(&mut self, path: PathBuf, fingerprint: String, analysis: UnitAnalysis) {
        self.entries.insert(path, CacheEntry { fingerprint, analysis });
    }

    /// Evicts entries for units that are no longer located.
    pub fn retain_units(&mut self, present: &BTreeSet<PathBuf>) -> usize {
        let before = self.entries.len();
        self.entries.retain(|path, _| present.contains(path));
        let evicted = before - self.entries.len();
        if evicted > 0 {
            debug!("Evicted {} stale cache entries", evicted);
        }
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn analysis() -> UnitAnalysis {
        UnitAnalysis {
            blocks: vec![ParsedBlock {
                symbol: Symbol::file(),
                start: Position::new(1, 1),
                nodes: vec![AnnotationNode::new("Info", Position::new(2, 1))],
            }],
            diagnostics: Vec::new(),
        }
    }

    #[test]
    fn test_fingerprint_is_sha256_hex() {
        assert_eq!(
            fingerprint(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        assert_ne!(fingerprint(b"a"), fingerprint(b"b"));
    }

    #[test]
    fn test_lookup_requires_matching_fingerprint() {
        let mut cache = IncrementalCache::new("ctx");
        cache.insert(PathBuf::from("a.php"), "f1".to_string(), analysis());

        assert!(cache.lookup(Path::new("a.php"), "f1").is_some());
        assert!(cache.lookup(Path::new("a.php"), "f2").is_none());
        assert!(cache.lookup(Path::new("b.php"), "f1").is_none());
    }

    #[test]
    fn test_retain_evicts_missing_units() {
        let mut cache = IncrementalCache::new("ctx");
        cache.insert(PathBuf::from("a.php"), "f".to_string(), analysis());
        cache.insert(PathBuf::from("b.php"), "f".to_string(), analysis());

        let present: BTreeSet<PathBuf> = [PathBuf::from("b.php")].into_iter().collect();
        assert_eq!(cache.retain_units(&present), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.lookup(Path::new("b.php"), "f").is_some());
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cache.json");

        let mut cache = IncrementalCache::new("ctx");
        cache.insert(PathBuf::from("a.php"), "f".to_string(), analysis());
        cache.save(&path).unwrap();

        let loaded = IncrementalCache::load(&path, "ctx");
        assert_eq!(loaded.lookup(Path::new("a.php"), "f"), Some(&analysis()));

        let other_context = IncrementalCache::load(&path, "other");
        assert!(other_context.is_empty());
    }

    #[test]
    fn test_load_tolerates_missing_and_corrupt_files() {
        let dir = TempDir::new().unwrap();
        assert!(IncrementalCache::load(&dir.path().join("none.json"), "ctx").is_empty());

        let corrupt = dir.path().join("corrupt.json");
        fs::write(&corrupt, "{not json").unwrap();
        assert!(IncrementalCache::load(&corrupt, "ctx").is_empty());
    }

    #[test]
    fn test_context_fingerprint_tracks_constants() {
        let mut constants = BTreeMap::new();
        let empty = IncrementalCache::context_fingerprint(&constants);
        constants.insert("API_VERSION".to_string(), serde_json::json!("2"));
        assert_ne!(empty, IncrementalCache::context_fingerprint(&constants));
    }
}
