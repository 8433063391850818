//! Compiler configuration.
//!
//! A [`CompilerConfig`] can be loaded from a YAML or JSON file and is then
//! overridden by command-line flags (see [`crate::cli`]).

use anyhow::{Context, Result};
use log::debug;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Everything a compilation run needs to know about its inputs.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompilerConfig {
    /// Directories scanned for annotated source units
    pub roots: Vec<PathBuf>,
    /// Glob patterns a root-relative path must match (empty = everything)
    pub include: Vec<String>,
    /// Glob patterns that exclude a root-relative path
    pub exclude: Vec<String>,
    /// Values substituted for bare identifiers inside annotations
    pub constants: BTreeMap<String, serde_json::Value>,
    /// Externally supplied document metadata
    pub metadata: MetadataOverrides,
    /// Where the incremental cache is persisted between runs
    pub cache_path: Option<PathBuf>,
    /// Generate media type examples from schemas when none are declared
    pub synthesize_examples: bool,
    /// Worker threads for extraction and parsing (default: one per core)
    pub threads: Option<usize>,
}

/// Document metadata that takes precedence over annotated values.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetadataOverrides {
    pub title: Option<String>,
    pub version: Option<String>,
    pub description: Option<String>,
    pub server_url: Option<String>,
}

impl CompilerConfig {
    /// Creates a configuration scanning the given roots with defaults otherwise.
    pub fn with_roots(roots: Vec<PathBuf>) -> Self {
        Self {
            roots,
            ..Self::default()
        }
    }

    /// Loads a configuration file. JSON files are accepted as YAML.
    ///
    /// Relative `roots` and `cache_path` are taken relative to the directory
    /// holding the file.
    pub fn load(path: &Path) -> Result<Self> {
        debug!("Loading configuration from {}", path.display());
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let mut config: CompilerConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        for root in &mut config.roots {
            if root.is_relative() {
                *root = base.join(&*root);
            }
        }
        if let Some(cache_path) = config.cache_path.as_mut().filter(|p| p.is_relative()) {
            *cache_path = base.join(&*cache_path);
        }
        Ok(config)
    }

    /// Adds a constant from a `NAME=VALUE` definition.
    ///
    /// The value is read as JSON when possible (`42`, `true`, `"quoted"`),
    /// otherwise it is taken as a plain string.
    pub fn define(&mut self, definition: &str) -> Result<()> {
        let (name, raw) = definition
            .split_once('=')
            .with_context(|| format!("Constant definition must be NAME=VALUE: {}", definition))?;
        let name = name.trim();
        if name.is_empty() {
            anyhow::bail!("Constant definition has an empty name: {}", definition);
        }
        let value = serde_json::from_str(raw.trim())
            .unwrap_or_else(|_| serde_json::Value::String(raw.to_string()));
        self.constants.insert(name.to_string(), value);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_load_yaml_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("openapi.yaml");
        fs::write(
            &path,
            r#"
roots: [app/Http, app/Models]
exclude: ["**/tests/**"]
constants:
  API_HOST: "https://api.example.com"
  PAGE_SIZE: 25
metadata:
  title: Projects API
synthesize_examples: true
"#,
        )
        .unwrap();

        let config = CompilerConfig::load(&path).unwrap();
        assert_eq!(
            config.roots,
            vec![temp_dir.path().join("app/Http"), temp_dir.path().join("app/Models")]
        );
        assert_eq!(config.exclude, vec!["**/tests/**".to_string()]);
        assert_eq!(config.constants["PAGE_SIZE"], serde_json::json!(25));
        assert_eq!(config.metadata.title.as_deref(), Some("Projects API"));
        assert!(config.metadata.version.is_none());
        assert!(config.synthesize_examples);
        assert!(config.include.is_empty());
    }

    #[test]
    fn test_load_json_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("openapi.json");
        fs::write(&path, r#"{"roots": ["src"], "metadata": {"version": "2.1.0"}}"#).unwrap();

        let config = CompilerConfig::load(&path).unwrap();
        assert_eq!(config.roots, vec![temp_dir.path().join("src")]);
        assert_eq!(config.metadata.version.as_deref(), Some("2.1.0"));
    }

    #[test]
    fn test_relative_paths_follow_config_location() {
        let temp_dir = TempDir::new().unwrap();
        let nested = temp_dir.path().join("config");
        fs::create_dir_all(&nested).unwrap();
        let path = nested.join("openapi.yaml");
        fs::write(&path, "roots: [../app, /srv/shared]\ncache_path: .cache/openapi.json\n").unwrap();

        let config = CompilerConfig::load(&path).unwrap();
        assert_eq!(
            config.roots,
            vec![nested.join("../app"), PathBuf::from("/srv/shared")]
        );
        assert_eq!(config.cache_path, Some(nested.join(".cache/openapi.json")));
    }

    #[test]
    fn test_define_constants() {
        let mut config = CompilerConfig::default();
        config.define("LIMIT=50").unwrap();
        config.define("HOST=localhost:8000").unwrap();
        config.define("STRICT=true").unwrap();

        assert_eq!(config.constants["LIMIT"], serde_json::json!(50));
        assert_eq!(config.constants["HOST"], serde_json::json!("localhost:8000"));
        assert_eq!(config.constants["STRICT"], serde_json::json!(true));
        assert!(config.define("missing_equals").is_err());
        assert!(config.define("=1").is_err());
    }
}
