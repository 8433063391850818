use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Result type alias for the application
pub type Result<T> = std::result::Result<T, Error>;

/// Hard failures that stop a compilation run
#[derive(Debug)]
pub enum Error {
    IoError(std::io::Error),
    /// No configured source root could be resolved
    Configuration(String),
    SerializationError(String),
    /// The run was superseded before it finished
    Cancelled,
    /// Fatal diagnostics were reported, so no document was produced
    EmissionRefused { fatal: usize },
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Error::IoError(e) => write!(f, "I/O error: {}", e),
            Error::Configuration(msg) => write!(f, "configuration error: {}", msg),
            Error::SerializationError(msg) => write!(f, "serialization error: {}", msg),
            Error::Cancelled => write!(f, "compilation cancelled"),
            Error::EmissionRefused { fatal } => {
                write!(f, "document not emitted: {} fatal diagnostic(s)", fatal)
            }
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::IoError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::IoError(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SerializationError(format!("JSON: {}", err))
    }
}

impl From<serde_yaml::Error> for Error {
    fn from(err: serde_yaml::Error) -> Self {
        Error::SerializationError(format!("YAML: {}", err))
    }
}

/// Pipeline phase that produced a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Phase {
    Configuration,
    Extraction,
    Parse,
    Build,
    Resolution,
    Validation,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            Phase::Configuration => "configuration",
            Phase::Extraction => "extraction",
            Phase::Parse => "parse",
            Phase::Build => "build",
            Phase::Resolution => "resolution",
            Phase::Validation => "validation",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Severity::Warning => f.write_str("warning"),
            Severity::Error => f.write_str("error"),
        }
    }
}

/// A line/column position inside a source unit. Both are 1-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

/// A position qualified with the source unit it belongs to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceLocation {
    pub path: PathBuf,
    pub position: Position,
}

impl SourceLocation {
    pub fn new(path: impl Into<PathBuf>, position: Position) -> Self {
        Self {
            path: path.into(),
            position,
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}",
            self.path.display(),
            self.position.line,
            self.position.column
        )
    }
}

/// A non-fatal issue or a fatal violation reported by one of the phases.
///
/// Diagnostics are accumulated rather than returned early so a single run
/// surfaces as many problems as possible.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    pub phase: Phase,
    pub severity: Severity,
    /// Validation rule name, when the diagnostic comes from a named rule
    pub rule: Option<String>,
    /// Dotted path of the offending document entity (e.g. `paths./users.get`)
    pub entity: Option<String>,
    pub message: String,
    pub location: Option<SourceLocation>,
}

impl Diagnostic {
    pub fn error(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            phase,
            severity: Severity::Error,
            rule: None,
            entity: None,
            message: message.into(),
            location: None,
        }
    }

    pub fn warning(phase: Phase, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(phase, message)
        }
    }

    pub fn at(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn at_opt(mut self, location: Option<SourceLocation>) -> Self {
        self.location = location;
        self
    }

    pub fn for_entity(mut self, entity: impl Into<String>) -> Self {
        self.entity = Some(entity.into());
        self
    }

    pub fn with_rule(mut self, rule: &str) -> Self {
        self.rule = Some(rule.to_string());
        self
    }

    /// Whether this diagnostic blocks document emission.
    ///
    /// Extraction and parse errors only lose the affected unit or tag, so they
    /// never block emission on their own.
    pub fn is_fatal(&self) -> bool {
        self.severity == Severity::Error
            && matches!(
                self.phase,
                Phase::Configuration | Phase::Build | Phase::Resolution | Phase::Validation
            )
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{} {}]", self.phase, self.severity)?;
        if let Some(rule) = &self.rule {
            write!(f, " {}:", rule)?;
        }
        if let Some(entity) = &self.entity {
            write!(f, " {}:", entity)?;
        }
        write!(f, " {}", self.message)?;
        if let Some(location) = &self.location {
            write!(f, " (at {})", location)?;
        }
        Ok(())
    }
}
