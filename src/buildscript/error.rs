//! Error types for the build script engine
//!
//! Every failure the engine can report is a variant of [`ScriptError`]; parse
//! failures carry their own [`ParseError`] with a source position.

use std::fmt;
use std::io;
use thiserror::Error;

/// A 1-based position in build script source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    /// 1-based line number
    pub line: usize,
    /// 1-based column (character offset within the line)
    pub column: usize,
    /// 0-based byte offset from the start of input
    pub offset: usize,
}

impl Position {
    /// Position of the first character of the input.
    pub fn start() -> Self {
        Self {
            line: 1,
            column: 1,
            offset: 0,
        }
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Malformed build script text.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{position}: {message}")]
pub struct ParseError {
    /// Where the problem was found
    pub position: Position,
    /// Human-readable description
    pub message: String,
}

impl ParseError {
    /// Construct a parse error at the given position.
    pub fn new(position: Position, message: impl Into<String>) -> Self {
        Self {
            position,
            message: message.into(),
        }
    }
}

/// Top-level build script error
#[derive(Debug, Error)]
pub enum ScriptError {
    /// Text form could not be parsed
    #[error("Could not parse build script: {0}")]
    Parse(#[from] ParseError),

    /// A timestamp was not RFC3339
    #[error("Invalid timestamp: {value}")]
    InvalidTimestamp {
        /// The offending text
        value: String,
        /// Underlying chrono error
        #[source]
        source: chrono::ParseError,
    },

    /// Removal or update of a requirement that is not present
    #[error("Could not find requirement '{name}'")]
    RequirementNotFound {
        /// Requirement name that was looked up
        name: String,
    },

    /// Removal of a platform that is not present
    #[error("Could not find platform '{id}'")]
    PlatformNotFound {
        /// Platform identifier that was looked up
        id: String,
    },

    /// A structural node (solve node, requirements list, ...) is missing
    #[error("Could not find node: {0}")]
    NodeNotFound(String),

    /// The mutation is not defined for this target
    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(String),

    /// Two scripts cannot be merged automatically
    #[error("Unable to automatically merge build scripts: {0}")]
    MergeConflict(String),

    /// The build expression does not have the expected shape
    #[error("Invalid build expression: {0}")]
    InvalidExpression(String),

    /// A requirement is missing fields or has mistyped fields
    #[error("Invalid requirement: {0}")]
    InvalidRequirement(String),

    /// Version strings such as `x.1`
    #[error("A version number cannot start with a wildcard: {version}")]
    WildcardStart {
        /// The offending version string
        version: String,
    },

    /// A version string could not be translated into constraints
    #[error("Invalid version '{version}': {detail}")]
    InvalidVersion {
        /// The offending version string
        version: String,
        /// What was wrong with it
        detail: String,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

impl ScriptError {
    /// Whether this error reports a missing requirement.
    pub fn is_requirement_not_found(&self) -> bool {
        matches!(self, ScriptError::RequirementNotFound { .. })
    }
}

/// Result type using ScriptError
pub type Result<T> = std::result::Result<T, ScriptError>;
