//! Buildscript – the build script language of a project checkout
//!
//! This crate implements:
//! - A lexer and recursive-descent parser for the text form
//! - A text emitter with configurable inline function calls
//! - A JSON codec for the build expressions exchanged with the build planner
//! - Requirement and platform mutation on the script's solve node
//! - Merging of two scripts that differ only in their requirements
//!
//! The free functions below are the entry points most callers need; the
//! [`buildscript`] module holds the AST and the lower-level pieces.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

use chrono::{DateTime, Utc};

/// Build script AST, codecs, queries and mutation
pub mod buildscript;

// Re-export key types for convenience
pub use buildscript::BuildScript;
pub use buildscript::config::ScriptConfig;
pub use buildscript::error::{ParseError, Position, Result, ScriptError};
pub use buildscript::merge::{MergeStrategy, RequirementChange};
pub use buildscript::mutation::Operation;
pub use buildscript::query::{PlatformId, Requirement, RequirementKind};
pub use buildscript::version::{Comparator, VersionConstraint};

/// Current version of the crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Parse the text form of a build script.
pub fn parse_text(text: &str) -> Result<BuildScript> {
    BuildScript::from_text(text)
}

/// Render a build script in the text form.
pub fn to_text(script: &BuildScript) -> String {
    script.to_text()
}

/// Decode a JSON build expression. An explicit `at_time` overrides any
/// timestamp found in the expression.
pub fn parse_build_expression(data: &[u8], at_time: Option<DateTime<Utc>>) -> Result<BuildScript> {
    BuildScript::from_build_expression(data, at_time)
}

/// Encode a build script as a JSON build expression.
pub fn to_build_expression(script: &BuildScript) -> Result<String> {
    script.to_build_expression()
}

/// Merge `b` into `a`. Fails with [`ScriptError::MergeConflict`] when the
/// scripts differ outside their requirements or the strategy has conflicts.
pub fn merge(a: &mut BuildScript, b: &BuildScript, strategy: &MergeStrategy) -> Result<()> {
    a.merge(b, strategy)
}
