//! Build script engine
//!
//! A build script has three interchangeable forms: the text form kept in a
//! project checkout, the JSON build expression exchanged with the build
//! planner, and the AST in [`ast`]. [`BuildScript`] owns the AST plus the
//! script's solve timestamp and exposes the query, mutation and merge
//! operations.

use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};

pub mod ast;
pub mod config;
pub mod emit;
pub mod error;
pub mod expression;
pub mod lexer;
pub mod merge;
pub mod mutation;
pub mod parser;
pub mod project;
pub mod query;
pub mod registry;
pub mod version;

use ast::{AT_TIME_KEY, Assignment, FuncCall, MAIN_KEY, Value};
use config::ScriptConfig;
use emit::TextEmitter;
use error::{Result, ScriptError};
use expression::ExpressionCodec;
use merge::MergeStrategy;
use mutation::Operation;
use query::{PlatformId, Requirement, RequirementKind};

/// Parse an RFC3339 timestamp.
pub fn parse_timestamp(text: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(text)
        .map(|ts| ts.with_timezone(&Utc))
        .map_err(|source| ScriptError::InvalidTimestamp {
            value: text.to_string(),
            source,
        })
}

/// Drop precision below milliseconds.
pub fn truncate_timestamp(ts: DateTime<Utc>) -> DateTime<Utc> {
    ts.trunc_subsecs(3)
}

/// Format a timestamp as RFC3339 with milliseconds, e.g. `2000-01-01T00:00:00.000Z`.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// A parsed build script
///
/// Cloning is a deep copy. `main` assignments are always kept last, which is
/// where the text form writes them.
#[derive(Debug, Clone, PartialEq)]
pub struct BuildScript {
    assignments: Vec<Assignment>,
    at_time: Option<DateTime<Utc>>,
}

impl Default for BuildScript {
    fn default() -> Self {
        Self::new()
    }
}

impl BuildScript {
    /// The minimal script: an empty solve feeding `state_tool_artifacts`.
    pub fn new() -> Self {
        let solve = FuncCall::new(
            "solve",
            vec![
                Value::assignment(AT_TIME_KEY, Value::ident(AT_TIME_KEY)),
                Value::assignment("platforms", Value::List(Vec::new())),
                Value::assignment("requirements", Value::List(Vec::new())),
                Value::assignment("solver_version", Value::Null),
            ],
        );
        let artifacts = FuncCall::new(
            "state_tool_artifacts",
            vec![Value::assignment("src", Value::ident("sources"))],
        );
        Self::from_parts(
            vec![
                Assignment::new("sources", Value::FuncCall(solve)),
                Assignment::new("runtime", Value::FuncCall(artifacts)),
                Assignment::new(MAIN_KEY, Value::ident("runtime")),
            ],
            None,
        )
    }

    /// Build a script from raw assignments.
    pub fn from_parts(assignments: Vec<Assignment>, at_time: Option<DateTime<Utc>>) -> Self {
        let (mut body, main): (Vec<_>, Vec<_>) =
            assignments.into_iter().partition(|a| a.key != MAIN_KEY);
        body.extend(main);
        Self {
            assignments: body,
            at_time: at_time.map(truncate_timestamp),
        }
    }

    /// Parse the text form.
    ///
    /// A top-level `at_time = "<timestamp>"` is lifted out of the assignments.
    /// A non-string `at_time` stays an ordinary assignment.
    pub fn from_text(text: &str) -> Result<Self> {
        let mut assignments = parser::parse_assignments(text)?;

        let mut at_time = None;
        if let Some(i) = assignments
            .iter()
            .position(|a| a.key == AT_TIME_KEY && matches!(a.value, Value::Str(_)))
        {
            let value = assignments[i].value.str_value().unwrap_or_default();
            at_time = Some(parse_timestamp(value)?);
            assignments.remove(i);
        }

        Ok(Self::from_parts(assignments, at_time))
    }

    /// Render the text form with the default configuration.
    pub fn to_text(&self) -> String {
        self.to_text_with(&ScriptConfig::default())
    }

    /// Render the text form.
    pub fn to_text_with(&self, config: &ScriptConfig) -> String {
        TextEmitter::new(config).emit(&self.assignments, self.at_time.as_ref())
    }

    /// Decode a build expression.
    ///
    /// A concrete timestamp in the solve node becomes the script's
    /// `at_time`; an explicit `at_time` argument takes precedence.
    pub fn from_build_expression(data: &[u8], at_time: Option<DateTime<Utc>>) -> Result<Self> {
        Self::from_build_expression_with(&ExpressionCodec::default(), data, at_time)
    }

    /// Decode a build expression with a specific codec.
    pub fn from_build_expression_with(
        codec: &ExpressionCodec,
        data: &[u8],
        at_time: Option<DateTime<Utc>>,
    ) -> Result<Self> {
        let imported = codec.import(data)?;
        Ok(Self::from_parts(imported.assignments, at_time.or(imported.at_time)))
    }

    /// Encode as a build expression with the builtin marshalers.
    pub fn to_build_expression(&self) -> Result<String> {
        self.to_build_expression_with(&ExpressionCodec::default())
    }

    /// Encode as a build expression with a specific codec.
    pub fn to_build_expression_with(&self, codec: &ExpressionCodec) -> Result<String> {
        codec.export(&self.assignments)
    }

    /// Top-level assignments, `main` last.
    pub fn assignments(&self) -> &[Assignment] {
        &self.assignments
    }

    /// Dependency requirements of the solve node.
    pub fn requirements(&self) -> Result<Vec<Requirement>> {
        query::requirements(&self.assignments)
    }

    /// Every requirement entry, including revisions and unknown calls.
    pub fn all_requirements(&self) -> Result<Vec<RequirementKind>> {
        query::all_requirements(&self.assignments)
    }

    /// Platforms of the solve node.
    pub fn platforms(&self) -> Result<Vec<PlatformId>> {
        query::platforms(&self.assignments)
    }

    /// Dependency requirements of the solve node `target` leads to.
    pub fn requirements_for(&self, target: &str) -> Result<Vec<Requirement>> {
        query::requirements_for(&self.assignments, target)
    }

    /// Every requirement entry of the solve node `target` leads to.
    pub fn all_requirements_for(&self, target: &str) -> Result<Vec<RequirementKind>> {
        query::all_requirements_for(&self.assignments, target)
    }

    /// Platforms of the solve node `target` leads to.
    pub fn platforms_for(&self, target: &str) -> Result<Vec<PlatformId>> {
        query::platforms_for(&self.assignments, target)
    }

    /// Add, remove or update a requirement.
    pub fn update_requirement(&mut self, operation: Operation, requirement: &Requirement) -> Result<()> {
        mutation::update_requirement(&mut self.assignments, operation, requirement)
    }

    /// Add or remove a platform.
    pub fn update_platform(&mut self, operation: Operation, platform: &PlatformId) -> Result<()> {
        mutation::update_platform(&mut self.assignments, operation, platform)
    }

    /// Merge `other` into this script. See [`merge::merge`].
    pub fn merge(&mut self, other: &BuildScript, strategy: &MergeStrategy) -> Result<()> {
        merge::merge(self, other, strategy)
    }

    /// Solve timestamp, if the script pins one.
    pub fn at_time(&self) -> Option<DateTime<Utc>> {
        self.at_time
    }

    /// Pin the solve timestamp, truncated to milliseconds.
    pub fn set_at_time(&mut self, at_time: DateTime<Utc>) {
        self.at_time = Some(truncate_timestamp(at_time));
    }

    /// Compare timestamps and build expressions.
    pub fn equals(&self, other: &BuildScript) -> Result<bool> {
        if self.at_time != other.at_time {
            return Ok(false);
        }
        Ok(self.to_build_expression()? == other.to_build_expression()?)
    }
}
