//! Merging two build scripts that differ only in requirements and timestamp.
//!
//! Anything else that differs between the two (platforms, solver version, the
//! shape of the graph) makes the merge a conflict. Requirement changes are not
//! computed here; they arrive in a [`MergeStrategy`] and are replayed onto the
//! local script.

use difference::{Changeset, Difference};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tracing::{debug, info, warn};

use super::BuildScript;
use super::ast::{LET_KEY, REQUIREMENTS_KEY};
use super::error::{Result, ScriptError};
use super::expression::ExpressionCodec;
use super::mutation::Operation;
use super::query::Requirement;
use super::version::VersionConstraint;

const LOCAL_MARKER: &str = "<<<<<<< local";
const SEPARATOR_MARKER: &str = "=======";
const REMOTE_MARKER: &str = ">>>>>>> remote";

/// One requirement-level change to replay during a merge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequirementChange {
    /// What to do
    pub operation: Operation,
    /// Requirement namespace
    pub namespace: String,
    /// Requirement name
    pub requirement: String,
    /// Version constraints for added or updated requirements
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub version_constraints: Vec<VersionConstraint>,
}

impl RequirementChange {
    /// Change without version constraints.
    pub fn new(
        operation: Operation,
        namespace: impl Into<String>,
        requirement: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            namespace: namespace.into(),
            requirement: requirement.into(),
            version_constraints: Vec::new(),
        }
    }

    /// Attach version constraints.
    pub fn with_version_constraints(mut self, constraints: Vec<VersionConstraint>) -> Self {
        self.version_constraints = constraints;
        self
    }

    /// The requirement this change adds, removes or updates.
    pub fn to_requirement(&self) -> Requirement {
        let requirement = Requirement::new(self.requirement.clone(), self.namespace.clone());
        if self.version_constraints.is_empty() {
            requirement
        } else {
            requirement.with_version(self.version_constraints.clone())
        }
    }
}

/// How to reconcile two scripts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeStrategy {
    /// Changes applied to the local script, in order
    #[serde(default)]
    pub overwrite_changes: Vec<RequirementChange>,
    /// Unresolved conflicting changes; any entry blocks the merge
    #[serde(default)]
    pub conflicts: Vec<RequirementChange>,
}

/// Build expression JSON with the first `requirements` key under `let` removed.
fn comparable_json(script: &BuildScript) -> Result<JsonValue> {
    let data = script.to_build_expression_with(&ExpressionCodec::default())?;
    let mut json: JsonValue = serde_json::from_str(&data)?;
    let scope = json
        .get_mut(LET_KEY)
        .ok_or_else(|| ScriptError::InvalidExpression(format!("no '{}' key", LET_KEY)))?;
    delete_requirements(scope);
    Ok(json)
}

fn delete_requirements(value: &mut JsonValue) -> bool {
    let Some(object) = value.as_object_mut() else {
        return false;
    };
    if object.remove(REQUIREMENTS_KEY).is_some() {
        return true;
    }
    object.values_mut().any(delete_requirements)
}

/// Whether the two scripts differ in nothing but requirements.
pub fn is_auto_merge_possible(a: &BuildScript, b: &BuildScript) -> bool {
    match (comparable_json(a), comparable_json(b)) {
        (Ok(json_a), Ok(json_b)) => {
            let possible = json_a == json_b;
            debug!(possible, "Checked build scripts for auto-merge");
            possible
        }
        (Err(err), _) | (_, Err(err)) => {
            warn!(error = %err, "Unable to compare build scripts");
            false
        }
    }
}

/// Merge `b` into `a` using `strategy`.
///
/// On error `a` may already hold some of the changes; merge a clone when that
/// matters.
pub fn merge(a: &mut BuildScript, b: &BuildScript, strategy: &MergeStrategy) -> Result<()> {
    if !is_auto_merge_possible(a, b) {
        return Err(ScriptError::MergeConflict(
            "build scripts differ outside of their requirements".to_string(),
        ));
    }
    if !strategy.conflicts.is_empty() {
        return Err(ScriptError::MergeConflict(format!(
            "{} conflicting requirement change(s)",
            strategy.conflicts.len()
        )));
    }

    for change in &strategy.overwrite_changes {
        a.update_requirement(change.operation, &change.to_requirement())?;
    }

    let at_time = match (a.at_time(), b.at_time()) {
        (Some(ta), Some(tb)) => Some(ta.max(tb)),
        (ta, tb) => ta.or(tb),
    };
    if let Some(ts) = at_time {
        a.set_at_time(ts);
    }
    info!(
        changes = strategy.overwrite_changes.len(),
        at_time = ?a.at_time(),
        "Merged build scripts"
    );
    Ok(())
}

/// Line diff of the two text forms with conflict markers around each hunk.
pub fn conflict_diff(local: &BuildScript, remote: &BuildScript) -> String {
    let changeset = Changeset::new(&local.to_text(), &remote.to_text(), "\n");

    let mut lines: Vec<String> = Vec::new();
    let mut ours: Vec<&str> = Vec::new();
    let mut theirs: Vec<&str> = Vec::new();
    for diff in &changeset.diffs {
        match diff {
            Difference::Same(text) => {
                flush_hunk(&mut lines, &mut ours, &mut theirs);
                lines.push(text.clone());
            }
            Difference::Rem(text) => ours.push(text),
            Difference::Add(text) => theirs.push(text),
        }
    }
    flush_hunk(&mut lines, &mut ours, &mut theirs);
    lines.join("\n")
}

fn flush_hunk(lines: &mut Vec<String>, ours: &mut Vec<&str>, theirs: &mut Vec<&str>) {
    if ours.is_empty() && theirs.is_empty() {
        return;
    }
    lines.push(LOCAL_MARKER.to_string());
    lines.extend(ours.drain(..).map(str::to_string));
    lines.push(SEPARATOR_MARKER.to_string());
    lines.extend(theirs.drain(..).map(str::to_string));
    lines.push(REMOTE_MARKER.to_string());
}
