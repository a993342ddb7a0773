//! Solve node lookup and read-only views over requirements and platforms.
//!
//! Every query and mutation goes through [`locate_solve`], which walks the
//! script's scope frames (the top level plus any nested `let` objects) and
//! returns a [`SolvePath`] to the single solve call it should act on.

use std::collections::{HashSet, VecDeque};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::ast::{
    Assignment, FuncCall, LET_KEY, MAIN_KEY, PLATFORMS_KEY, REQ_FUNC, REQUIREMENTS_KEY,
    REVISION_FUNC, Value,
};
use super::config::ScriptConfig;
use super::emit::TextEmitter;
use super::error::{Result, ScriptError};
use super::expression::{NAME_KEY, NAMESPACE_KEY, REVISION_ID_KEY, REVISION_KEY, VERSION_KEY};
use super::version::{VersionConstraint, flatten_constraint_tree};

const SRC_KEY: &str = "src";
const MERGE_FUNC: &str = "merge";

/// Opaque platform identifier.
///
/// Platform ids are UUIDs in practice, but the wire format does not enforce
/// that, so any string is accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PlatformId(String);

impl PlatformId {
    /// Wrap an identifier.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The identifier text.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The identifier as a UUID, if it is one.
    pub fn as_uuid(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.0).ok()
    }
}

impl From<Uuid> for PlatformId {
    fn from(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

impl From<&str> for PlatformId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for PlatformId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for PlatformId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A dependency requirement as seen by callers.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Requirement {
    /// Package name
    pub name: String,
    /// Package namespace, e.g. `language/python`
    pub namespace: String,
    /// Conjunction of version constraints
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version_requirement: Option<Vec<VersionConstraint>>,
    /// Pinned revision
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision: Option<i64>,
}

impl Requirement {
    /// Requirement on any version of `name`.
    pub fn new(name: impl Into<String>, namespace: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: namespace.into(),
            ..Self::default()
        }
    }

    /// Set the version constraints.
    pub fn with_version(mut self, constraints: Vec<VersionConstraint>) -> Self {
        self.version_requirement = Some(constraints);
        self
    }

    /// Set the revision.
    pub fn with_revision(mut self, revision: i64) -> Self {
        self.revision = Some(revision);
        self
    }
}

/// Any entry of the requirements list.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RequirementKind {
    /// `Req(...)`
    Dependency(Requirement),
    /// `Revision(name = .., revision_id = ..)`
    Revision {
        /// Requirement name
        name: String,
        /// Revision identifier
        revision_id: String,
    },
    /// Any other call, with its arguments rendered inline
    Unknown {
        /// Function name
        name: String,
        /// Rendered arguments
        value: String,
    },
}

/// Location of the solve call: indices through nested scope objects, the last
/// one naming the assignment that holds the call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolvePath(Vec<usize>);

impl SolvePath {
    /// Index path from the top-level scope.
    pub fn indices(&self) -> &[usize] {
        &self.0
    }
}

struct Frame<'a> {
    prefix: Vec<usize>,
    assignments: &'a [Assignment],
}

/// Scope frames in breadth-first order: the given scope, then nested `let`s.
fn scope_frames(assignments: &[Assignment]) -> Vec<Frame<'_>> {
    let mut frames = Vec::new();
    let mut queue = VecDeque::from([Frame {
        prefix: Vec::new(),
        assignments,
    }]);
    while let Some(frame) = queue.pop_front() {
        for (i, a) in frame.assignments.iter().enumerate() {
            if let (LET_KEY, Value::Object(fields)) = (a.key.as_str(), &a.value) {
                let mut prefix = frame.prefix.clone();
                prefix.push(i);
                queue.push_back(Frame {
                    prefix,
                    assignments: fields,
                });
            }
        }
        frames.push(frame);
    }
    frames
}

fn find_assignment<P>(assignments: &[Assignment], pred: P) -> Option<SolvePath>
where
    P: Fn(&Assignment) -> bool,
{
    scope_frames(assignments).into_iter().find_map(|frame| {
        frame.assignments.iter().position(&pred).map(|i| {
            let mut path = frame.prefix;
            path.push(i);
            SolvePath(path)
        })
    })
}

fn call_at<'a>(assignments: &'a [Assignment], path: &SolvePath) -> Option<&'a FuncCall> {
    let (last, scopes) = path.0.split_last()?;
    let mut scope = assignments;
    for &i in scopes {
        match &scope.get(i)?.value {
            Value::Object(fields) => scope = fields,
            _ => return None,
        }
    }
    scope.get(*last)?.value.as_func_call()
}

fn call_at_mut<'a>(assignments: &'a mut [Assignment], path: &SolvePath) -> Option<&'a mut FuncCall> {
    let (last, scopes) = path.0.split_last()?;
    let mut scope = assignments;
    for &i in scopes {
        let current = scope;
        scope = match current.get_mut(i) {
            Some(Assignment {
                value: Value::Object(fields),
                ..
            }) => fields.as_mut_slice(),
            _ => return None,
        };
    }
    match scope.get_mut(*last) {
        Some(Assignment {
            value: Value::FuncCall(call),
            ..
        }) => Some(call),
        _ => None,
    }
}

fn lookup_call(assignments: &[Assignment], name: &str) -> Option<SolvePath> {
    find_assignment(assignments, |a| {
        a.key == name && matches!(a.value, Value::FuncCall(_))
    })
}

/// Follow a target through `src = ..` references and `merge(..)` branches
/// until a solve call is reached.
fn resolve_target(
    assignments: &[Assignment],
    name: &str,
    visited: &mut HashSet<String>,
) -> Option<SolvePath> {
    if !visited.insert(name.to_string()) {
        return None;
    }
    let path = lookup_call(assignments, name)?;
    let call = call_at(assignments, &path)?;
    if call.is_solve() {
        return Some(path);
    }

    if call.name == MERGE_FUNC {
        // right-hand branches take precedence
        return call.arguments.iter().rev().find_map(|arg| {
            let target = match arg {
                Value::Assignment(a) => a.value.as_ident(),
                other => other.as_ident(),
            }?;
            resolve_target(assignments, target, visited)
        });
    }

    let src = call.argument(SRC_KEY)?.as_ident()?;
    resolve_target(assignments, src, visited)
}

/// Locate the solve call.
///
/// The `main` target is followed first. When that does not lead to a solve
/// call, the first `solve`/`solve_legacy` assignment found while walking the
/// scope frames is used.
pub fn locate_solve(assignments: &[Assignment]) -> Result<SolvePath> {
    let target = assignments
        .iter()
        .find(|a| a.key == MAIN_KEY)
        .and_then(|a| a.value.as_ident());
    if let Some(target) = target {
        if let Some(path) = resolve_target(assignments, target, &mut HashSet::new()) {
            return Ok(path);
        }
    }

    find_assignment(assignments, |a| {
        a.value.as_func_call().is_some_and(FuncCall::is_solve)
    })
    .ok_or_else(|| ScriptError::NodeNotFound("solve".to_string()))
}

/// Locate the solve call that `target` leads to.
///
/// Unlike [`locate_solve`] there is no fallback: a target that does not reach
/// a solve call is `NodeNotFound`.
pub fn locate_solve_for(assignments: &[Assignment], target: &str) -> Result<SolvePath> {
    resolve_target(assignments, target, &mut HashSet::new())
        .ok_or_else(|| ScriptError::NodeNotFound(format!("solve node for '{}'", target)))
}

/// The solve call.
pub fn solve_node(assignments: &[Assignment]) -> Result<&FuncCall> {
    solve_at(assignments, &locate_solve(assignments)?)
}

/// The solve call, mutably.
pub fn solve_node_mut(assignments: &mut [Assignment]) -> Result<&mut FuncCall> {
    let path = locate_solve(assignments)?;
    call_at_mut(assignments, &path).ok_or_else(|| ScriptError::NodeNotFound("solve".to_string()))
}

pub(crate) fn list_argument<'a>(call: &'a FuncCall, key: &str) -> Result<&'a [Value]> {
    call.argument(key)
        .and_then(Value::as_list)
        .ok_or_else(|| ScriptError::NodeNotFound(key.to_string()))
}

pub(crate) fn list_argument_mut<'a>(call: &'a mut FuncCall, key: &str) -> Result<&'a mut Vec<Value>> {
    call.argument_mut(key)
        .and_then(Value::as_list_mut)
        .ok_or_else(|| ScriptError::NodeNotFound(key.to_string()))
}

/// Dependency requirements (`Req` calls) of the solve node, in order.
pub fn requirements(assignments: &[Assignment]) -> Result<Vec<Requirement>> {
    solve_requirements(solve_node(assignments)?)
}

/// Dependency requirements of the solve call `target` leads to.
pub fn requirements_for(assignments: &[Assignment], target: &str) -> Result<Vec<Requirement>> {
    let path = locate_solve_for(assignments, target)?;
    solve_requirements(solve_at(assignments, &path)?)
}

fn solve_at<'a>(assignments: &'a [Assignment], path: &SolvePath) -> Result<&'a FuncCall> {
    call_at(assignments, path).ok_or_else(|| ScriptError::NodeNotFound("solve".to_string()))
}

fn solve_requirements(solve: &FuncCall) -> Result<Vec<Requirement>> {
    list_argument(solve, REQUIREMENTS_KEY)?
        .iter()
        .filter_map(Value::as_func_call)
        .filter(|call| call.name == REQ_FUNC)
        .map(parse_requirement)
        .collect()
}

/// Every entry of the requirements list, typed.
pub fn all_requirements(assignments: &[Assignment]) -> Result<Vec<RequirementKind>> {
    solve_all_requirements(solve_node(assignments)?)
}

/// Every requirements entry of the solve call `target` leads to.
pub fn all_requirements_for(
    assignments: &[Assignment],
    target: &str,
) -> Result<Vec<RequirementKind>> {
    let path = locate_solve_for(assignments, target)?;
    solve_all_requirements(solve_at(assignments, &path)?)
}

fn solve_all_requirements(solve: &FuncCall) -> Result<Vec<RequirementKind>> {
    let config = ScriptConfig::default();
    let emitter = TextEmitter::new(&config);

    let mut out = Vec::new();
    for call in list_argument(solve, REQUIREMENTS_KEY)?
        .iter()
        .filter_map(Value::as_func_call)
    {
        let kind = match call.name.as_str() {
            REQ_FUNC => RequirementKind::Dependency(parse_requirement(call)?),
            REVISION_FUNC => RequirementKind::Revision {
                name: string_argument(call, NAME_KEY).unwrap_or_default(),
                revision_id: match call.argument(REVISION_ID_KEY) {
                    Some(Value::Number(num)) => num.to_string(),
                    Some(other) => other.str_value().unwrap_or_default().to_string(),
                    None => String::new(),
                },
            },
            _ => RequirementKind::Unknown {
                name: call.name.clone(),
                value: call
                    .arguments
                    .iter()
                    .map(|arg| emitter.value(arg))
                    .collect::<Vec<_>>()
                    .join(", "),
            },
        };
        out.push(kind);
    }
    Ok(out)
}

fn string_argument(call: &FuncCall, key: &str) -> Option<String> {
    call.argument(key)
        .and_then(Value::str_value)
        .map(str::to_string)
}

fn parse_requirement(call: &FuncCall) -> Result<Requirement> {
    let field = |key: &str| {
        string_argument(call, key)
            .filter(|text| !text.is_empty())
            .ok_or_else(|| {
                ScriptError::InvalidRequirement(format!(
                    "'{}' call needs a non-empty string '{}'",
                    call.name, key
                ))
            })
    };
    let name = field(NAME_KEY)?;
    let namespace = field(NAMESPACE_KEY)?;
    let version_requirement = call
        .argument(VERSION_KEY)
        .map(flatten_constraint_tree)
        .transpose()?;
    let revision = match call.argument(REVISION_KEY) {
        Some(Value::Number(num)) if num.fract() == 0.0 && num.abs() <= i64::MAX as f64 => {
            Some(*num as i64)
        }
        Some(Value::Number(num)) => {
            return Err(ScriptError::InvalidRequirement(format!(
                "revision of '{}' must be an integer, found {}",
                name, num
            )));
        }
        _ => None,
    };
    Ok(Requirement {
        name,
        namespace,
        version_requirement,
        revision,
    })
}

/// Platform identifiers of the solve node, in order.
pub fn platforms(assignments: &[Assignment]) -> Result<Vec<PlatformId>> {
    solve_platforms(solve_node(assignments)?)
}

/// Platform identifiers of the solve call `target` leads to.
pub fn platforms_for(assignments: &[Assignment], target: &str) -> Result<Vec<PlatformId>> {
    let path = locate_solve_for(assignments, target)?;
    solve_platforms(solve_at(assignments, &path)?)
}

fn solve_platforms(solve: &FuncCall) -> Result<Vec<PlatformId>> {
    Ok(list_argument(solve, PLATFORMS_KEY)?
        .iter()
        .filter_map(Value::str_value)
        .map(PlatformId::from)
        .collect())
}
