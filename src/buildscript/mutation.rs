//! Requirement and platform mutation on the solve node.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::ast::{Assignment, PLATFORMS_KEY, REQ_FUNC, REQUIREMENTS_KEY, Value};
use super::error::{Result, ScriptError};
use super::expression::{
    COMPARATOR_KEY, NAME_KEY, NAMESPACE_KEY, REVISION_KEY, VERSION_KEY, VERSION_REQUIREMENTS_KEY,
    requirement_call,
};
use super::query::{PlatformId, Requirement, list_argument_mut, solve_node_mut};

/// Kind of change applied to a requirement or platform.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Operation {
    /// Append
    Added,
    /// Remove the first match
    Removed,
    /// Remove, then append
    Updated,
}

impl Operation {
    /// Lowercase name, e.g. `added`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::Added => "added",
            Operation::Removed => "removed",
            Operation::Updated => "updated",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Operation {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "added" => Ok(Operation::Added),
            "removed" => Ok(Operation::Removed),
            "updated" => Ok(Operation::Updated),
            _ => Err(ScriptError::UnsupportedOperation(format!(
                "unknown operation '{}'",
                s
            ))),
        }
    }
}

/// Apply `operation` to the solve node's requirements.
///
/// `Updated` removes the existing requirement and appends the new one, so the
/// requirement moves to the end of the list.
pub fn update_requirement(
    assignments: &mut [Assignment],
    operation: Operation,
    requirement: &Requirement,
) -> Result<()> {
    debug!(%operation, name = %requirement.name, namespace = %requirement.namespace, "Updating requirement");
    match operation {
        Operation::Added => {
            let call = requirement_call(&requirement_object(requirement))?;
            requirement_items(assignments)?.push(Value::FuncCall(call));
            Ok(())
        }
        Operation::Removed => {
            let items = requirement_items(assignments)?;
            let index = requirement_index(items, requirement)?;
            items.remove(index);
            Ok(())
        }
        Operation::Updated => {
            // the replacement is validated before the list is touched
            let call = requirement_call(&requirement_object(requirement))?;
            let items = requirement_items(assignments)?;
            let index = requirement_index(items, requirement)?;
            items.remove(index);
            items.push(Value::FuncCall(call));
            Ok(())
        }
    }
}

/// Object-form fields for a requirement.
fn requirement_object(requirement: &Requirement) -> Vec<Assignment> {
    let mut fields = vec![
        Assignment::new(NAME_KEY, Value::new_string(requirement.name.clone())),
        Assignment::new(
            NAMESPACE_KEY,
            Value::new_string(requirement.namespace.clone()),
        ),
    ];
    if let Some(revision) = requirement.revision {
        fields.push(Assignment::new(REVISION_KEY, Value::Number(revision as f64)));
    }
    if let Some(constraints) = &requirement.version_requirement {
        let items = constraints
            .iter()
            .map(|c| {
                Value::Object(vec![
                    Assignment::new(COMPARATOR_KEY, Value::new_string(c.comparator.as_str())),
                    Assignment::new(VERSION_KEY, Value::new_string(c.version.clone())),
                ])
            })
            .collect();
        fields.push(Assignment::new(VERSION_REQUIREMENTS_KEY, Value::List(items)));
    }
    fields
}

fn requirement_items(assignments: &mut [Assignment]) -> Result<&mut Vec<Value>> {
    let solve = solve_node_mut(assignments)?;
    list_argument_mut(solve, REQUIREMENTS_KEY)
}

/// Index of the first `Req` whose name matches.
fn requirement_index(items: &[Value], requirement: &Requirement) -> Result<usize> {
    items
        .iter()
        .position(|item| {
            item.as_func_call().is_some_and(|call| {
                call.name == REQ_FUNC
                    && call.argument(NAME_KEY).and_then(Value::str_value)
                        == Some(requirement.name.as_str())
            })
        })
        .ok_or_else(|| ScriptError::RequirementNotFound {
            name: requirement.name.clone(),
        })
}

/// Apply `operation` to the solve node's platforms. `Updated` is unsupported.
pub fn update_platform(
    assignments: &mut [Assignment],
    operation: Operation,
    platform: &PlatformId,
) -> Result<()> {
    debug!(%operation, %platform, "Updating platform");
    let solve = solve_node_mut(assignments)?;
    let items = list_argument_mut(solve, PLATFORMS_KEY)?;
    match operation {
        Operation::Added => {
            items.push(Value::new_string(platform.as_str()));
            Ok(())
        }
        Operation::Removed => {
            let index = items
                .iter()
                .position(|item| item.str_value() == Some(platform.as_str()))
                .ok_or_else(|| ScriptError::PlatformNotFound {
                    id: platform.to_string(),
                })?;
            items.remove(index);
            Ok(())
        }
        Operation::Updated => Err(ScriptError::UnsupportedOperation(format!(
            "cannot {} a platform",
            operation
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buildscript::parser::parse_assignments;
    use crate::buildscript::query::{platforms, requirements};
    use crate::buildscript::version::{Comparator, VersionConstraint};

    fn script() -> Vec<Assignment> {
        parse_assignments(
            r#"runtime = solve(
	platforms = ["p1"],
	requirements = [
		Req(name = "perl", namespace = "language"),
		Req(name = "DateTime", namespace = "language/perl")
	]
)
main = runtime"#,
        )
        .unwrap()
    }

    fn names(assignments: &[Assignment]) -> Vec<String> {
        requirements(assignments)
            .unwrap()
            .into_iter()
            .map(|r| r.name)
            .collect()
    }

    #[test]
    fn operation_parsing() {
        assert_eq!("Added".parse::<Operation>().unwrap(), Operation::Added);
        assert_eq!("removed".parse::<Operation>().unwrap(), Operation::Removed);
        let err = "renamed".parse::<Operation>().unwrap_err();
        assert!(matches!(err, ScriptError::UnsupportedOperation(_)));
    }

    #[test]
    fn add_builds_req_call_with_version() {
        let mut assignments = script();
        let requirement = Requirement::new("JSON", "language/perl").with_version(vec![
            VersionConstraint::new(Comparator::Gte, "4.0"),
            VersionConstraint::new(Comparator::Lt, "5.0"),
        ]);
        update_requirement(&mut assignments, Operation::Added, &requirement).unwrap();

        let reqs = requirements(&assignments).unwrap();
        assert_eq!(reqs.len(), 3);
        assert_eq!(reqs[2], requirement);
    }

    #[test]
    fn update_moves_requirement_to_end() {
        let mut assignments = script();
        let requirement = Requirement::new("perl", "language")
            .with_version(vec![VersionConstraint::new(Comparator::Eq, "5.36.0")]);
        update_requirement(&mut assignments, Operation::Updated, &requirement).unwrap();
        assert_eq!(names(&assignments), vec!["DateTime", "perl"]);
        assert_eq!(requirements(&assignments).unwrap()[1], requirement);
    }

    #[test]
    fn remove_missing_requirement() {
        let mut assignments = script();
        let requirement = Requirement::new("requests", "language/python");
        let err = update_requirement(&mut assignments, Operation::Removed, &requirement)
            .unwrap_err();
        assert!(err.is_requirement_not_found());

        let err = update_requirement(&mut assignments, Operation::Updated, &requirement)
            .unwrap_err();
        assert!(err.is_requirement_not_found());
        assert_eq!(names(&assignments), vec!["perl", "DateTime"]);
    }

    #[test]
    fn invalid_update_keeps_requirements() {
        let mut assignments = script();
        let before = assignments.clone();

        let err = update_requirement(
            &mut assignments,
            Operation::Updated,
            &Requirement::new("perl", ""),
        )
        .unwrap_err();
        assert!(matches!(err, ScriptError::InvalidRequirement(_)));
        assert_eq!(assignments, before);

        let err = update_requirement(&mut assignments, Operation::Added, &Requirement::new("", "x"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::InvalidRequirement(_)));
        assert_eq!(names(&assignments), vec!["perl", "DateTime"]);
    }

    #[test]
    fn platform_mutations() {
        let mut assignments = script();
        let p2 = PlatformId::from("p2");
        update_platform(&mut assignments, Operation::Added, &p2).unwrap();
        update_platform(&mut assignments, Operation::Removed, &PlatformId::from("p1")).unwrap();
        assert_eq!(platforms(&assignments).unwrap(), vec![p2.clone()]);

        let err = update_platform(&mut assignments, Operation::Removed, &PlatformId::from("p1"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::PlatformNotFound { ref id } if id == "p1"));

        let err = update_platform(&mut assignments, Operation::Updated, &p2).unwrap_err();
        assert!(matches!(err, ScriptError::UnsupportedOperation(_)));
    }

    #[test]
    fn mutation_without_solve_node() {
        let mut assignments = parse_assignments("main = f()").unwrap();
        let err = update_platform(&mut assignments, Operation::Added, &PlatformId::from("p"))
            .unwrap_err();
        assert!(matches!(err, ScriptError::NodeNotFound(_)));
    }
}
