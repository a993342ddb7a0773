//! Version comparators, the `And(...)` constraint tree, and version string
//! translation.
//!
//! A list of [`VersionConstraint`]s is a conjunction. In function-call form it
//! is encoded as a right-leaning tree:
//!
//! ```text
//! [Gt 1.0, Ne 2.0, Lt 3.0]
//!   => And(left = Gt(value = "1.0"), right = And(left = Ne(value = "2.0"), right = Lt(value = "3.0")))
//! ```
//!
//! A single constraint is just the comparator call.

use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use super::ast::{AND_FUNC, FuncCall, Value};
use super::error::{Result, ScriptError};

/// Argument name holding the version inside a comparator call.
pub const COMPARATOR_VALUE_KEY: &str = "value";
const AND_LEFT_KEY: &str = "left";
const AND_RIGHT_KEY: &str = "right";

static EXACT_VERSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\d+(\.\d+)*$").unwrap());

static COMPARATOR_EXPR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*(==|!=|>=|<=|>|<|=)?\s*([0-9A-Za-z][0-9A-Za-z.+_\-]*)\s*$").unwrap()
});

/// Version comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Comparator {
    /// `==`
    Eq,
    /// `!=`
    Ne,
    /// `>`
    Gt,
    /// `>=`
    Gte,
    /// `<`
    Lt,
    /// `<=`
    Lte,
}

impl Comparator {
    /// Every comparator, in declaration order.
    pub const ALL: [Comparator; 6] = [
        Comparator::Eq,
        Comparator::Ne,
        Comparator::Gt,
        Comparator::Gte,
        Comparator::Lt,
        Comparator::Lte,
    ];

    /// Wire spelling, e.g. `gte`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Comparator::Eq => "eq",
            Comparator::Ne => "ne",
            Comparator::Gt => "gt",
            Comparator::Gte => "gte",
            Comparator::Lt => "lt",
            Comparator::Lte => "lte",
        }
    }

    /// Function name used in the text form, e.g. `Gte`.
    pub fn func_name(&self) -> &'static str {
        match self {
            Comparator::Eq => "Eq",
            Comparator::Ne => "Ne",
            Comparator::Gt => "Gt",
            Comparator::Gte => "Gte",
            Comparator::Lt => "Lt",
            Comparator::Lte => "Lte",
        }
    }

    /// Comparator for a function name such as `Lt`.
    pub fn from_func_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|c| c.func_name() == name)
    }

    fn from_operator(op: &str) -> Option<Self> {
        match op {
            "" | "=" | "==" => Some(Comparator::Eq),
            "!=" => Some(Comparator::Ne),
            ">" => Some(Comparator::Gt),
            ">=" => Some(Comparator::Gte),
            "<" => Some(Comparator::Lt),
            "<=" => Some(Comparator::Lte),
            _ => None,
        }
    }
}

impl fmt::Display for Comparator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Comparator {
    type Err = ScriptError;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str() == lower)
            .ok_or_else(|| ScriptError::InvalidRequirement(format!("unknown comparator '{}'", s)))
    }
}

/// One `{comparator, version}` entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VersionConstraint {
    /// Comparison operator.
    pub comparator: Comparator,
    /// Version the operator compares against.
    pub version: String,
}

impl VersionConstraint {
    /// Construct a constraint.
    pub fn new(comparator: Comparator, version: impl Into<String>) -> Self {
        Self {
            comparator,
            version: version.into(),
        }
    }

    /// `Eq(value = "<version>")` style call for this constraint.
    pub fn to_func_call(&self) -> FuncCall {
        FuncCall::new(
            self.comparator.func_name(),
            vec![Value::assignment(
                COMPARATOR_VALUE_KEY,
                Value::new_string(self.version.clone()),
            )],
        )
    }
}

impl fmt::Display for VersionConstraint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.comparator, self.version)
    }
}

/// Encode constraints as a right-leaning `And` tree. `None` when empty.
pub fn build_constraint_tree(constraints: &[VersionConstraint]) -> Option<Value> {
    let mut rev = constraints.iter().rev();
    let mut tree = Value::FuncCall(rev.next()?.to_func_call());
    for constraint in rev {
        tree = Value::FuncCall(FuncCall::new(
            AND_FUNC,
            vec![
                Value::assignment(AND_LEFT_KEY, Value::FuncCall(constraint.to_func_call())),
                Value::assignment(AND_RIGHT_KEY, tree),
            ],
        ));
    }
    Some(tree)
}

/// Decode a comparator call or `And` tree back into its constraint list.
pub fn flatten_constraint_tree(value: &Value) -> Result<Vec<VersionConstraint>> {
    let mut out = Vec::new();
    let call = value.as_func_call().ok_or_else(|| {
        ScriptError::InvalidRequirement(format!(
            "version constraint must be a function call, found {}",
            value.kind()
        ))
    })?;
    collect_constraints(call, &mut out)?;
    Ok(out)
}

fn collect_constraints(call: &FuncCall, out: &mut Vec<VersionConstraint>) -> Result<()> {
    if let Some(comparator) = Comparator::from_func_name(&call.name) {
        let version = call
            .arguments
            .first()
            .and_then(|arg| match arg {
                Value::Assignment(a) => a.value.str_value(),
                _ => None,
            })
            .ok_or_else(|| {
                ScriptError::InvalidRequirement(format!(
                    "Illegal argument for version comparator '{}': 'value = \"<version>\"' expected",
                    call.name
                ))
            })?;
        out.push(VersionConstraint::new(comparator, version));
        return Ok(());
    }

    if call.name != AND_FUNC {
        return Err(ScriptError::InvalidRequirement(format!(
            "Unknown version comparator: {}",
            call.name
        )));
    }
    if call.arguments.len() != 2 {
        return Err(ScriptError::InvalidRequirement(format!(
            "Illegal arguments for version comparator '{}': 2 arguments expected, got {}",
            AND_FUNC,
            call.arguments.len()
        )));
    }
    for arg in &call.arguments {
        let branch = match arg {
            Value::Assignment(a) if a.key == AND_LEFT_KEY || a.key == AND_RIGHT_KEY => {
                a.value.as_func_call()
            }
            _ => None,
        };
        let branch = branch.ok_or_else(|| {
            ScriptError::InvalidRequirement(format!(
                "Illegal argument for version comparator '{}': 'left|right = function' expected",
                AND_FUNC
            ))
        })?;
        collect_constraints(branch, out)?;
    }
    Ok(())
}

/// Translate a user-supplied version string into constraints.
///
/// - `3.10.10` is an exact version: `[eq 3.10.10]`
/// - `3.10.x` is a wildcard: `[gte 3.10, lt 3.11]`
/// - `>=1.2,<1.3` is a comma-separated list of comparator expressions
pub fn version_string_to_constraints(version: &str) -> Result<Vec<VersionConstraint>> {
    let version = version.trim();
    if EXACT_VERSION.is_match(version) {
        return Ok(vec![VersionConstraint::new(Comparator::Eq, version)]);
    }

    let parts: Vec<&str> = version.split('.').collect();
    if let Some(i) = parts.iter().position(|p| *p == "x" || *p == "X") {
        return wildcard_constraints(version, &parts, i);
    }

    parse_comparator_list(version)
}

fn wildcard_constraints(
    version: &str,
    parts: &[&str],
    wildcard: usize,
) -> Result<Vec<VersionConstraint>> {
    if wildcard == 0 {
        return Err(ScriptError::WildcardStart {
            version: version.to_string(),
        });
    }

    let lower = parts[..wildcard].join(".");
    let previous: u64 = parts[wildcard - 1]
        .parse()
        .map_err(|_| ScriptError::InvalidVersion {
            version: version.to_string(),
            detail: "version parts are expected to be numeric".to_string(),
        })?;
    let mut upper: Vec<String> = parts[..wildcard].iter().map(|p| p.to_string()).collect();
    let next = previous
        .checked_add(1)
        .ok_or_else(|| ScriptError::InvalidVersion {
            version: version.to_string(),
            detail: "wildcard upper bound is out of range".to_string(),
        })?;
    upper[wildcard - 1] = next.to_string();

    Ok(vec![
        VersionConstraint::new(Comparator::Gte, lower),
        VersionConstraint::new(Comparator::Lt, upper.join(".")),
    ])
}

fn parse_comparator_list(version: &str) -> Result<Vec<VersionConstraint>> {
    let invalid = |detail: String| ScriptError::InvalidVersion {
        version: version.to_string(),
        detail,
    };

    let mut constraints = Vec::new();
    for expr in version.split(',') {
        let caps = COMPARATOR_EXPR
            .captures(expr)
            .ok_or_else(|| invalid(format!("cannot parse '{}'", expr.trim())))?;
        let op = caps.get(1).map_or("", |m| m.as_str());
        let comparator = Comparator::from_operator(op)
            .ok_or_else(|| invalid(format!("unknown operator '{}'", op)))?;
        let number = caps.get(2).map_or("", |m| m.as_str());
        constraints.push(VersionConstraint::new(comparator, number));
    }
    Ok(constraints)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn c(comparator: Comparator, version: &str) -> VersionConstraint {
        VersionConstraint::new(comparator, version)
    }

    #[test]
    fn single_constraint_has_no_and_wrapper() {
        let tree = build_constraint_tree(&[c(Comparator::Eq, "3.10.10")]).expect("tree");
        let call = tree.as_func_call().expect("call");
        assert_eq!(call.name, "Eq");
        assert_eq!(
            call.argument("value").and_then(Value::str_value),
            Some("3.10.10")
        );
        assert!(build_constraint_tree(&[]).is_none());
    }

    #[test]
    fn tree_leans_right() {
        let constraints = vec![
            c(Comparator::Gt, "1.0"),
            c(Comparator::Ne, "2.0"),
            c(Comparator::Lt, "3.0"),
        ];
        let tree = build_constraint_tree(&constraints).expect("tree");
        let root = tree.as_func_call().expect("root");
        assert_eq!(root.name, "And");
        assert_eq!(
            root.argument("left").and_then(Value::as_func_call).map(|f| f.name.as_str()),
            Some("Gt")
        );
        let right = root
            .argument("right")
            .and_then(Value::as_func_call)
            .expect("right");
        assert_eq!(right.name, "And");
        assert_eq!(flatten_constraint_tree(&tree).expect("flatten"), constraints);
    }

    #[test]
    fn flatten_rejects_unknown_functions() {
        let bogus = Value::FuncCall(FuncCall::new("Approx", vec![]));
        let err = flatten_constraint_tree(&bogus).unwrap_err();
        assert_eq!(
            err.to_string(),
            "Invalid requirement: Unknown version comparator: Approx"
        );

        let no_value = Value::FuncCall(FuncCall::new("Eq", vec![]));
        assert!(flatten_constraint_tree(&no_value).is_err());
    }

    #[test]
    fn comparator_spellings() {
        assert_eq!("gte".parse::<Comparator>().expect("gte"), Comparator::Gte);
        assert_eq!("Lt".parse::<Comparator>().expect("Lt"), Comparator::Lt);
        assert!("approx".parse::<Comparator>().is_err());
        assert_eq!(Comparator::Ne.func_name(), "Ne");
        assert_eq!(
            serde_json::to_string(&Comparator::Lte).expect("json"),
            "\"lte\""
        );
    }

    #[test]
    fn exact_and_wildcard_versions() {
        assert_eq!(
            version_string_to_constraints("3.10.10").expect("exact"),
            vec![c(Comparator::Eq, "3.10.10")]
        );
        assert_eq!(
            version_string_to_constraints("2.x").expect("wildcard"),
            vec![c(Comparator::Gte, "2"), c(Comparator::Lt, "3")]
        );
        assert_eq!(
            version_string_to_constraints("3.10.X").expect("wildcard"),
            vec![c(Comparator::Gte, "3.10"), c(Comparator::Lt, "3.11")]
        );
    }

    #[test]
    fn leading_wildcard_is_rejected() {
        let err = version_string_to_constraints("x.1").unwrap_err();
        assert!(matches!(err, ScriptError::WildcardStart { ref version } if version == "x.1"));
    }

    #[test]
    fn non_numeric_part_before_wildcard_is_rejected() {
        let err = version_string_to_constraints("1.beta.x").unwrap_err();
        assert!(matches!(err, ScriptError::InvalidVersion { .. }));
    }

    #[test]
    fn wildcard_upper_bound_overflow() {
        let err = version_string_to_constraints("18446744073709551615.x").unwrap_err();
        assert!(matches!(
            err,
            ScriptError::InvalidVersion { ref version, .. } if version == "18446744073709551615.x"
        ));
        assert_eq!(
            version_string_to_constraints("1.18446744073709551614.x").expect("in range"),
            vec![
                c(Comparator::Gte, "1.18446744073709551614"),
                c(Comparator::Lt, "1.18446744073709551615"),
            ]
        );
    }

    #[test]
    fn comparator_expressions() {
        assert_eq!(
            version_string_to_constraints(">=1.2, <1.3").expect("range"),
            vec![c(Comparator::Gte, "1.2"), c(Comparator::Lt, "1.3")]
        );
        assert_eq!(
            version_string_to_constraints("!=2").expect("ne"),
            vec![c(Comparator::Ne, "2")]
        );
        assert_eq!(
            version_string_to_constraints("==1.0rc1").expect("eq"),
            vec![c(Comparator::Eq, "1.0rc1")]
        );
        assert!(version_string_to_constraints(">=").is_err());
        assert!(version_string_to_constraints("~>1.0").is_err());
    }

    fn arb_constraint() -> impl Strategy<Value = VersionConstraint> {
        (0usize..6, "[0-9]{1,3}(\\.[0-9]{1,3}){0,2}")
            .prop_map(|(i, version)| VersionConstraint::new(Comparator::ALL[i], version))
    }

    proptest! {
        #[test]
        fn flatten_inverts_build(constraints in prop::collection::vec(arb_constraint(), 1..8)) {
            let tree = build_constraint_tree(&constraints).expect("non-empty");
            prop_assert_eq!(flatten_constraint_tree(&tree).expect("flatten"), constraints);
        }
    }
}
