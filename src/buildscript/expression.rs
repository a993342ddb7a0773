//! JSON build expression codec
//!
//! The wire form differs from the text AST in a few ways:
//!
//! - the top-level object is `{"let": {...}}` and `main` is spelled `in`
//! - a call is a single-key object: `{"solve": {"at_time": ..}}` for named
//!   arguments, `{"merge": [..]}` for positional ones
//! - references are strings prefixed with `$`
//! - requirements may arrive as plain objects (the legacy form) and are always
//!   normalized to `Req(...)` calls on import
//! - the solve node's `at_time` is the `$at_time` reference; a concrete
//!   timestamp found there is lifted onto the script

use chrono::{DateTime, Utc};
use serde_json::{Map, Value as JsonValue};
use tracing::{debug, info};

use super::ast::{
    AT_TIME_KEY, Assignment, FuncCall, LET_KEY, MAIN_KEY, REQ_FUNC, REQUIREMENTS_KEY, Value,
};
use super::error::{Result, ScriptError};
use super::query::{solve_node, solve_node_mut};
use super::registry::FunctionRegistry;
use super::version::{Comparator, VersionConstraint, build_constraint_tree};
use super::{parse_timestamp, truncate_timestamp};

/// Wire name of the `main` assignment.
pub const IN_KEY: &str = "in";
/// Requirement name field.
pub const NAME_KEY: &str = "name";
/// Requirement namespace field.
pub const NAMESPACE_KEY: &str = "namespace";
/// Object-form list of version constraints.
pub const VERSION_REQUIREMENTS_KEY: &str = "version_requirements";
/// Function-form version argument.
pub const VERSION_KEY: &str = "version";
/// Comparator field of an object-form constraint.
pub const COMPARATOR_KEY: &str = "comparator";
/// Revision number field.
pub const REVISION_KEY: &str = "revision";
/// Revision identifier field of `Revision(...)`.
pub const REVISION_ID_KEY: &str = "revision_id";

const REFERENCE_PREFIX: char = '$';

/// Result of importing a build expression.
#[derive(Debug, Clone, PartialEq)]
pub struct Imported {
    /// Top-level assignments, `in` renamed to `main`.
    pub assignments: Vec<Assignment>,
    /// Timestamp lifted out of the solve node, if it held a concrete one.
    pub at_time: Option<DateTime<Utc>>,
}

/// Bidirectional JSON codec with an injected [`FunctionRegistry`].
#[derive(Debug, Clone)]
pub struct ExpressionCodec {
    registry: FunctionRegistry,
}

impl Default for ExpressionCodec {
    fn default() -> Self {
        Self::new(FunctionRegistry::builtin())
    }
}

impl ExpressionCodec {
    /// Codec using the given registry for export.
    pub fn new(registry: FunctionRegistry) -> Self {
        Self { registry }
    }

    /// Registry consulted during export.
    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Decode a build expression, normalizing legacy requirements and the
    /// solve node's timestamp.
    pub fn import(&self, data: &[u8]) -> Result<Imported> {
        let root: JsonValue = serde_json::from_slice(data)?;
        let scope = root
            .get(LET_KEY)
            .and_then(JsonValue::as_object)
            .ok_or_else(|| {
                ScriptError::InvalidExpression(format!("'{}' value is not an object", LET_KEY))
            })?;

        let mut assignments = import_scope(scope)?;
        let at_time = normalize_solve_node(&mut assignments)?;
        Ok(Imported {
            assignments,
            at_time,
        })
    }

    /// Encode assignments as a pretty-printed build expression with sorted keys.
    pub fn export(&self, assignments: &[Assignment]) -> Result<String> {
        let document = self.export_document(assignments)?;
        Ok(serde_json::to_string_pretty(&document)?)
    }

    /// Encode assignments as a JSON document `{"let": {...}}`.
    pub fn export_document(&self, assignments: &[Assignment]) -> Result<JsonValue> {
        let mut root = Map::new();
        root.insert(LET_KEY.to_string(), self.export_scope(assignments)?);
        Ok(JsonValue::Object(root))
    }

    fn export_scope(&self, assignments: &[Assignment]) -> Result<JsonValue> {
        let mut scope = Map::new();
        for assignment in assignments {
            let key = if assignment.key == MAIN_KEY {
                IN_KEY
            } else {
                assignment.key.as_str()
            };
            let value = match &assignment.value {
                Value::Object(fields) if assignment.key == LET_KEY => self.export_scope(fields)?,
                other => self.export_value(other)?,
            };
            scope.insert(key.to_string(), value);
        }
        Ok(JsonValue::Object(scope))
    }

    /// Encode a single value.
    pub fn export_value(&self, value: &Value) -> Result<JsonValue> {
        Ok(match value {
            Value::FuncCall(call) => self.export_func_call(call)?,
            Value::List(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|item| self.export_value(item))
                    .collect::<Result<_>>()?,
            ),
            Value::Str(_) => JsonValue::String(value.str_value().unwrap_or_default().to_string()),
            Value::Number(num) => number_to_json(*num),
            Value::Null => JsonValue::Null,
            Value::Assignment(a) => {
                let mut object = Map::new();
                object.insert(a.key.clone(), self.export_value(&a.value)?);
                JsonValue::Object(object)
            }
            Value::Object(fields) => {
                let mut object = Map::new();
                for field in fields {
                    object.insert(field.key.clone(), self.export_value(&field.value)?);
                }
                JsonValue::Object(object)
            }
            Value::Ident(name) => JsonValue::String(format!("{}{}", REFERENCE_PREFIX, name)),
        })
    }

    fn export_func_call(&self, call: &FuncCall) -> Result<JsonValue> {
        if let Some(marshal) = self.registry.get(&call.name) {
            return marshal(&call.arguments, self);
        }

        let named = call.named_arguments().count();
        let args = if named == call.arguments.len() {
            let mut object = Map::new();
            for arg in call.named_arguments() {
                object.insert(arg.key.clone(), self.export_value(&arg.value)?);
            }
            JsonValue::Object(object)
        } else if named == 0 {
            JsonValue::Array(
                call.arguments
                    .iter()
                    .map(|arg| self.export_value(arg))
                    .collect::<Result<_>>()?,
            )
        } else {
            return Err(ScriptError::InvalidExpression(format!(
                "Cannot marshal '{}': named and positional arguments are mixed",
                call.name
            )));
        };

        let mut object = Map::new();
        object.insert(call.name.clone(), args);
        Ok(JsonValue::Object(object))
    }
}

/// JSON number for `num`, using an integer when the value is integral.
pub fn number_to_json(num: f64) -> JsonValue {
    const MAX_SAFE: f64 = 9_007_199_254_740_992.0;
    if num.is_finite() && num.fract() == 0.0 && num.abs() <= MAX_SAFE {
        JsonValue::from(num as i64)
    } else {
        serde_json::Number::from_f64(num)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null)
    }
}

#[derive(Clone, Copy)]
enum Context {
    Value,
    In,
}

fn import_scope(scope: &Map<String, JsonValue>) -> Result<Vec<Assignment>> {
    let mut assignments = Vec::with_capacity(scope.len());
    for (key, value) in scope {
        let assignment = match (key.as_str(), value) {
            (IN_KEY, _) => Assignment::new(MAIN_KEY, import_in(value)?),
            (LET_KEY, JsonValue::Object(nested)) => {
                Assignment::new(LET_KEY, Value::Object(import_scope(nested)?))
            }
            _ => Assignment::new(key.clone(), import_value(value, Context::Value)?),
        };
        assignments.push(assignment);
    }
    Ok(assignments)
}

fn import_in(value: &JsonValue) -> Result<Value> {
    match value {
        JsonValue::Object(map) => match as_call(map) {
            Some((name, args)) => Ok(Value::FuncCall(import_func_call(name, args, Context::In)?)),
            None => Err(ScriptError::InvalidExpression(format!(
                "'{}' object is not a function call",
                IN_KEY
            ))),
        },
        JsonValue::String(text) => Ok(Value::Ident(strip_reference(text).to_string())),
        _ => Err(ScriptError::InvalidExpression(format!(
            "'{}' value expected to be a function call or string",
            IN_KEY
        ))),
    }
}

fn as_call(map: &Map<String, JsonValue>) -> Option<(&String, &JsonValue)> {
    if map.len() != 1 {
        return None;
    }
    map.iter()
        .next()
        .filter(|(_, args)| args.is_object() || args.is_array())
}

fn import_value(value: &JsonValue, ctx: Context) -> Result<Value> {
    Ok(match value {
        JsonValue::Object(map) => match as_call(map) {
            Some((name, args)) => Value::FuncCall(import_func_call(name, args, ctx)?),
            None => {
                let mut fields = Vec::with_capacity(map.len());
                for (key, field) in map {
                    fields.push(Assignment::new(key.clone(), import_value(field, ctx)?));
                }
                Value::Object(fields)
            }
        },
        JsonValue::Array(items) => Value::List(
            items
                .iter()
                .map(|item| import_value(item, ctx))
                .collect::<Result<_>>()?,
        ),
        JsonValue::String(text) => {
            if matches!(ctx, Context::In) || text.starts_with(REFERENCE_PREFIX) {
                Value::Ident(strip_reference(text).to_string())
            } else {
                Value::Str(text.clone())
            }
        }
        JsonValue::Number(num) => Value::Number(num.as_f64().unwrap_or_default()),
        JsonValue::Null => Value::Null,
        JsonValue::Bool(flag) => {
            debug!(value = flag, "Unsupported boolean in build expression, using null");
            Value::Null
        }
    })
}

fn import_func_call(name: &str, args: &JsonValue, ctx: Context) -> Result<FuncCall> {
    let arguments = match args {
        JsonValue::Object(map) => {
            let mut arguments = Vec::with_capacity(map.len());
            for (key, value) in map {
                arguments.push(Value::assignment(key.clone(), import_value(value, ctx)?));
            }
            arguments
        }
        JsonValue::Array(items) => items
            .iter()
            .map(|item| import_value(item, ctx))
            .collect::<Result<_>>()?,
        _ => {
            return Err(ScriptError::InvalidExpression(format!(
                "Function '{}' expected to be object or list",
                name
            )));
        }
    };
    Ok(FuncCall::new(name, arguments))
}

fn strip_reference(text: &str) -> &str {
    text.strip_prefix(REFERENCE_PREFIX).unwrap_or(text)
}

/// Lift a concrete solve timestamp and convert legacy requirement objects.
/// Scripts without a solve node are left alone.
fn normalize_solve_node(assignments: &mut [Assignment]) -> Result<Option<DateTime<Utc>>> {
    if solve_node(assignments).is_err() {
        debug!("No solve node in build expression");
        return Ok(None);
    }
    let solve = solve_node_mut(assignments)?;

    let mut at_time = None;
    if let Some(value) = solve.argument_mut(AT_TIME_KEY) {
        if let Value::Str(text) = value {
            let ts = truncate_timestamp(parse_timestamp(text)?);
            info!(at_time = %ts, "Lifting concrete solve timestamp");
            *value = Value::ident(AT_TIME_KEY);
            at_time = Some(ts);
        }
    }

    if let Some(Value::List(items)) = solve.argument_mut(REQUIREMENTS_KEY) {
        if is_legacy_requirements_list(items) {
            debug!(count = items.len(), "Normalizing legacy requirement objects");
            for item in items.iter_mut() {
                if let Value::Object(fields) = item {
                    *item = Value::FuncCall(requirement_call(fields)?);
                }
            }
        }
    }

    Ok(at_time)
}

/// Whether a requirements list uses the object form.
pub fn is_legacy_requirements_list(items: &[Value]) -> bool {
    matches!(items.first(), Some(Value::Object(_)))
}

/// Validate an object-form requirement and convert it into a `Req(...)` call.
///
/// `version_requirements` becomes the `version` argument holding the
/// constraint tree; every other field is carried over in order.
pub fn requirement_call(fields: &[Assignment]) -> Result<FuncCall> {
    validate_requirement(fields)?;

    let mut arguments = Vec::with_capacity(fields.len());
    for field in fields {
        if field.key != VERSION_REQUIREMENTS_KEY {
            arguments.push(Value::Assignment(Box::new(field.clone())));
            continue;
        }
        let constraints = field
            .value
            .as_list()
            .unwrap_or_default()
            .iter()
            .map(constraint_from_object)
            .collect::<Result<Vec<_>>>()?;
        if let Some(tree) = build_constraint_tree(&constraints) {
            arguments.push(Value::assignment(VERSION_KEY, tree));
        }
    }
    Ok(FuncCall::new(REQ_FUNC, arguments))
}

fn validate_requirement(fields: &[Assignment]) -> Result<()> {
    for key in [NAME_KEY, NAMESPACE_KEY] {
        let value = fields.iter().find(|f| f.key == key).map(|f| &f.value);
        match value.and_then(Value::str_value) {
            Some(text) if !text.is_empty() => {}
            Some(_) => {
                return Err(ScriptError::InvalidRequirement(format!(
                    "requirement field '{}' is empty",
                    key
                )));
            }
            None => {
                return Err(ScriptError::InvalidRequirement(format!(
                    "requirement field '{}' is missing or not a string",
                    key
                )));
            }
        }
    }
    for field in fields.iter().filter(|f| f.key == VERSION_REQUIREMENTS_KEY) {
        if field.value.as_list().is_none() {
            return Err(ScriptError::InvalidRequirement(format!(
                "requirement field '{}' is not a list",
                VERSION_REQUIREMENTS_KEY
            )));
        }
    }
    Ok(())
}

fn constraint_from_object(value: &Value) -> Result<VersionConstraint> {
    let Value::Object(fields) = value else {
        return Err(ScriptError::InvalidRequirement(format!(
            "version requirement must be an object, found {}",
            value.kind()
        )));
    };
    let field = |key: &str| {
        fields
            .iter()
            .find(|f| f.key == key)
            .and_then(|f| f.value.str_value())
            .ok_or_else(|| {
                ScriptError::InvalidRequirement(format!(
                    "version requirement is missing string field '{}'",
                    key
                ))
            })
    };
    let comparator: Comparator = field(COMPARATOR_KEY)?.parse()?;
    Ok(VersionConstraint::new(comparator, field(VERSION_KEY)?))
}
