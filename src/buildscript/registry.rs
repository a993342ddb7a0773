//! Function marshaler registry
//!
//! Calls such as `Req(...)` have a dedicated wire shape that differs from the
//! generic `{"name": {args}}` encoding. A [`FunctionRegistry`] maps function
//! names to the marshalers that produce those shapes. Each
//! [`ExpressionCodec`](super::expression::ExpressionCodec) owns its registry,
//! so two codecs with different registries never affect one another.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value as JsonValue};
use tracing::debug;

use super::ast::{Assignment, BUILD_FLAG_FUNC, REQ_FUNC, REVISION_FUNC, Value};
use super::error::{Result, ScriptError};
use super::expression::{
    ExpressionCodec, number_to_json, NAME_KEY, NAMESPACE_KEY, REVISION_ID_KEY, VERSION_KEY,
    VERSION_REQUIREMENTS_KEY,
};
use super::version::flatten_constraint_tree;

/// Function name (e.g., "Req", "ingredient")
pub type FunctionName = &'static str;

/// Marshaler turning a call's arguments into their wire JSON.
///
/// The codec is passed in so nested values can be encoded the normal way.
pub type Marshaler =
    Arc<dyn Fn(&[Value], &ExpressionCodec) -> Result<JsonValue> + Send + Sync>;

const BUILD_FLAG_VALUE_KEY: &str = "value";

/// Registry of function marshalers used when emitting build expressions.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    marshalers: HashMap<String, Marshaler>,
}

impl FunctionRegistry {
    /// Registry with nothing registered; every call uses the generic encoding.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the `Req`, `Revision` and `BuildFlag` marshalers.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(REQ_FUNC, marshal_req);
        registry.register(REVISION_FUNC, marshal_revision);
        registry.register(BUILD_FLAG_FUNC, marshal_build_flag);
        registry
    }

    /// Register (or replace) the marshaler for `name`.
    pub fn register<F>(&mut self, name: FunctionName, marshaler: F)
    where
        F: Fn(&[Value], &ExpressionCodec) -> Result<JsonValue> + Send + Sync + 'static,
    {
        self.marshalers.insert(name.to_string(), Arc::new(marshaler));
    }

    /// Marshaler registered for `name`, if any.
    pub fn get(&self, name: &str) -> Option<&Marshaler> {
        self.marshalers.get(name)
    }

    /// Check whether a marshaler is registered for `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.marshalers.contains_key(name)
    }

    /// Registered function names, sorted.
    pub fn list_functions(&self) -> Vec<String> {
        let mut names: Vec<String> = self.marshalers.keys().cloned().collect();
        names.sort();
        names
    }
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionRegistry")
            .field("functions", &self.list_functions())
            .finish()
    }
}

fn named_arguments<'a>(func: &str, args: &'a [Value]) -> Result<Vec<&'a Assignment>> {
    args.iter()
        .map(|arg| match arg {
            Value::Assignment(a) => Ok(a.as_ref()),
            other => Err(ScriptError::InvalidExpression(format!(
                "Cannot marshal positional {} argument to '{}'",
                other.kind(),
                func
            ))),
        })
        .collect()
}

fn pass_through(
    func: &str,
    object: &mut Map<String, JsonValue>,
    arg: &Assignment,
    codec: &ExpressionCodec,
) -> Result<()> {
    debug!(function = func, argument = %arg.key, "Adding unknown argument");
    object.insert(arg.key.clone(), codec.export_value(&arg.value)?);
    Ok(())
}

/// `Req(name = .., namespace = .., version = <tree>)` to
/// `{"name": .., "namespace": .., "version_requirements": [..]}`.
fn marshal_req(args: &[Value], codec: &ExpressionCodec) -> Result<JsonValue> {
    let mut object = Map::new();
    for arg in named_arguments(REQ_FUNC, args)? {
        match (arg.key.as_str(), &arg.value) {
            (NAME_KEY | NAMESPACE_KEY, Value::Str(_)) => {
                let text = arg.value.str_value().unwrap_or_default();
                object.insert(arg.key.clone(), JsonValue::String(text.to_string()));
            }
            (VERSION_KEY, Value::FuncCall(_)) => {
                let constraints = flatten_constraint_tree(&arg.value)?;
                object.insert(
                    VERSION_REQUIREMENTS_KEY.to_string(),
                    serde_json::to_value(constraints)?,
                );
            }
            _ => pass_through(REQ_FUNC, &mut object, arg, codec)?,
        }
    }
    Ok(JsonValue::Object(object))
}

/// `Revision(name = .., revision_id = ..)` to `{"name": .., "revision_id": ..}`.
fn marshal_revision(args: &[Value], codec: &ExpressionCodec) -> Result<JsonValue> {
    let mut object = Map::new();
    for arg in named_arguments(REVISION_FUNC, args)? {
        match (arg.key.as_str(), &arg.value) {
            (NAME_KEY, Value::Str(_)) | (REVISION_ID_KEY, Value::Str(_)) => {
                let text = arg.value.str_value().unwrap_or_default();
                object.insert(arg.key.clone(), JsonValue::String(text.to_string()));
            }
            (REVISION_ID_KEY, Value::Number(num)) => {
                object.insert(arg.key.clone(), number_to_json(*num));
            }
            _ => pass_through(REVISION_FUNC, &mut object, arg, codec)?,
        }
    }
    Ok(JsonValue::Object(object))
}

/// `BuildFlag(name = .., value = ..)` to `{"name": .., "value": ..}`.
fn marshal_build_flag(args: &[Value], codec: &ExpressionCodec) -> Result<JsonValue> {
    let mut object = Map::new();
    for arg in named_arguments(BUILD_FLAG_FUNC, args)? {
        match (arg.key.as_str(), &arg.value) {
            (NAME_KEY | BUILD_FLAG_VALUE_KEY, Value::Str(_)) => {
                let text = arg.value.str_value().unwrap_or_default();
                object.insert(arg.key.clone(), JsonValue::String(text.to_string()));
            }
            _ => pass_through(BUILD_FLAG_FUNC, &mut object, arg, codec)?,
        }
    }
    Ok(JsonValue::Object(object))
}
