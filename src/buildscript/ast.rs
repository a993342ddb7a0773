//! Build script AST: assignments, function calls and values.

use serde::{Deserialize, Serialize};

/// Name of the solve function.
pub const SOLVE_FUNC: &str = "solve";
/// Name of the legacy solve function.
pub const SOLVE_LEGACY_FUNC: &str = "solve_legacy";
/// Dependency requirement function.
pub const REQ_FUNC: &str = "Req";
/// Revision requirement function.
pub const REVISION_FUNC: &str = "Revision";
/// Build flag function.
pub const BUILD_FLAG_FUNC: &str = "BuildFlag";
/// Conjunction of two version constraints.
pub const AND_FUNC: &str = "And";

/// Assignment written last in the text form and exported as `in`.
pub const MAIN_KEY: &str = "main";
/// Key of the solve timestamp, both at top level and inside the solve node.
pub const AT_TIME_KEY: &str = "at_time";
/// Key of a nested scope.
pub const LET_KEY: &str = "let";
/// Solve node argument holding requirements.
pub const REQUIREMENTS_KEY: &str = "requirements";
/// Solve node argument holding platform identifiers.
pub const PLATFORMS_KEY: &str = "platforms";

/// `key = value` at any nesting level.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    /// Left-hand side name.
    pub key: String,
    /// Right-hand side value.
    pub value: Value,
}

impl Assignment {
    /// Construct an assignment.
    pub fn new(key: impl Into<String>, value: Value) -> Self {
        Self {
            key: key.into(),
            value,
        }
    }
}

/// Function application. Named arguments are `Value::Assignment`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncCall {
    /// Function name.
    pub name: String,
    /// Arguments in source order.
    pub arguments: Vec<Value>,
}

impl FuncCall {
    /// Construct a function call.
    pub fn new(name: impl Into<String>, arguments: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            arguments,
        }
    }

    /// Value of the named argument `key`, if present.
    pub fn argument(&self, key: &str) -> Option<&Value> {
        self.arguments.iter().find_map(|arg| match arg {
            Value::Assignment(a) if a.key == key => Some(&a.value),
            _ => None,
        })
    }

    /// Mutable value of the named argument `key`, if present.
    pub fn argument_mut(&mut self, key: &str) -> Option<&mut Value> {
        self.arguments.iter_mut().find_map(|arg| match arg {
            Value::Assignment(a) if a.key == key => Some(&mut a.value),
            _ => None,
        })
    }

    /// Named arguments in order, skipping positional ones.
    pub fn named_arguments(&self) -> impl Iterator<Item = &Assignment> {
        self.arguments.iter().filter_map(|arg| match arg {
            Value::Assignment(a) => Some(a.as_ref()),
            _ => None,
        })
    }

    /// Whether this is a `solve` or `solve_legacy` call.
    pub fn is_solve(&self) -> bool {
        self.name == SOLVE_FUNC || self.name == SOLVE_LEGACY_FUNC
    }
}

/// A build script value. Exactly one shape at a time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value")]
pub enum Value {
    /// `name(arg, key = arg, ...)`
    FuncCall(FuncCall),
    /// `[a, b, ...]`
    List(Vec<Value>),
    /// String literal, stored unquoted.
    Str(String),
    /// Numeric literal.
    Number(f64),
    /// `null`
    Null,
    /// Named argument inside a function call.
    Assignment(Box<Assignment>),
    /// `{ key = value, ... }`
    Object(Vec<Assignment>),
    /// Bare reference to another assignment.
    Ident(String),
}

impl Value {
    /// String literal value.
    pub fn new_string(text: impl Into<String>) -> Self {
        Value::Str(text.into())
    }

    /// Identifier value.
    pub fn ident(name: impl Into<String>) -> Self {
        Value::Ident(name.into())
    }

    /// Named argument value.
    pub fn assignment(key: impl Into<String>, value: Value) -> Self {
        Value::Assignment(Box::new(Assignment::new(key, value)))
    }

    /// Contents of a string literal, with any stray surrounding quotes removed.
    pub fn str_value(&self) -> Option<&str> {
        match self {
            Value::Str(text) => Some(strip_quotes(text)),
            _ => None,
        }
    }

    /// The function call, if this value is one.
    pub fn as_func_call(&self) -> Option<&FuncCall> {
        match self {
            Value::FuncCall(f) => Some(f),
            _ => None,
        }
    }

    /// The list items, if this value is a list.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Mutable list items, if this value is a list.
    pub fn as_list_mut(&mut self) -> Option<&mut Vec<Value>> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Identifier name, if this value is an identifier.
    pub fn as_ident(&self) -> Option<&str> {
        match self {
            Value::Ident(name) => Some(name),
            _ => None,
        }
    }

    /// Short description of the variant for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::FuncCall(_) => "function call",
            Value::List(_) => "list",
            Value::Str(_) => "string",
            Value::Number(_) => "number",
            Value::Null => "null",
            Value::Assignment(_) => "assignment",
            Value::Object(_) => "object",
            Value::Ident(_) => "identifier",
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    text.strip_prefix('"')
        .and_then(|inner| inner.strip_suffix('"'))
        .unwrap_or(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn str_value_strips_quotes() {
        assert_eq!(Value::new_string("python").str_value(), Some("python"));
        assert_eq!(Value::new_string("\"python\"").str_value(), Some("python"));
        assert_eq!(Value::ident("python").str_value(), None);
    }

    #[test]
    fn named_argument_lookup() {
        let mut call = FuncCall::new(
            REQ_FUNC,
            vec![
                Value::assignment("name", Value::new_string("python")),
                Value::ident("positional"),
                Value::assignment("namespace", Value::new_string("language")),
            ],
        );
        assert_eq!(
            call.argument("namespace").and_then(Value::str_value),
            Some("language")
        );
        assert!(call.argument("version").is_none());
        assert_eq!(call.named_arguments().count(), 2);

        if let Some(value) = call.argument_mut("name") {
            *value = Value::new_string("perl");
        }
        assert_eq!(call.argument("name").and_then(Value::str_value), Some("perl"));
    }
}
