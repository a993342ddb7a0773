//! Text form pretty-printer.

use chrono::{DateTime, Utc};

use super::ast::{AT_TIME_KEY, Assignment, FuncCall, MAIN_KEY, Value};
use super::config::ScriptConfig;
use super::format_timestamp;

/// Renders an AST in the text form.
///
/// Structural calls get one argument per line; calls named in
/// [`ScriptConfig::inline_functions`] are written on a single line.
pub struct TextEmitter<'a> {
    config: &'a ScriptConfig,
}

impl<'a> TextEmitter<'a> {
    /// Emitter using the given configuration.
    pub fn new(config: &'a ScriptConfig) -> Self {
        Self { config }
    }

    /// Render a whole script. `main` assignments come last after a blank line.
    pub fn emit(&self, assignments: &[Assignment], at_time: Option<&DateTime<Utc>>) -> String {
        let (main, body): (Vec<&Assignment>, Vec<&Assignment>) =
            assignments.iter().partition(|a| a.key == MAIN_KEY);

        let mut sections = Vec::new();
        if let Some(ts) = at_time {
            sections.push(format!("{} = \"{}\"", AT_TIME_KEY, format_timestamp(ts)));
        }
        if !body.is_empty() {
            sections.push(self.lines(&body));
        }
        if !main.is_empty() {
            sections.push(self.lines(&main));
        }
        sections.join("\n\n")
    }

    fn lines(&self, assignments: &[&Assignment]) -> String {
        assignments
            .iter()
            .map(|a| self.assignment(a))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Render `key = value`.
    pub fn assignment(&self, assignment: &Assignment) -> String {
        format!("{} = {}", assignment.key, self.value(&assignment.value))
    }

    /// Render a single value.
    pub fn value(&self, value: &Value) -> String {
        match value {
            Value::FuncCall(call) => self.func_call(call),
            Value::List(items) => block(
                '[',
                ']',
                items.iter().map(|item| self.value(item)).collect(),
            ),
            Value::Str(text) => quote(text),
            Value::Number(num) => format!("{}", num),
            Value::Null => "null".to_string(),
            Value::Assignment(a) => self.assignment(a),
            Value::Object(fields) => block(
                '{',
                '}',
                fields.iter().map(|a| self.assignment(a)).collect(),
            ),
            Value::Ident(name) => name.clone(),
        }
    }

    fn func_call(&self, call: &FuncCall) -> String {
        let args: Vec<String> = call.arguments.iter().map(|arg| self.value(arg)).collect();
        if args.is_empty() {
            return format!("{}()", call.name);
        }
        if self.config.is_inline(&call.name) {
            return format!("{}({})", call.name, args.join(", "));
        }
        let body: Vec<String> = args.iter().map(|arg| indent(arg)).collect();
        format!("{}(\n{}\n)", call.name, body.join(",\n"))
    }
}

fn block(open: char, close: char, items: Vec<String>) -> String {
    if items.is_empty() {
        return format!("{}{}", open, close);
    }
    let body: Vec<String> = items.iter().map(|item| indent(item)).collect();
    format!("{}\n{}\n{}", open, body.join(",\n"), close)
}

fn indent(text: &str) -> String {
    format!("\t{}", text.replace('\n', "\n\t"))
}

fn quote(text: &str) -> String {
    serde_json::Value::String(text.to_string()).to_string()
}
