//! Interpreter for lowered render instructions.

use std::borrow::Cow;

use serde_json::Value;

use crate::module::Instr;

/// Name the model is bound to in every view.
pub const MODEL: &str = "model";

/// Render `body` against `model`.
pub fn render(body: &[Instr], model: &Value) -> String {
    let mut out = String::new();
    let mut scope = vec![(MODEL, model)];
    run(body, &mut scope, &mut out);
    out
}

fn run<'a>(body: &'a [Instr], scope: &mut Vec<(&'a str, &'a Value)>, out: &mut String) {
    for instr in body {
        match instr {
            Instr::Write(text) => out.push_str(text),
            Instr::Emit(path) => {
                if let Some(value) = resolve(scope, path) {
                    out.push_str(&html_escape(&display(value)));
                }
            }
            Instr::If { cond, negate, then, otherwise } => {
                let truthy = resolve(scope, cond).is_some_and(is_truthy);
                if truthy != *negate {
                    run(then, scope, out);
                } else {
                    run(otherwise, scope, out);
                }
            }
            Instr::For { binding, source, body } => {
                let items: Vec<&Value> = match resolve(scope, source) {
                    Some(Value::Array(items)) => items.iter().collect(),
                    Some(Value::Object(map)) => map.values().collect(),
                    _ => Vec::new(),
                };
                for item in items {
                    scope.push((binding.as_str(), item));
                    run(body, scope, out);
                    scope.pop();
                }
            }
        }
    }
}

/// Look up a dotted path, innermost binding first. Missing members are `None`.
fn resolve<'a>(scope: &[(&'a str, &'a Value)], path: &[String]) -> Option<&'a Value> {
    let (root, members) = path.split_first()?;
    let mut value = scope
        .iter()
        .rev()
        .find(|(name, _)| *name == root.as_str())
        .map(|(_, value)| *value)?;
    for member in members {
        value = value.get(member.as_str())?;
    }
    Some(value)
}

fn is_truthy(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::Bool(b) => *b,
        Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0),
        Value::String(s) => !s.is_empty(),
        Value::Array(items) => !items.is_empty(),
        Value::Object(map) => !map.is_empty(),
    }
}

fn display(value: &Value) -> Cow<'_, str> {
    match value {
        Value::Null => Cow::Borrowed(""),
        Value::String(s) => Cow::Borrowed(s),
        other => Cow::Owned(other.to_string()),
    }
}

/// Escape HTML special characters.
///
/// Uses `Cow` to avoid allocation when no escaping is needed.
#[inline]
fn html_escape(s: &str) -> Cow<'_, str> {
    if !s.contains(['<', '>', '&', '"', '\'']) {
        return Cow::Borrowed(s);
    }

    let mut result = String::with_capacity(s.len() + 8);
    for c in s.chars() {
        match c {
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '&' => result.push_str("&amp;"),
            '"' => result.push_str("&quot;"),
            '\'' => result.push_str("&#39;"),
            _ => result.push(c),
        }
    }
    Cow::Owned(result)
}
