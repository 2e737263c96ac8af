use crate::error::{Error, Result};
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

/// Runs of braces around anything that is not a brace.
static PLACEHOLDER: LazyLock<std::result::Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"\{+[^{}]*\}+"));

fn placeholder_regex() -> Result<&'static Regex> {
    PLACEHOLDER
        .as_ref()
        .map_err(|e| Error::template(format!("placeholder pattern: {e}")))
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => chars.all(|c| c.is_alphanumeric() || c == '_'),
        _ => false,
    }
}

/// `name`, or `app:name` / `user:name` / `temp:name`.
fn is_state_name(name: &str) -> bool {
    match name.split_once(':') {
        None => is_identifier(name),
        Some((prefix, rest)) => matches!(prefix, "app" | "user" | "temp") && is_identifier(rest),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Substitute `{var}` / `{var?}` placeholders in an instruction with session
/// state. Anything between braces that is not a state name stays literal.
pub fn inject_state(template: &str, state: &Map<String, Value>) -> Result<String> {
    let mut out = String::with_capacity(template.len());
    let mut last = 0;

    for m in placeholder_regex()?.find_iter(template) {
        out.push_str(&template[last..m.start()]);
        last = m.end();

        let raw = m.as_str();
        let name = raw.trim_matches(|c| c == '{' || c == '}').trim();
        let (name, optional) = match name.strip_suffix('?') {
            Some(n) => (n, true),
            None => (name, false),
        };

        if !is_state_name(name) {
            out.push_str(raw);
            continue;
        }
        match state.get(name) {
            Some(value) => out.push_str(&render_value(value)),
            None if optional => {}
            None => return Err(Error::template(format!("state variable '{name}' not found"))),
        }
    }
    out.push_str(&template[last..]);
    Ok(out)
}
