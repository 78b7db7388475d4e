//! Coercion of untrusted JSON values into schema field types.
//!
//! Every function here is total: bad input degrades to the field default
//! (`None` or an empty list) instead of an error.

use serde_json::Value;
use tracing::warn;

/// Strings accepted as `true` by [`flag`], compared case-insensitively.
const TRUTHY: &[&str] = &["true", "1", "yes", "on"];

/// Stringify a scalar the way it would be displayed.
///
/// Strings are taken verbatim; everything else uses its JSON text.
fn display(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Bounded text field. Over-long values are cut to `max` characters.
pub fn text(value: Option<&Value>, field: &str, max: usize) -> Option<String> {
    let value = value.filter(|v| !v.is_null())?;
    let text = display(value);
    let len = text.chars().count();
    if len > max {
        warn!(field, max, len, "Truncating over-long field");
        return Some(text.chars().take(max).collect());
    }
    Some(text)
}

/// Numeric field.
///
/// Numbers pass through. Strings containing a decimal point parse as
/// floats, other strings as integers; unparseable input yields `None`.
pub fn number(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => parse_numeric(s.trim()),
        _ => None,
    }
}

/// Integer field. Fractional input is rounded to the nearest integer.
pub fn integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => {
            let s = s.trim();
            if s.contains('.') {
                s.parse::<f64>().ok().map(|f| f.round() as i64)
            } else {
                s.parse::<i64>().ok()
            }
        }
        _ => None,
    }
}

fn parse_numeric(s: &str) -> Option<f64> {
    if s.contains('.') {
        s.parse::<f64>().ok()
    } else {
        s.parse::<i64>().ok().map(|i| i as f64)
    }
}

/// Boolean field.
///
/// Booleans pass through; anything else is `true` only when its text is in
/// the truthy set. Absent or null input stays `None`.
pub fn flag(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        other => {
            let text = display(other).trim().to_lowercase();
            Some(TRUTHY.contains(&text.as_str()))
        }
    }
}

/// List-of-strings field.
///
/// A list keeps its non-null elements, stringified. A lone scalar becomes
/// a one-element list. Absent or null input is an empty list.
pub fn string_list(value: Option<&Value>) -> Vec<String> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|item| !item.is_null())
            .map(display)
            .collect(),
        Some(other) => vec![display(other)],
    }
}
