//! Conversion between data values and JSON.
//!
//! Only data crosses this boundary: numbers, booleans, symbols (as JSON strings),
//! lists (as arrays) and the no-value marker (as `null`). Callables have no JSON form.

use crate::Error;
use crate::MAX_PARSE_DEPTH;
use crate::ast::Value;

/// Convert a data value to a `serde_json::Value`
pub fn value_to_json(value: &Value) -> Result<serde_json::Value, Error> {
    match value {
        Value::Integer(n) => Ok(serde_json::Value::from(*n)),
        Value::Real(r) => serde_json::Number::from_f64(*r)
            .map(serde_json::Value::Number)
            .ok_or_else(|| Error::TypeError(format!("Cannot represent {r} as JSON"))),
        Value::Bool(b) => Ok(serde_json::Value::Bool(*b)),
        Value::Symbol(s) => Ok(serde_json::Value::String(s.clone())),
        Value::List(elements) => elements
            .iter()
            .map(value_to_json)
            .collect::<Result<Vec<_>, _>>()
            .map(serde_json::Value::Array),
        Value::Unspecified => Ok(serde_json::Value::Null),
        Value::Primitive { .. } | Value::Closure { .. } => Err(Error::TypeError(format!(
            "Cannot convert {} to JSON: {value}",
            value.type_name()
        ))),
    }
}

/// Convert a data value to compact JSON text
pub fn value_to_json_string(value: &Value) -> Result<String, Error> {
    let json = value_to_json(value)?;
    serde_json::to_string(&json)
        .map_err(|e| Error::EvalError(format!("JSON serialization failed: {e}")))
}

/// Parse JSON text into a data value
pub fn parse_json(input: &str) -> Result<Value, Error> {
    let json: serde_json::Value = serde_json::from_str(input)
        .map_err(|e| Error::SyntaxError(format!("Invalid JSON: {e}")))?;
    json_to_value(json, 0)
}

fn json_to_value(json: serde_json::Value, depth: usize) -> Result<Value, Error> {
    if depth >= MAX_PARSE_DEPTH {
        return Err(Error::SyntaxError(format!(
            "JSON too deeply nested (max depth: {MAX_PARSE_DEPTH})"
        )));
    }
    match json {
        serde_json::Value::Null => Ok(Value::Unspecified),
        serde_json::Value::Bool(b) => Ok(Value::Bool(b)),
        serde_json::Value::Number(n) => match (n.as_i64(), n.as_f64()) {
            (Some(i), _) => Ok(Value::Integer(i)),
            (None, Some(r)) => Ok(Value::Real(r)),
            (None, None) => Err(Error::TypeError(format!("Unsupported JSON number: {n}"))),
        },
        serde_json::Value::String(s) => Ok(Value::Symbol(s)),
        serde_json::Value::Array(items) => items
            .into_iter()
            .map(|item| json_to_value(item, depth + 1))
            .collect::<Result<Vec<_>, _>>()
            .map(Value::List),
        serde_json::Value::Object(_) => Err(Error::TypeError(
            "JSON objects have no value representation".into(),
        )),
    }
}
