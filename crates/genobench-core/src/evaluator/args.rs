//! Typed accessors for evaluator `op_args`.

use serde_json::Value;

use super::EvaluatorError;

pub fn required_str<'a>(args: &'a Value, key: &str) -> Result<&'a str, EvaluatorError> {
    match args.get(key) {
        Some(Value::String(s)) => Ok(s),
        Some(other) => Err(invalid(key, "a string", other)),
        None => Err(EvaluatorError::InvalidArgs(format!("missing `{}`", key))),
    }
}

pub fn required_str_list(args: &Value, key: &str) -> Result<Vec<String>, EvaluatorError> {
    match args.get(key) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => Ok(s.clone()),
                other => Err(invalid(key, "a list of strings", other)),
            })
            .collect(),
        Some(other) => Err(invalid(key, "a list of strings", other)),
        None => Err(EvaluatorError::InvalidArgs(format!("missing `{}`", key))),
    }
}

pub fn f64_or(args: &Value, key: &str, default: f64) -> Result<f64, EvaluatorError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value.as_f64().ok_or_else(|| invalid(key, "a number", value)),
    }
}

pub fn usize_or(args: &Value, key: &str, default: usize) -> Result<usize, EvaluatorError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(value) => value
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| invalid(key, "a non-negative integer", value)),
    }
}

pub fn bool_or(args: &Value, key: &str, default: bool) -> Result<bool, EvaluatorError> {
    match args.get(key) {
        None | Some(Value::Null) => Ok(default),
        Some(Value::Bool(b)) => Ok(*b),
        Some(other) => Err(invalid(key, "a boolean", other)),
    }
}

fn invalid(key: &str, expected: &str, got: &Value) -> EvaluatorError {
    EvaluatorError::InvalidArgs(format!("`{}` must be {}, got {}", key, expected, got))
}
