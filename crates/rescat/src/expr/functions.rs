//! Whitelisted functions callable from expressions.
//!
//! Every function is pure. String functions pass null through unchanged so
//! that a missing attribute under the `default` policy does not turn into a
//! type error one step later.

use regex::Regex;

use super::ExpressionError;
use crate::value::{Number, Value};

/// Functions the evaluator resolves against the resource instead of here.
const RESOURCE_FUNCTIONS: &[&str] = &["has", "get"];

const FUNCTIONS: &[&str] = &[
    "lower",
    "upper",
    "strip",
    "startswith",
    "endswith",
    "contains",
    "basename",
    "dirname",
    "extension",
    "stem",
    "len",
    "str",
    "int",
    "float",
    "bool",
    "matches",
];

/// Returns `true` if `name` is callable from an expression.
pub(crate) fn is_known(name: &str) -> bool {
    FUNCTIONS.contains(&name) || RESOURCE_FUNCTIONS.contains(&name)
}

/// Unpacks exactly `N` arguments.
pub(crate) fn exact<const N: usize>(
    function: &str,
    args: Vec<Value>,
) -> Result<[Value; N], ExpressionError> {
    let got = args.len();
    args.try_into().map_err(|_| ExpressionError::Arity {
        function: function.to_string(),
        expected: arity_label(N),
        got,
    })
}

fn arity_label(n: usize) -> &'static str {
    match n {
        0 => "0",
        1 => "1",
        2 => "2",
        _ => "3",
    }
}

/// Requires a string argument.
pub(crate) fn string_arg<'v>(function: &str, value: &'v Value) -> Result<&'v str, ExpressionError> {
    value.as_str().ok_or_else(|| {
        ExpressionError::Type(format!(
            "{}() expects a string, got '{}'",
            function,
            value.type_name()
        ))
    })
}

/// Calls a whitelisted function with evaluated arguments.
pub(crate) fn call(function: &str, args: Vec<Value>) -> Result<Value, ExpressionError> {
    match function {
        "lower" => map_str(function, args, |s| s.to_lowercase()),
        "upper" => map_str(function, args, |s| s.to_uppercase()),
        "strip" => map_str(function, args, |s| s.trim().to_string()),
        "basename" => map_str(function, args, |s| basename(s).to_string()),
        "dirname" => map_str(function, args, |s| dirname(s).to_string()),
        "extension" => map_str(function, args, |s| split_extension(basename(s)).1.to_string()),
        "stem" => map_str(function, args, |s| split_extension(basename(s)).0.to_string()),
        "startswith" => test_str(function, args, |s, p| s.starts_with(p)),
        "endswith" => test_str(function, args, |s, p| s.ends_with(p)),
        "contains" => test_str(function, args, |s, p| s.contains(p)),
        "matches" => {
            let [subject, pattern] = exact::<2>(function, args)?;
            if subject.is_null() {
                return Ok(Value::Null);
            }
            let subject = string_arg(function, &subject)?;
            let regex = Regex::new(string_arg(function, &pattern)?)?;
            Ok(Value::Bool(regex.is_match(subject)))
        }
        "len" => {
            let [value] = exact::<1>(function, args)?;
            let len = match &value {
                Value::Null => return Ok(Value::Null),
                Value::String(s) => s.chars().count(),
                Value::List(items) => items.len(),
                Value::Map(entries) => entries.len(),
                Value::Tags(tags) => tags.len(),
                other => {
                    return Err(ExpressionError::Type(format!(
                        "'{}' value has no len()",
                        other.type_name()
                    )))
                }
            };
            Ok(Value::from(len as u64))
        }
        "str" => {
            let [value] = exact::<1>(function, args)?;
            Ok(Value::String(value.to_string()))
        }
        "bool" => {
            let [value] = exact::<1>(function, args)?;
            Ok(Value::Bool(value.is_truthy()))
        }
        "int" => {
            let [value] = exact::<1>(function, args)?;
            to_int(value)
        }
        "float" => {
            let [value] = exact::<1>(function, args)?;
            to_float(value)
        }
        other => Err(ExpressionError::UnknownFunction(other.to_string())),
    }
}

fn map_str(
    function: &str,
    args: Vec<Value>,
    f: impl Fn(&str) -> String,
) -> Result<Value, ExpressionError> {
    let [value] = exact::<1>(function, args)?;
    if value.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::String(f(string_arg(function, &value)?)))
}

fn test_str(
    function: &str,
    args: Vec<Value>,
    f: impl Fn(&str, &str) -> bool,
) -> Result<Value, ExpressionError> {
    let [subject, probe] = exact::<2>(function, args)?;
    if subject.is_null() {
        return Ok(Value::Null);
    }
    Ok(Value::Bool(f(
        string_arg(function, &subject)?,
        string_arg(function, &probe)?,
    )))
}

fn to_int(value: Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::from(i64::from(b))),
        Value::Number(Number::F64(f)) if f.is_finite() => Ok(Value::from(f.trunc() as i64)),
        Value::Number(Number::F64(f)) => Err(ExpressionError::Type(format!(
            "cannot convert {} to int",
            f
        ))),
        Value::Number(n) => Ok(Value::Number(n)),
        Value::String(s) => s
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .map_err(|_| ExpressionError::Type(format!("invalid literal for int(): '{}'", s))),
        other => Err(ExpressionError::Type(format!(
            "int() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

fn to_float(value: Value) -> Result<Value, ExpressionError> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Bool(b) => Ok(Value::from(if b { 1.0 } else { 0.0 })),
        Value::Number(n) => Ok(Value::from(n.to_f64())),
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map(Value::from)
            .map_err(|_| ExpressionError::Type(format!("could not convert string to float: '{}'", s))),
        other => Err(ExpressionError::Type(format!(
            "float() argument must be a string or a number, not '{}'",
            other.type_name()
        ))),
    }
}

/// Final path component: everything after the last `/`.
fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Everything before the last `/`; `/` itself for root-level paths.
fn dirname(path: &str) -> &str {
    match path.rfind('/') {
        Some(0) => "/",
        Some(idx) => &path[..idx],
        None => "",
    }
}

/// Splits a file name into stem and extension (with its dot). Leading dots
/// do not start an extension, so `.bashrc` has none.
fn split_extension(name: &str) -> (&str, &str) {
    let body_start = name.len() - name.trim_start_matches('.').len();
    match name[body_start..].rfind('.') {
        Some(idx) => name.split_at(body_start + idx),
        None => (name, ""),
    }
}
