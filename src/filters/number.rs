//! Numeric filters

use std::collections::HashMap;

use super::{int_arg, Filter, Safety};
use crate::template::{Result, Value};

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert("add".into(), Filter::raw(Safety::IfBoth, add));
    filters.insert("divisibleBy".into(), Filter::raw(Safety::Never, divisible_by));
    filters.insert("getDigit".into(), Filter::raw(Safety::IfValue, get_digit));
    filters.insert("formatFileSize".into(), Filter::raw(Safety::Always, format_file_size));
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) | Value::Bool(_) => true,
        Value::String(s) | Value::Markup(s) => s.trim().parse::<f64>().is_ok(),
        _ => false,
    }
}

/// Numeric addition when both sides are numbers, concatenation otherwise
fn add(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let arg = arg.cloned().unwrap_or_default();
    Ok(match (value, &arg) {
        (Value::Array(a), Value::Array(b)) => {
            Value::Array(a.iter().chain(b.iter()).cloned().collect())
        }
        (a, b) if is_numeric(a) && is_numeric(b) => Value::Number(
            a.as_number().unwrap_or_default() + b.as_number().unwrap_or_default(),
        ),
        (a, b) => Value::String(format!("{}{}", a.to_output_string(), b.to_output_string())),
    })
}

fn divisible_by(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let divisible = match (value.as_number(), arg.and_then(|a| a.as_number())) {
        (Some(n), Some(d)) if d != 0.0 => n % d == 0.0,
        _ => false,
    };
    Ok(Value::Bool(divisible))
}

/// Nth digit from the right, 1-based. Non-integers pass through unchanged.
fn get_digit(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let (Some(n), Some(position)) = (value.as_number(), int_arg(arg)) else {
        return Ok(value.clone());
    };
    if n.fract() != 0.0 || position < 1 {
        return Ok(value.clone());
    }
    let digits = (n.abs() as i64).to_string();
    let position = position as usize;
    if position > digits.len() {
        return Ok(Value::Number(0.0));
    }
    let digit = digits.as_bytes()[digits.len() - position] - b'0';
    Ok(Value::Number(digit as f64))
}

/// Human readable size, e.g. `"13 KB"`, `"4.1 MB"`
fn format_file_size(value: &Value, _arg: Option<&Value>) -> Result<Value> {
    let bytes = value.as_number().unwrap_or(0.0);
    const UNITS: [&str; 5] = ["KB", "MB", "GB", "TB", "PB"];

    if bytes.abs() < 1024.0 {
        let n = bytes as i64;
        let unit = if n == 1 { "byte" } else { "bytes" };
        return Ok(Value::String(format!("{} {}", n, unit)));
    }

    let mut size = bytes / 1024.0;
    let mut unit = UNITS[0];
    for next in &UNITS[1..] {
        if size.abs() < 1024.0 {
            break;
        }
        size /= 1024.0;
        unit = next;
    }
    let formatted = format!("{:.1}", size);
    let formatted = formatted.strip_suffix(".0").unwrap_or(&formatted);
    Ok(Value::String(format!("{} {}", formatted, unit)))
}
