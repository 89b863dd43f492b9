//! String filters

use std::collections::HashMap;

use super::{int_arg, Filter, Safety};
use crate::template::{Result, Value};

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert("addSlashes".into(), Filter::text(Safety::IfValue, add_slashes));
    filters.insert("capFirst".into(), Filter::text(Safety::IfValue, cap_first));
    filters.insert("countWords".into(), Filter::text(Safety::Never, count_words));
    filters.insert("cut".into(), Filter::text(Safety::IfValue, cut));
    filters.insert("hyphen".into(), Filter::text(Safety::IfValue, hyphen));
    filters.insert("toLowerCase".into(), Filter::text(Safety::IfValue, to_lower));
    filters.insert("lower".into(), Filter::text(Safety::IfValue, to_lower));
    filters.insert("toUpperCase".into(), Filter::text(Safety::IfValue, to_upper));
    filters.insert("upper".into(), Filter::text(Safety::IfValue, to_upper));
    filters.insert("toTitleCase".into(), Filter::text(Safety::IfValue, to_title));
    filters.insert("toString".into(), Filter::text(Safety::IfValue, to_string));
    filters.insert("truncateWords".into(), Filter::text(Safety::IfValue, truncate_words));
    filters.insert("pluralize".into(), Filter::raw(Safety::IfArg, pluralize));
}

fn add_slashes(s: &str, _arg: Option<&Value>) -> Result<Value> {
    let out = s
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\'', "\\'");
    Ok(Value::String(out))
}

fn cap_first(s: &str, _arg: Option<&Value>) -> Result<Value> {
    let mut chars = s.chars();
    let out = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(Value::String(out))
}

fn count_words(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::from(s.split_whitespace().count()))
}

fn cut(s: &str, arg: Option<&Value>) -> Result<Value> {
    let needle = arg.map(|a| a.to_output_string()).unwrap_or_default();
    if needle.is_empty() {
        return Ok(Value::String(s.to_string()));
    }
    Ok(Value::String(s.replace(&needle, "")))
}

fn hyphen(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(slug::slugify(s)))
}

fn to_lower(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(s.to_lowercase()))
}

fn to_upper(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(s.to_uppercase()))
}

fn to_title(s: &str, _arg: Option<&Value>) -> Result<Value> {
    let mut out = String::with_capacity(s.len());
    let mut at_word_start = true;
    for c in s.chars() {
        if c.is_alphanumeric() || c == '\'' {
            if at_word_start {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
            at_word_start = false;
        } else {
            out.push(c);
            at_word_start = true;
        }
    }
    Ok(Value::String(out))
}

fn to_string(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(s.to_string()))
}

/// Truncate to a number of words, appending an ellipsis when cut
fn truncate_words(s: &str, arg: Option<&Value>) -> Result<Value> {
    let Some(limit) = int_arg(arg) else {
        return Ok(Value::String(s.to_string()));
    };
    let limit = limit.max(0) as usize;
    let words: Vec<&str> = s.split_whitespace().collect();
    if words.len() <= limit {
        return Ok(Value::String(s.to_string()));
    }
    let mut out = words[..limit].join(" ");
    out.push_str(" ...");
    Ok(Value::String(out))
}

/// `"s"` by default; `"es"` gives a plural suffix only; `"y,ies"` gives both
fn pluralize(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let suffixes = arg.map(|a| a.to_output_string()).unwrap_or_else(|| "s".into());
    let (singular, plural) = match suffixes.split_once(',') {
        Some((one, many)) if !many.contains(',') => (one.to_string(), many.to_string()),
        Some(_) => return Ok(Value::String(String::new())),
        None => (String::new(), suffixes),
    };
    let count = match value {
        Value::Array(_) | Value::Object(_) => Some(value.len() as f64),
        other => other.as_number(),
    };
    let out = match count {
        Some(n) if n == 1.0 => singular,
        Some(_) => plural,
        None => String::new(),
    };
    Ok(Value::String(out))
}
