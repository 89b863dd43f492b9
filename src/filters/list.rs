//! Sequence filters: first/last, joins, slicing and sorting

use std::cmp::Ordering;
use std::collections::HashMap;

use super::{Filter, Safety};
use crate::template::{Result, Value};

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert("first".into(), Filter::raw(Safety::IfValue, first));
    filters.insert("last".into(), Filter::raw(Safety::IfValue, last));
    filters.insert("join".into(), Filter::raw(Safety::IfBoth, join));
    filters.insert("items".into(), Filter::raw(Safety::IfValue, items));
    filters.insert("slice".into(), Filter::raw(Safety::IfValue, slice));
    filters.insert("length".into(), Filter::raw(Safety::Never, length));
    filters.insert(
        "sortObjects".into(),
        Filter::raw(Safety::IfValue, |v, arg| sort_objects(v, arg, false)),
    );
    filters.insert(
        "sortObjectsReversed".into(),
        Filter::raw(Safety::IfValue, |v, arg| sort_objects(v, arg, true)),
    );
}

fn first(value: &Value, _arg: Option<&Value>) -> Result<Value> {
    Ok(match value {
        Value::Array(arr) => arr.first().cloned().unwrap_or_default(),
        Value::String(s) | Value::Markup(s) => s
            .chars()
            .next()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default(),
        _ => Value::Undefined,
    })
}

fn last(value: &Value, _arg: Option<&Value>) -> Result<Value> {
    Ok(match value {
        Value::Array(arr) => arr.last().cloned().unwrap_or_default(),
        Value::String(s) | Value::Markup(s) => s
            .chars()
            .last()
            .map(|c| Value::String(c.to_string()))
            .unwrap_or_default(),
        _ => Value::Undefined,
    })
}

fn join(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let sep = arg.map(|a| a.to_output_string()).unwrap_or_else(|| ",".into());
    Ok(match value {
        Value::Array(arr) => Value::String(
            arr.iter()
                .map(|v| v.to_output_string())
                .collect::<Vec<_>>()
                .join(&sep),
        ),
        other => other.clone(),
    })
}

fn items(value: &Value, _arg: Option<&Value>) -> Result<Value> {
    Ok(match value {
        Value::Object(obj) => Value::Array(
            obj.iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
        ),
        Value::Array(arr) => Value::Array(
            arr.iter()
                .enumerate()
                .map(|(i, v)| Value::Array(vec![Value::from(i), v.clone()]))
                .collect(),
        ),
        _ => Value::Array(Vec::new()),
    })
}

fn length(value: &Value, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::from(value.len()))
}

/// Python-style `start:end` slice with negative indices; a single number
/// is the end bound
fn slice(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let spec = arg.map(|a| a.to_output_string()).unwrap_or_default();
    let (start, end) = match spec.split_once(':') {
        Some((s, e)) => (parse_bound(s), parse_bound(e)),
        None => (None, parse_bound(&spec)),
    };
    Ok(match value {
        Value::Array(arr) => {
            let (from, to) = bounds(arr.len(), start, end);
            Value::Array(arr[from..to].to_vec())
        }
        Value::String(s) | Value::Markup(s) => {
            let chars: Vec<char> = s.chars().collect();
            let (from, to) = bounds(chars.len(), start, end);
            Value::String(chars[from..to].iter().collect())
        }
        other => other.clone(),
    })
}

fn parse_bound(s: &str) -> Option<i64> {
    s.trim().parse().ok()
}

fn bounds(len: usize, start: Option<i64>, end: Option<i64>) -> (usize, usize) {
    let resolve = |i: i64| -> usize {
        if i < 0 {
            (len as i64 + i).max(0) as usize
        } else {
            (i as usize).min(len)
        }
    };
    let from = start.map(resolve).unwrap_or(0);
    let to = end.map(resolve).unwrap_or(len);
    (from, to.max(from))
}

fn sort_objects(value: &Value, arg: Option<&Value>, reversed: bool) -> Result<Value> {
    let Value::Array(arr) = value else {
        return Ok(value.clone());
    };
    let key = arg.map(|a| a.to_output_string()).unwrap_or_default();
    let mut keyed = Vec::with_capacity(arr.len());
    for item in arr {
        let sort_key = item.get_property(&key)?.unwrap_or_default();
        keyed.push((sort_key, item.clone()));
    }
    keyed.sort_by(|a, b| a.0.compare(&b.0).unwrap_or(Ordering::Equal));
    if reversed {
        keyed.reverse();
    }
    Ok(Value::Array(keyed.into_iter().map(|(_, v)| v).collect()))
}
