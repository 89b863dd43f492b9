//! Fallback and boolean-mapping filters

use std::collections::HashMap;

use super::{Filter, Safety};
use crate::template::{Result, SafeValue, Value};

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert(
        "default".into(),
        Filter::wrapped(|v, arg| Ok(fallback(v, arg, !v.raw.is_truthy()))),
    );
    filters.insert(
        "defaultIfNull".into(),
        Filter::wrapped(|v, arg| Ok(fallback(v, arg, v.raw.is_null()))),
    );
    filters.insert(
        "defaultIfUndefined".into(),
        Filter::wrapped(|v, arg| Ok(fallback(v, arg, v.raw.is_undefined()))),
    );
    filters.insert("yesno".into(), Filter::raw(Safety::IfArg, yesno));
}

fn fallback(value: &SafeValue, arg: Option<&SafeValue>, use_arg: bool) -> SafeValue {
    if use_arg {
        arg.cloned().unwrap_or_default()
    } else {
        value.clone()
    }
}

/// Map truthy / falsy / null to `"yes,no,maybe"` style choices
fn yesno(value: &Value, arg: Option<&Value>) -> Result<Value> {
    let choices = arg
        .map(|a| a.to_output_string())
        .unwrap_or_else(|| "yes,no,maybe".into());
    let parts: Vec<&str> = choices.split(',').collect();
    if parts.len() < 2 {
        return Ok(value.clone());
    }
    let (yes, no) = (parts[0], parts[1]);
    let maybe = parts.get(2).copied().unwrap_or(no);
    let picked = match value {
        Value::Null | Value::Undefined => maybe,
        v if v.is_truthy() => yes,
        _ => no,
    };
    Ok(Value::from(picked))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_family() {
        let filters = super::super::builtin_filters();
        let arg = SafeValue::constant(Value::from("n/a"));
        let apply = |name: &str, v: Value| {
            filters[name]
                .apply(&SafeValue::from_lookup(v), Some(&arg))
                .unwrap()
                .render()
        };
        assert_eq!(apply("default", Value::from("")), "n/a");
        assert_eq!(apply("default", Value::from("x")), "x");
        assert_eq!(apply("defaultIfNull", Value::Null), "n/a");
        assert_eq!(apply("defaultIfNull", Value::Undefined), "");
        assert_eq!(apply("defaultIfUndefined", Value::Undefined), "n/a");
        assert_eq!(apply("defaultIfUndefined", Value::from(0)), "0");
    }

    #[test]
    fn test_yesno() {
        let render = |v: Value, arg: Option<&str>| {
            let arg = arg.map(Value::from);
            yesno(&v, arg.as_ref()).unwrap().to_output_string()
        };
        assert_eq!(render(Value::Bool(true), None), "yes");
        assert_eq!(render(Value::Bool(false), None), "no");
        assert_eq!(render(Value::Null, None), "maybe");
        assert_eq!(render(Value::Null, Some("on,off")), "off");
        assert_eq!(render(Value::from(1), Some("on,off")), "on");
    }
}
