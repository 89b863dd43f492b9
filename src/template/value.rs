//! Runtime values and the safety wrapper used for auto-escaping

use chrono::{DateTime, FixedOffset};
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use super::error::{Result, TemplateError};
use super::render::Renderer;
use crate::filters::html::escape_html;

/// Application-defined value with a custom lookup hook.
///
/// Path resolution asks `get` before anything else, so an object can expose
/// computed attributes. Returning `Ok(None)` makes the segment undefined.
pub trait Object: fmt::Debug + Send + Sync {
    /// Look up an attribute
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Safe-to-stringify marker: when true, output is never escaped
    fn is_safe(&self) -> bool {
        false
    }

    /// String form used for output
    fn render(&self) -> String {
        "[object Object]".to_string()
    }

    /// Items produced when the object is looped over
    fn iterate(&self) -> Option<Vec<Value>> {
        None
    }
}

type FunctionImpl = dyn Fn(&mut Renderer<'_>) -> Result<Value> + Send + Sync;

/// Zero-argument callable. Invoked whenever path resolution reaches it.
#[derive(Clone)]
pub struct Function(Arc<FunctionImpl>);

impl Function {
    pub fn new<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Function(Arc::new(move |_: &mut Renderer<'_>| f()))
    }

    /// Callable that needs the active renderer (used for `super`)
    pub(crate) fn with_renderer<F>(f: F) -> Self
    where
        F: Fn(&mut Renderer<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        Function(Arc::new(f))
    }

    pub fn call(&self, renderer: &mut Renderer<'_>) -> Result<Value> {
        (self.0)(renderer)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Function")
    }
}

/// A value in the render context
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    /// String already marked safe for output
    Markup(String),
    Date(DateTime<FixedOffset>),
    Array(Vec<Value>),
    Object(IndexMap<String, Value>),
    Function(Function),
    Dynamic(Arc<dyn Object>),
}

impl Value {
    pub fn function<F>(f: F) -> Self
    where
        F: Fn() -> Result<Value> + Send + Sync + 'static,
    {
        Value::Function(Function::new(f))
    }

    pub fn dynamic<O: Object + 'static>(object: O) -> Self {
        Value::Dynamic(Arc::new(object))
    }

    pub fn is_undefined(&self) -> bool {
        matches!(self, Value::Undefined)
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Booleans, numbers and dates never need escaping
    pub fn is_intrinsically_safe(&self) -> bool {
        matches!(
            self,
            Value::Bool(_) | Value::Number(_) | Value::Date(_) | Value::Markup(_)
        )
    }

    /// Convert to string for output
    pub fn to_output_string(&self) -> String {
        match self {
            Value::Undefined | Value::Null => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Number(n) => format_number(*n),
            Value::String(s) | Value::Markup(s) => s.clone(),
            Value::Date(d) => d.format("%Y-%m-%dT%H:%M:%S%:z").to_string(),
            Value::Array(arr) => arr
                .iter()
                .map(|v| v.to_output_string())
                .collect::<Vec<_>>()
                .join(","),
            Value::Object(_) => "[object Object]".to_string(),
            Value::Function(_) => "[function]".to_string(),
            Value::Dynamic(obj) => obj.render(),
        }
    }

    /// Check if the value is truthy
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Undefined | Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => *n != 0.0 && !n.is_nan(),
            Value::String(s) | Value::Markup(s) => !s.is_empty(),
            Value::Array(arr) => !arr.is_empty(),
            Value::Object(obj) => !obj.is_empty(),
            Value::Date(_) | Value::Function(_) | Value::Dynamic(_) => true,
        }
    }

    /// Numeric coercion. `None` stands for NaN.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) if !n.is_nan() => Some(*n),
            Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Value::Null => Some(0.0),
            Value::String(s) | Value::Markup(s) => {
                let s = s.trim();
                if s.is_empty() {
                    Some(0.0)
                } else {
                    s.parse::<f64>().ok()
                }
            }
            Value::Date(d) => Some(d.timestamp_millis() as f64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) | Value::Markup(s) => Some(s),
            _ => None,
        }
    }

    /// Number of items (array), characters (string) or keys (object)
    pub fn len(&self) -> usize {
        match self {
            Value::Array(arr) => arr.len(),
            Value::String(s) | Value::Markup(s) => s.chars().count(),
            Value::Object(obj) => obj.len(),
            _ => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Get a property. Misses resolve to `None`, never to an error; only a
    /// lookup hook can fail.
    pub fn get_property(&self, key: &str) -> Result<Option<Value>> {
        let found = match self {
            Value::Object(obj) => obj.get(key).cloned(),
            Value::Array(arr) => match key.parse::<usize>() {
                Ok(idx) => arr.get(idx).cloned(),
                Err(_) if key == "length" => Some(Value::Number(arr.len() as f64)),
                Err(_) => None,
            },
            Value::String(s) | Value::Markup(s) => match key.parse::<usize>() {
                Ok(idx) => s.chars().nth(idx).map(|c| Value::String(c.to_string())),
                Err(_) if key == "length" => Some(Value::Number(s.chars().count() as f64)),
                Err(_) => None,
            },
            Value::Dynamic(obj) => obj.get(key)?,
            _ => None,
        };
        Ok(found)
    }

    /// Items a `for` loop walks over
    pub fn iterate(&self) -> Result<Vec<Value>> {
        match self {
            Value::Undefined | Value::Null => Ok(Vec::new()),
            Value::Array(arr) => Ok(arr.clone()),
            Value::String(s) => Ok(s.chars().map(|c| Value::String(c.to_string())).collect()),
            Value::Markup(s) => Ok(s.chars().map(|c| Value::Markup(c.to_string())).collect()),
            Value::Object(obj) => Ok(obj.keys().map(|k| Value::String(k.clone())).collect()),
            Value::Dynamic(obj) => obj.iterate().ok_or_else(|| {
                TemplateError::Render(format!("'{}' is not iterable", obj.render()))
            }),
            other => Err(TemplateError::Render(format!(
                "'{}' is not iterable",
                other.to_output_string()
            ))),
        }
    }

    /// Strict equality (`===`)
    pub fn strict_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined, Value::Undefined) | (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Number(a), Value::Number(b)) => a == b,
            (
                Value::String(a) | Value::Markup(a),
                Value::String(b) | Value::Markup(b),
            ) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.strict_eq(y))
            }
            (Value::Object(a), Value::Object(b)) => {
                a.len() == b.len()
                    && a.iter()
                        .all(|(k, v)| b.get(k).map(|w| v.strict_eq(w)).unwrap_or(false))
            }
            (Value::Dynamic(a), Value::Dynamic(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    /// Coercing equality (`==`)
    pub fn loose_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Undefined | Value::Null, Value::Undefined | Value::Null) => true,
            (Value::Undefined | Value::Null, _) | (_, Value::Undefined | Value::Null) => false,
            (
                Value::String(a) | Value::Markup(a),
                Value::String(b) | Value::Markup(b),
            ) => a == b,
            (Value::Number(_) | Value::Bool(_) | Value::String(_) | Value::Markup(_), _)
            | (_, Value::Number(_) | Value::Bool(_)) => {
                match (self.as_number(), other.as_number()) {
                    (Some(a), Some(b)) => a == b,
                    _ => false,
                }
            }
            _ => self.strict_eq(other),
        }
    }

    /// Relational comparison. Strings compare lexically, everything else
    /// numerically; `None` when the operands are not comparable.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (
                Value::String(a) | Value::Markup(a),
                Value::String(b) | Value::Markup(b),
            ) => Some(a.cmp(b)),
            _ => {
                let a = self.as_number()?;
                let b = other.as_number()?;
                a.partial_cmp(&b)
            }
        }
    }

    /// Convert from serde_json::Value
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => Value::String(s.clone()),
            serde_json::Value::Array(arr) => Value::Array(arr.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(obj) => {
                let mut map = IndexMap::new();
                for (k, v) in obj {
                    map.insert(k.clone(), Value::from_json(v));
                }
                Value::Object(map)
            }
        }
    }

    /// Convert to serde_json::Value. Functions and dynamic objects become
    /// their string form.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Undefined | Value::Null => serde_json::Value::Null,
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Number(n) => serde_json::Number::from_f64(*n)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Value::Array(arr) => serde_json::Value::Array(arr.iter().map(|v| v.to_json()).collect()),
            Value::Object(obj) => {
                let map: serde_json::Map<String, serde_json::Value> =
                    obj.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
                serde_json::Value::Object(map)
            }
            other => serde_json::Value::String(other.to_output_string()),
        }
    }
}

fn format_number(n: f64) -> String {
    if n.is_nan() {
        "NaN".to_string()
    } else if n.is_infinite() {
        let text = if n > 0.0 { "Infinity" } else { "-Infinity" };
        text.to_string()
    } else if n.fract() == 0.0 && n.abs() < 1e15 {
        (n as i64).to_string()
    } else {
        n.to_string()
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<usize> for Value {
    fn from(n: usize) -> Self {
        Value::Number(n as f64)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Array(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<DateTime<FixedOffset>> for Value {
    fn from(d: DateTime<FixedOffset>) -> Self {
        Value::Date(d)
    }
}

impl From<IndexMap<String, Value>> for Value {
    fn from(map: IndexMap<String, Value>) -> Self {
        Value::Object(map)
    }
}

/// A value plus the "safe from escaping" bit
#[derive(Debug, Clone, Default)]
pub struct SafeValue {
    pub raw: Value,
    pub safe: bool,
}

impl SafeValue {
    /// Wrap a computed value: safe only if intrinsically safe
    pub fn new(raw: Value) -> Self {
        let safe = raw.is_intrinsically_safe();
        Self::with_safety(raw, safe)
    }

    pub fn with_safety(raw: Value, safe: bool) -> Self {
        match raw {
            Value::Markup(s) => SafeValue {
                raw: Value::String(s),
                safe: true,
            },
            raw => SafeValue { raw, safe },
        }
    }

    /// Template literals are always safe
    pub fn constant(raw: Value) -> Self {
        Self::with_safety(raw, true)
    }

    /// Result of a variable lookup: safe only when the value carries the
    /// marker or there is nothing to print
    pub fn from_lookup(raw: Value) -> Self {
        let safe = match &raw {
            Value::Undefined | Value::Null | Value::Markup(_) => true,
            Value::Dynamic(obj) => obj.is_safe(),
            _ => false,
        };
        Self::with_safety(raw, safe)
    }

    /// Output form: verbatim when safe, HTML-escaped otherwise
    pub fn render(&self) -> String {
        let text = self.raw.to_output_string();
        if self.safe {
            text
        } else {
            escape_html(&text)
        }
    }

    /// Back to a plain value, keeping the safe bit for strings
    pub fn into_value(self) -> Value {
        match self.raw {
            Value::String(s) if self.safe => Value::Markup(s),
            raw => raw,
        }
    }
}

/// Mark a value as safe from escaping
pub fn mark_safe<V: Into<Value>>(value: V) -> SafeValue {
    SafeValue::with_safety(value.into(), true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Html;

    impl Object for Html {
        fn get(&self, _key: &str) -> Result<Option<Value>> {
            Ok(None)
        }

        fn is_safe(&self) -> bool {
            true
        }

        fn render(&self) -> String {
            "<b>hi</b>".to_string()
        }
    }

    #[test]
    fn test_output_string() {
        assert_eq!(Value::Number(3.0).to_output_string(), "3");
        assert_eq!(Value::Number(2.5).to_output_string(), "2.5");
        assert_eq!(Value::Null.to_output_string(), "");
        assert_eq!(Value::from(vec![1, 2]).to_output_string(), "1,2");
    }

    #[test]
    fn test_truthiness() {
        assert!(!Value::Undefined.is_truthy());
        assert!(!Value::from("").is_truthy());
        assert!(!Value::Array(vec![]).is_truthy());
        assert!(Value::from("x").is_truthy());
        assert!(!Value::Number(f64::NAN).is_truthy());
    }

    #[test]
    fn test_equality() {
        assert!(Value::from("1").loose_eq(&Value::Number(1.0)));
        assert!(!Value::from("1").strict_eq(&Value::Number(1.0)));
        assert!(Value::Null.loose_eq(&Value::Undefined));
        assert!(!Value::Null.strict_eq(&Value::Undefined));
        assert!(Value::Bool(true).loose_eq(&Value::Number(1.0)));
        assert!(!Value::Null.loose_eq(&Value::Number(0.0)));
    }

    #[test]
    fn test_compare() {
        assert_eq!(
            Value::from("a").compare(&Value::from("b")),
            Some(Ordering::Less)
        );
        assert_eq!(
            Value::from("10").compare(&Value::Number(9.0)),
            Some(Ordering::Greater)
        );
        assert_eq!(Value::from("x").compare(&Value::Number(1.0)), None);
    }

    #[test]
    fn test_property_lookup() {
        let arr = Value::from(vec!["a", "b"]);
        assert!(matches!(arr.get_property("1").unwrap(), Some(Value::String(s)) if s == "b"));
        assert!(arr.get_property("5").unwrap().is_none());
        assert!(matches!(arr.get_property("length").unwrap(), Some(Value::Number(n)) if n == 2.0));
    }

    #[test]
    fn test_safety() {
        let v = SafeValue::from_lookup(Value::from("<a>"));
        assert!(!v.safe);
        assert_eq!(v.render(), "&lt;a&gt;");

        let v = SafeValue::from_lookup(Value::dynamic(Html));
        assert!(v.safe);
        assert_eq!(v.render(), "<b>hi</b>");

        let v = mark_safe("<a>");
        assert_eq!(v.render(), "<a>");
        assert!(matches!(v.into_value(), Value::Markup(_)));

        assert!(SafeValue::new(Value::Number(1.0)).safe);
        assert!(!SafeValue::new(Value::from("x")).safe);
    }

    #[test]
    fn test_iterate_keeps_safe_bit() {
        let chars = mark_safe("<>").into_value().iterate().unwrap();
        assert!(chars.iter().all(|c| matches!(c, Value::Markup(_))));
        assert!(matches!(Value::from("ab").iterate().unwrap()[0], Value::String(_)));

        let env = crate::template::Environment::new();
        let mut ctx = crate::template::Context::new();
        ctx.set("s", mark_safe("<>").into_value());
        ctx.set("t", "<>");
        let out = env
            .render_str("{% for c in s %}{{ c }}{% endfor %}|{% for c in t %}{{ c }}{% endfor %}", &ctx)
            .unwrap();
        assert_eq!(out, "<>|&lt;&gt;");
    }
}
