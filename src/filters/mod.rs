//! Filters available in `{{ value|filter:arg }}` expressions
//!
//! A filter is a plain function plus two policies: what it accepts (the raw
//! value, its string form, or the full [`SafeValue`]) and whether its result
//! is safe from escaping.

mod date;
pub mod html;
mod list;
mod logic;
mod number;
mod string;
pub(crate) mod url;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::template::{Result, SafeValue, Value};

pub use date::{time_since, time_until};
pub use html::{escape_html, strip_html};

/// When a filter's raw result may skip escaping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Safety {
    /// Result is always safe
    Always,
    /// Safe iff the input value was safe
    IfValue,
    /// Safe iff the argument was safe (or absent)
    IfArg,
    /// Safe iff both input and argument were safe
    IfBoth,
    /// Safe only when the result is intrinsically safe (booleans, numbers, dates)
    Never,
}

impl Safety {
    fn resolve(self, value_safe: bool, arg_safe: bool) -> bool {
        match self {
            Safety::Always => true,
            Safety::IfValue => value_safe,
            Safety::IfArg => arg_safe,
            Safety::IfBoth => value_safe && arg_safe,
            Safety::Never => false,
        }
    }
}

type RawFn = dyn Fn(&Value, Option<&Value>) -> Result<Value> + Send + Sync;
type TextFn = dyn Fn(&str, Option<&Value>) -> Result<Value> + Send + Sync;
type WrappedFn = dyn Fn(&SafeValue, Option<&SafeValue>) -> Result<SafeValue> + Send + Sync;

/// What a filter function receives
#[derive(Clone)]
pub enum Accept {
    /// The unwrapped raw value
    Raw(Arc<RawFn>),
    /// The value's string form
    Text(Arc<TextFn>),
    /// The full safe-tracking value; the function decides safety itself
    Wrapped(Arc<WrappedFn>),
}

/// A named, pipeable transformation
#[derive(Clone)]
pub struct Filter {
    accept: Accept,
    safety: Safety,
}

impl Filter {
    pub fn raw<F>(safety: Safety, f: F) -> Self
    where
        F: Fn(&Value, Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            accept: Accept::Raw(Arc::new(f)),
            safety,
        }
    }

    pub fn text<F>(safety: Safety, f: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            accept: Accept::Text(Arc::new(f)),
            safety,
        }
    }

    pub fn wrapped<F>(f: F) -> Self
    where
        F: Fn(&SafeValue, Option<&SafeValue>) -> Result<SafeValue> + Send + Sync + 'static,
    {
        Self {
            accept: Accept::Wrapped(Arc::new(f)),
            safety: Safety::Never,
        }
    }

    pub fn safety(&self) -> Safety {
        self.safety
    }

    /// Apply to a value and optional argument
    pub fn apply(&self, value: &SafeValue, arg: Option<&SafeValue>) -> Result<SafeValue> {
        let raw = match &self.accept {
            Accept::Wrapped(f) => return f(value, arg),
            Accept::Raw(f) => f(&value.raw, arg.map(|a| &a.raw))?,
            Accept::Text(f) => f(&value.raw.to_output_string(), arg.map(|a| &a.raw))?,
        };
        let arg_safe = arg.map(|a| a.safe).unwrap_or(true);
        let safe = self.safety.resolve(value.safe, arg_safe) || raw.is_intrinsically_safe();
        Ok(SafeValue::with_safety(raw, safe))
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let accept = match self.accept {
            Accept::Raw(_) => "raw",
            Accept::Text(_) => "text",
            Accept::Wrapped(_) => "wrapped",
        };
        f.debug_struct("Filter")
            .field("accept", &accept)
            .field("safety", &self.safety)
            .finish()
    }
}

/// The built-in filter table
pub fn builtin_filters() -> HashMap<String, Filter> {
    let mut filters = HashMap::new();
    html::register(&mut filters);
    string::register(&mut filters);
    list::register(&mut filters);
    logic::register(&mut filters);
    number::register(&mut filters);
    date::register(&mut filters);
    url::register(&mut filters);
    filters
}

/// Argument as an integer, if it is numeric
pub(crate) fn int_arg(arg: Option<&Value>) -> Option<i64> {
    arg.and_then(|a| a.as_number()).map(|n| n as i64)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_names() {
        let filters = builtin_filters();
        for name in [
            "add",
            "addSlashes",
            "breakLines",
            "capFirst",
            "countWords",
            "cut",
            "default",
            "defaultIfNull",
            "defaultIfUndefined",
            "divisibleBy",
            "encodeURI",
            "encodeURIComponent",
            "escape",
            "escapeJS",
            "first",
            "forceEscape",
            "formatFileSize",
            "getDigit",
            "hyphen",
            "items",
            "join",
            "last",
            "numberLines",
            "paragraph",
            "pluralize",
            "removeTags",
            "safe",
            "slice",
            "sortObjects",
            "sortObjectsReversed",
            "stripTags",
            "timeSince",
            "timeUntil",
            "toLowerCase",
            "toString",
            "toTitleCase",
            "toUpperCase",
            "truncateWords",
            "yesno",
            "upper",
            "lower",
            "length",
            "date",
        ] {
            assert!(filters.contains_key(name), "missing filter {}", name);
        }
    }

    #[test]
    fn test_safety_policies() {
        let upper = Filter::text(Safety::IfValue, |s, _| Ok(Value::String(s.to_uppercase())));
        let unsafe_in = SafeValue::with_safety(Value::from("<a>"), false);
        let safe_in = SafeValue::with_safety(Value::from("<a>"), true);
        assert!(!upper.apply(&unsafe_in, None).unwrap().safe);
        assert!(upper.apply(&safe_in, None).unwrap().safe);

        let pick_arg = Filter::raw(Safety::IfArg, |_, arg| Ok(arg.cloned().unwrap_or_default()));
        let arg = SafeValue::constant(Value::from("x"));
        assert!(pick_arg.apply(&unsafe_in, Some(&arg)).unwrap().safe);
    }

    #[test]
    fn test_intrinsically_safe_results() {
        let count = Filter::raw(Safety::Never, |v, _| Ok(Value::from(v.len())));
        let out = count
            .apply(&SafeValue::with_safety(Value::from("abc"), false), None)
            .unwrap();
        assert!(out.safe);
        assert_eq!(out.render(), "3");
    }
}
