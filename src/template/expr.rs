//! Expression compiler for `{{ ... }}` and tag arguments
//!
//! Grammar: `expr := primary filter*`, `filter := '|' name (':' primary)?`,
//! `primary := string | number | true | false | null | undefined | path`.
//! Filter pipes must hug their neighbours: `x|upper` compiles, `x |upper`
//! and `x| upper` do not.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::context::Context;
use super::error::Result;
use super::render::Renderer;
use super::value::{SafeValue, Value};
use crate::filters::Filter;

lazy_static! {
    static ref STRING_RE: Regex =
        Regex::new(r#"(?s)\A(?:"((?:[^"\\]|\\.)*)"|'((?:[^'\\]|\\.)*)')"#).unwrap();
    static ref NUMBER_RE: Regex = Regex::new(r"\A-?\d+(?:\.\d+)?").unwrap();
    static ref PATH_RE: Regex =
        Regex::new(r"\A[A-Za-z_$][\w$]*(?:\.(?:[A-Za-z_$][\w$]*|\d+))*").unwrap();
    static ref FILTER_RE: Regex = Regex::new(r"\A\|([A-Za-z_]\w*)").unwrap();
    static ref ARG_RE: Regex =
        Regex::new(r#"(?:"(?:[^"\\]|\\.)*"|'(?:[^'\\]|\\.)*'|[^\s"'])+"#).unwrap();
}

/// Compile failure inside an expression; `offset` is relative to the
/// compiled text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileError {
    pub offset: usize,
    pub message: String,
}

impl CompileError {
    pub fn new(offset: usize, message: impl Into<String>) -> Self {
        Self {
            offset,
            message: message.into(),
        }
    }
}

/// Binary operators of the `if` grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    NotEq,
    StrictEq,
    StrictNotEq,
    Lt,
    Le,
    Gt,
    Ge,
}

/// Unary operators of the `if` grammar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

/// One `|name:arg` step, bound to its filter at compile time
#[derive(Debug, Clone)]
pub struct FilterCall {
    pub name: String,
    pub filter: Filter,
    pub arg: Option<Box<Expression>>,
}

impl FilterCall {
    pub fn apply(
        &self,
        value: &SafeValue,
        renderer: &mut Renderer<'_>,
        ctx: &Context,
    ) -> Result<SafeValue> {
        let arg = match &self.arg {
            Some(arg) => Some(arg.resolve(renderer, ctx)?),
            None => None,
        };
        self.filter.apply(value, arg.as_ref())
    }
}

/// Compiled expression
#[derive(Debug, Clone)]
pub enum Expression {
    /// Literal from the template source; always safe
    Constant(Value),
    /// Dotted variable path
    Variable(Vec<String>),
    /// `base|name:arg|...`, applied left to right
    Filter {
        base: Box<Expression>,
        calls: Vec<FilterCall>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expression>,
        rhs: Box<Expression>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expression>,
    },
}

impl Expression {
    pub fn is_constant(&self) -> bool {
        matches!(self, Expression::Constant(_))
    }

    /// Evaluate to a safe-tracking value
    pub fn resolve(&self, renderer: &mut Renderer<'_>, ctx: &Context) -> Result<SafeValue> {
        match self {
            Expression::Constant(value) => Ok(SafeValue::constant(value.clone())),
            Expression::Variable(path) => {
                let value = resolve_path(path, renderer, ctx)?;
                Ok(SafeValue::from_lookup(value))
            }
            Expression::Filter { base, calls } => {
                let mut value = base.resolve(renderer, ctx)?;
                for call in calls {
                    value = call.apply(&value, renderer, ctx)?;
                }
                Ok(value)
            }
            Expression::Binary { op, lhs, rhs } => {
                let left = lhs.resolve(renderer, ctx)?;
                match op {
                    BinaryOp::Or if left.raw.is_truthy() => Ok(left),
                    BinaryOp::And if !left.raw.is_truthy() => Ok(left),
                    BinaryOp::Or | BinaryOp::And => rhs.resolve(renderer, ctx),
                    op => {
                        let right = rhs.resolve(renderer, ctx)?;
                        let result = compare(*op, &left.raw, &right.raw);
                        Ok(SafeValue::new(Value::Bool(result)))
                    }
                }
            }
            Expression::Unary {
                op: UnaryOp::Not,
                operand,
            } => {
                let value = operand.resolve(renderer, ctx)?;
                Ok(SafeValue::new(Value::Bool(!value.raw.is_truthy())))
            }
        }
    }
}

fn compare(op: BinaryOp, left: &Value, right: &Value) -> bool {
    use std::cmp::Ordering::*;
    match op {
        BinaryOp::Eq => left.loose_eq(right),
        BinaryOp::NotEq => !left.loose_eq(right),
        BinaryOp::StrictEq => left.strict_eq(right),
        BinaryOp::StrictNotEq => !left.strict_eq(right),
        BinaryOp::Lt => left.compare(right) == Some(Less),
        BinaryOp::Le => matches!(left.compare(right), Some(Less | Equal)),
        BinaryOp::Gt => left.compare(right) == Some(Greater),
        BinaryOp::Ge => matches!(left.compare(right), Some(Greater | Equal)),
        BinaryOp::Or | BinaryOp::And => unreachable!("logical operators short-circuit"),
    }
}

/// Walk a dotted path through the context. Callables met along the way are
/// invoked; a null or undefined step ends the walk with undefined.
pub fn resolve_path(path: &[String], renderer: &mut Renderer<'_>, ctx: &Context) -> Result<Value> {
    let Some((head, rest)) = path.split_first() else {
        return Ok(Value::Undefined);
    };
    let mut current = ctx.get(head).cloned().unwrap_or_default();
    current = call_if_function(current, renderer)?;

    for segment in rest {
        if matches!(current, Value::Undefined | Value::Null) {
            return Ok(Value::Undefined);
        }
        current = current.get_property(segment)?.unwrap_or_default();
        current = call_if_function(current, renderer)?;
    }
    Ok(current)
}

fn call_if_function(value: Value, renderer: &mut Renderer<'_>) -> Result<Value> {
    match value {
        Value::Function(f) => f.call(renderer),
        other => Ok(other),
    }
}

/// Compile a complete expression; trailing input is an error.
/// `max_filters` bounds the length of the filter chain.
pub fn compile(
    text: &str,
    filters: &HashMap<String, Filter>,
    max_filters: usize,
) -> std::result::Result<Expression, CompileError> {
    let start = skip_whitespace(text, 0);
    let (expr, end) = compile_chain(text, start, filters, max_filters)?;
    let end = skip_whitespace(text, end);
    if end < text.len() {
        return Err(CompileError::new(
            end,
            format!("Unexpected '{}'", &text[end..]),
        ));
    }
    Ok(expr)
}

/// Compile `primary filter*` starting at `pos`, returning the expression and
/// the offset just past it
pub fn compile_chain(
    text: &str,
    pos: usize,
    filters: &HashMap<String, Filter>,
    max_filters: usize,
) -> std::result::Result<(Expression, usize), CompileError> {
    let (base, pos) = compile_primary(text, pos)?;
    let (calls, end) = compile_pipes(text, pos, filters, max_filters)?;
    if calls.is_empty() {
        return Ok((base, end));
    }
    let expr = Expression::Filter {
        base: Box::new(base),
        calls,
    };
    Ok((expr, end))
}

/// Compile a run of `|name:arg` steps starting at `pos`
pub fn compile_pipes(
    text: &str,
    mut pos: usize,
    filters: &HashMap<String, Filter>,
    max_filters: usize,
) -> std::result::Result<(Vec<FilterCall>, usize), CompileError> {
    let mut calls = Vec::new();

    while let Some(caps) = FILTER_RE.captures(&text[pos..]) {
        if calls.len() >= max_filters {
            return Err(CompileError::new(
                pos,
                format!("More than {} filters in one expression", max_filters),
            ));
        }
        let name = caps[1].to_string();
        let filter = filters
            .get(&name)
            .cloned()
            .ok_or_else(|| CompileError::new(pos, format!("Unknown filter '{}'", name)))?;
        pos += caps[0].len();

        let arg = if text[pos..].starts_with(':') {
            let (arg, end) = compile_primary(text, pos + 1)?;
            pos = end;
            Some(Box::new(arg))
        } else {
            None
        };

        calls.push(FilterCall { name, filter, arg });
    }
    Ok((calls, pos))
}

/// Compile a single literal or variable path
pub fn compile_primary(text: &str, pos: usize) -> std::result::Result<(Expression, usize), CompileError> {
    let rest = &text[pos..];

    if let Some(caps) = STRING_RE.captures(rest) {
        let body = caps.get(1).or_else(|| caps.get(2)).map(|m| m.as_str()).unwrap_or("");
        let end = pos + caps[0].len();
        return Ok((Expression::Constant(Value::String(unescape(body))), end));
    }

    if let Some(m) = NUMBER_RE.find(rest) {
        let n: f64 = m
            .as_str()
            .parse()
            .map_err(|_| CompileError::new(pos, format!("Invalid number '{}'", m.as_str())))?;
        return Ok((Expression::Constant(Value::Number(n)), pos + m.end()));
    }

    if let Some(m) = PATH_RE.find(rest) {
        let end = pos + m.end();
        let expr = match m.as_str() {
            "true" => Expression::Constant(Value::Bool(true)),
            "false" => Expression::Constant(Value::Bool(false)),
            "null" => Expression::Constant(Value::Null),
            "undefined" => Expression::Constant(Value::Undefined),
            path => Expression::Variable(path.split('.').map(str::to_string).collect()),
        };
        return Ok((expr, end));
    }

    let found = rest.chars().next().map(|c| c.to_string()).unwrap_or_else(|| "end of input".into());
    Err(CompileError::new(pos, format!("Expected a value, found '{}'", found)))
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('t') => out.push('\t'),
            Some('r') => out.push('\r'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

pub(crate) fn skip_whitespace(text: &str, pos: usize) -> usize {
    let rest = &text[pos..];
    pos + (rest.len() - rest.trim_start().len())
}

/// Split tag arguments on whitespace, keeping quoted strings together.
/// Returns each argument with its offset.
pub fn split_args(text: &str) -> Vec<(usize, &str)> {
    ARG_RE
        .find_iter(text)
        .map(|m| (m.start(), m.as_str()))
        .collect()
}
