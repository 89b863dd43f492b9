//! HTML filters: escaping, tag stripping and line-break markup

use lazy_static::lazy_static;
use regex::{Regex, RegexBuilder};
use std::collections::HashMap;

use super::{Filter, Safety};
use crate::template::{Result, SafeValue, TemplateError, Value};

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"(?s)<[^>]*?>").unwrap();
    static ref PARAGRAPH_BREAK_RE: Regex = Regex::new(r"\n{2,}").unwrap();
}

pub(super) fn register(filters: &mut HashMap<String, Filter>) {
    filters.insert("escape".into(), Filter::wrapped(escape));
    filters.insert("forceEscape".into(), Filter::wrapped(force_escape));
    filters.insert("safe".into(), Filter::wrapped(safe));
    filters.insert("escapeJS".into(), Filter::text(Safety::Always, escape_js));
    filters.insert("stripTags".into(), Filter::text(Safety::IfValue, strip_tags));
    filters.insert("removeTags".into(), Filter::text(Safety::IfValue, remove_tags));
    filters.insert("breakLines".into(), Filter::wrapped(break_lines));
    filters.insert("paragraph".into(), Filter::wrapped(paragraph));
    filters.insert("numberLines".into(), Filter::wrapped(number_lines));
}

/// Escape HTML special characters
pub fn escape_html(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&#39;")
}

/// Strip HTML tags from a string
pub fn strip_html(s: &str) -> String {
    TAG_RE.replace_all(s, "").into_owned()
}

fn escape(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    if value.safe {
        return Ok(value.clone());
    }
    Ok(markup(escape_html(&value.raw.to_output_string())))
}

fn force_escape(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    Ok(markup(escape_html(&value.raw.to_output_string())))
}

fn safe(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    Ok(SafeValue::with_safety(value.raw.clone(), true))
}

fn escape_js(s: &str, _arg: Option<&Value>) -> Result<Value> {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' | '\'' | '"' | '>' | '<' | '&' | '=' | '-' | ';' | '`' | '\u{2028}'
            | '\u{2029}' => out.push_str(&format!("\\u{:04X}", c as u32)),
            c if (c as u32) < 32 => out.push_str(&format!("\\u{:04X}", c as u32)),
            c => out.push(c),
        }
    }
    Ok(Value::String(out))
}

fn strip_tags(s: &str, _arg: Option<&Value>) -> Result<Value> {
    Ok(Value::String(strip_html(s)))
}

fn remove_tags(s: &str, arg: Option<&Value>) -> Result<Value> {
    let names = arg.map(|a| a.to_output_string()).unwrap_or_default();
    let names: Vec<String> = names.split_whitespace().map(regex::escape).collect();
    if names.is_empty() {
        return Ok(Value::String(s.to_string()));
    }
    let pattern = format!(r"<\s*/?\s*(?:{})\b[^>]*?>", names.join("|"));
    let re = RegexBuilder::new(&pattern)
        .case_insensitive(true)
        .build()
        .map_err(TemplateError::custom)?;
    Ok(Value::String(re.replace_all(s, "").into_owned()))
}

fn break_lines(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    let text = normalize_newlines(&value.render());
    Ok(markup(text.replace('\n', "<br>")))
}

fn paragraph(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    let text = normalize_newlines(&value.render());
    let paragraphs: Vec<String> = PARAGRAPH_BREAK_RE
        .split(text.trim())
        .map(|p| format!("<p>{}</p>", p.replace('\n', "<br>")))
        .collect();
    Ok(markup(paragraphs.join("\n\n")))
}

fn number_lines(value: &SafeValue, _arg: Option<&SafeValue>) -> Result<SafeValue> {
    let text = value.raw.to_output_string();
    let lines: Vec<&str> = text.split('\n').collect();
    let width = lines.len().to_string().len();
    let numbered: Vec<String> = lines
        .iter()
        .enumerate()
        .map(|(i, line)| {
            let line = if value.safe {
                line.to_string()
            } else {
                escape_html(line)
            };
            format!("{:0width$}. {}", i + 1, line, width = width)
        })
        .collect();
    Ok(markup(numbered.join("\n")))
}

fn normalize_newlines(s: &str) -> String {
    s.replace("\r\n", "\n").replace('\r', "\n")
}

fn markup(s: String) -> SafeValue {
    SafeValue::with_safety(Value::String(s), true)
}
