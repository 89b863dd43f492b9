//! Control-flow tags: if, for, with, ifchanged, cycle, firstOf

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;

use super::{add, TagCompiler};
use crate::template::error::Result;
use crate::template::node::{ForNode, Node};
use crate::template::parser::{Parser, TagToken};

lazy_static! {
    static ref FOR_RE: Regex = Regex::new(r"^(.+?)\s+in\s+(.+?)(\s+reversed)?$").unwrap();
    static ref WITH_RE: Regex = Regex::new(r"^(.+?)\s+as\s+([A-Za-z_$][\w$]*)$").unwrap();
    static ref IDENT_RE: Regex = Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap();
}

pub(super) fn register(tags: &mut HashMap<String, TagCompiler>) {
    add(tags, "if", compile_if);
    add(tags, "for", compile_for);
    add(tags, "with", compile_with);
    add(tags, "ifchanged", compile_ifchanged);
    add(tags, "cycle", compile_cycle);
    add(tags, "firstOf", compile_first_of);
}

/// `{% if cond %}...[{% else %}...]{% endif %}`
fn compile_if(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    if tag.args.is_empty() {
        return Err(parser.arity_error(tag, "requires a condition"));
    }
    let condition = parser.compile_condition(&tag.args, tag.args_offset)?;

    let (then_branch, end) = parser.parse(&["else", "endif"])?;
    let else_branch = match end {
        Some(end) if end.command == "else" => Some(Box::new(parser.parse(&["endif"])?.0)),
        _ => None,
    };

    Ok(Node::If {
        condition,
        then_branch: Box::new(then_branch),
        else_branch,
    })
}

/// `{% for x[, y] in items [reversed] %}...[{% empty %}...]{% endfor %}`
fn compile_for(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let caps = FOR_RE
        .captures(&tag.args)
        .ok_or_else(|| parser.arity_error(tag, "expects 'x in items'"))?;

    let mut targets = Vec::new();
    for target in caps[1].split(',').map(str::trim) {
        if !IDENT_RE.is_match(target) {
            return Err(parser.error(tag.position, format!("Invalid loop variable '{}'", target)));
        }
        targets.push(target.to_string());
    }

    let source = caps.get(2).map(|m| (m.start(), m.as_str())).unwrap_or((0, ""));
    let iterable = parser.compile_expr(source.1, tag.args_offset + source.0)?;
    let reversed = caps.get(3).is_some();

    let (body, end) = parser.parse(&["empty", "endfor"])?;
    let empty = match end {
        Some(end) if end.command == "empty" => Some(parser.parse(&["endfor"])?.0),
        _ => None,
    };

    Ok(Node::For(Box::new(ForNode {
        targets,
        iterable,
        reversed,
        body,
        empty,
    })))
}

/// `{% with expr as name %}...{% endwith %}`
fn compile_with(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let caps = WITH_RE
        .captures(&tag.args)
        .ok_or_else(|| parser.arity_error(tag, "expects 'value as name'"))?;
    let value = parser.compile_expr(&caps[1], tag.args_offset)?;
    let name = caps[2].to_string();
    let (body, _) = parser.parse(&["endwith"])?;

    Ok(Node::With {
        value,
        name,
        body: Box::new(body),
    })
}

/// `{% ifchanged [exprs...] %}...[{% else %}...]{% endifchanged %}`
fn compile_ifchanged(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let watch = parser.compile_args(tag)?;
    let id = parser.next_id();

    let (body, end) = parser.parse(&["else", "endifchanged"])?;
    let else_branch = match end {
        Some(end) if end.command == "else" => Some(Box::new(parser.parse(&["endifchanged"])?.0)),
        _ => None,
    };

    Ok(Node::IfChanged {
        id,
        watch,
        body: Box::new(body),
        else_branch,
    })
}

/// `{% cycle a b c [as name] %}` or `{% cycle name %}`
fn compile_cycle(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let args = tag.split_args();
    match args.as_slice() {
        [] => Err(parser.arity_error(tag, "requires at least one value")),

        [(_, name)] if IDENT_RE.is_match(name) && !is_literal(name) => {
            let (id, values) = parser
                .named_cycle(name)
                .ok_or_else(|| parser.error(tag.position, format!("No cycle named '{}'", name)))?;
            Ok(Node::Cycle { id, values })
        }

        [values @ .., (_, "as"), (_, name)] => {
            if values.is_empty() {
                return Err(parser.arity_error(tag, "requires at least one value"));
            }
            let values = compile_each(parser, values)?;
            let id = parser.next_id();
            parser.define_cycle(name, id, values.clone());
            Ok(Node::Cycle { id, values })
        }

        values => {
            let values = compile_each(parser, values)?;
            Ok(Node::Cycle {
                id: parser.next_id(),
                values,
            })
        }
    }
}

/// `{% firstOf a b c %}`
fn compile_first_of(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let values = parser.compile_args(tag)?;
    if values.is_empty() {
        return Err(parser.arity_error(tag, "requires at least one value"));
    }
    Ok(Node::FirstOf(values))
}

fn compile_each(
    parser: &Parser<'_>,
    args: &[(usize, &str)],
) -> Result<Vec<crate::template::expr::Expression>> {
    args.iter()
        .map(|(offset, arg)| parser.compile_expr(arg, *offset))
        .collect()
}

fn is_literal(word: &str) -> bool {
    matches!(word, "true" | "false" | "null" | "undefined")
}
