//! Template composition: extends, block, include

use std::collections::HashMap;
use std::sync::Arc;

use super::{add, TagCompiler};
use crate::template::error::Result;
use crate::template::node::{BlockNode, Node, TemplateRef};
use crate::template::parser::{Parser, TagToken};

pub(super) fn register(tags: &mut HashMap<String, TagCompiler>) {
    add(tags, "extends", compile_extends);
    add(tags, "block", compile_block);
    add(tags, "include", compile_include);
}

/// `{% extends "parent" %}`: must come before any other tag or expression
/// and swallows the rest of the template. Only the blocks registered while
/// parsing the rest matter.
fn compile_extends(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    if parser.seen_non_text() {
        return Err(parser.error(
            tag.position,
            "'extends' must be the first tag in the template",
        ));
    }
    let name = single_arg(parser, tag)?;
    parser.mark_non_text();
    parser.parse(&[])?;
    Ok(Node::Extends(Box::new(TemplateRef::new(name))))
}

/// `{% block name %}...{% endblock [name] %}`
fn compile_block(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let name = match tag.split_args().as_slice() {
        [(_, name)] => name.to_string(),
        _ => return Err(parser.arity_error(tag, "takes exactly one name")),
    };

    let (body, end) = parser.parse(&["endblock"])?;
    if let Some(end) = end {
        if !end.args.is_empty() && end.args != name {
            return Err(parser.error(
                end.position,
                format!("'endblock {}' does not close block '{}'", end.args, name),
            ));
        }
    }

    let body = Arc::new(body);
    parser.register_block(&name, body.clone(), tag)?;
    Ok(Node::Block(Box::new(BlockNode { name, body })))
}

/// `{% include name %}`
fn compile_include(parser: &mut Parser<'_>, tag: &TagToken) -> Result<Node> {
    let name = single_arg(parser, tag)?;
    Ok(Node::Include(Box::new(TemplateRef::new(name))))
}

fn single_arg(parser: &Parser<'_>, tag: &TagToken) -> Result<crate::template::expr::Expression> {
    let mut args = parser.compile_args(tag)?;
    if args.len() != 1 {
        return Err(parser.arity_error(tag, "takes exactly one template name"));
    }
    Ok(args.remove(0))
}
