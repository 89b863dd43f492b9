//! Built-in block tags
//!
//! Each tag is a compiler function that turns a `{% command args %}` token
//! (and, for paired tags, the body up to its terminator) into a [`Node`].

mod control;
mod inheritance;
mod misc;

use std::collections::HashMap;
use std::sync::Arc;

use super::error::Result;
use super::node::Node;
use super::parser::{Parser, TagToken};

/// Compiles one block tag
pub type TagCompiler = Arc<dyn Fn(&mut Parser<'_>, &TagToken) -> Result<Node> + Send + Sync>;

/// The built-in tag table
pub fn builtin_tags() -> HashMap<String, TagCompiler> {
    let mut tags: HashMap<String, TagCompiler> = HashMap::new();
    control::register(&mut tags);
    inheritance::register(&mut tags);
    misc::register(&mut tags);
    tags
}

fn add<F>(tags: &mut HashMap<String, TagCompiler>, name: &str, f: F)
where
    F: Fn(&mut Parser<'_>, &TagToken) -> Result<Node> + Send + Sync + 'static,
{
    tags.insert(name.to_string(), Arc::new(f));
}

/// Fail unless the tag has no arguments
fn no_args(parser: &Parser<'_>, tag: &TagToken) -> Result<()> {
    if tag.args.is_empty() {
        Ok(())
    } else {
        Err(parser.arity_error(tag, "takes no arguments"))
    }
}
