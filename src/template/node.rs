//! Compiled node tree
//!
//! The variant set is closed: tags build nodes out of these variants and
//! nothing else. Nodes hold no render state; cycle positions, ifchanged
//! history and the block-override chain live in the [`Renderer`].

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use super::context::Context;
use super::error::Result;
use super::expr::{Expression, FilterCall};
use super::render::Renderer;
use super::Template;

/// Stable identity of a stateful node, assigned at compile time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId {
    pub template: u64,
    pub index: u32,
}

/// Named block bodies registered by one template
pub type BlockStore = HashMap<String, Arc<Node>>;

/// A compiled template node
#[derive(Debug)]
pub enum Node {
    Text(String),
    /// `{{ expr }}`
    Output(Expression),
    Group(Vec<Node>),
    For(Box<ForNode>),
    If {
        condition: Expression,
        then_branch: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    Extends(Box<TemplateRef>),
    Block(Box<BlockNode>),
    Cycle {
        id: NodeId,
        values: Vec<Expression>,
    },
    /// `{% filter upper|escape %}...{% endfilter %}`
    FilterBlock {
        calls: Vec<FilterCall>,
        body: Box<Node>,
    },
    FirstOf(Vec<Expression>),
    IfChanged {
        id: NodeId,
        watch: Vec<Expression>,
        body: Box<Node>,
        else_branch: Option<Box<Node>>,
    },
    Include(Box<TemplateRef>),
    Spaceless(Box<Node>),
    /// Literal delimiter emitted by `templateTag`
    TemplateTag(&'static str),
    WidthRatio {
        current: Expression,
        max: Expression,
        width: Expression,
    },
    With {
        value: Expression,
        name: String,
        body: Box<Node>,
    },
    Url {
        handler: Expression,
        args: Vec<Expression>,
        target: Option<String>,
    },
    CsrfToken,
    Comment,
}

/// `{% for targets in iterable [reversed] %}`
#[derive(Debug)]
pub struct ForNode {
    pub targets: Vec<String>,
    pub iterable: Expression,
    pub reversed: bool,
    pub body: Node,
    pub empty: Option<Node>,
}

/// `{% block name %}`; the body is shared with the template's block store
#[derive(Debug)]
pub struct BlockNode {
    pub name: String,
    pub body: Arc<Node>,
}

/// Target of `extends` / `include`. A constant name is resolved once and
/// kept here.
#[derive(Debug)]
pub struct TemplateRef {
    pub name: Expression,
    pub cached: OnceLock<Arc<Template>>,
}

impl TemplateRef {
    pub fn new(name: Expression) -> Self {
        Self {
            name,
            cached: OnceLock::new(),
        }
    }
}

impl Node {
    /// Render this node to a string
    pub fn render(&self, renderer: &mut Renderer<'_>, ctx: &mut Context) -> Result<String> {
        let mut output = String::new();
        renderer.render_node(self, ctx, &mut output)?;
        Ok(output)
    }

    /// Number of nodes in this subtree
    pub fn count(&self) -> usize {
        1 + match self {
            Node::Group(children) => children.iter().map(Node::count).sum(),
            Node::For(f) => f.body.count() + f.empty.as_ref().map(Node::count).unwrap_or(0),
            Node::If {
                then_branch,
                else_branch,
                ..
            }
            | Node::IfChanged {
                body: then_branch,
                else_branch,
                ..
            } => then_branch.count() + else_branch.as_ref().map(|n| n.count()).unwrap_or(0),
            Node::Block(b) => b.body.count(),
            Node::FilterBlock { body, .. }
            | Node::Spaceless(body)
            | Node::With { body, .. } => body.count(),
            _ => 0,
        }
    }
}
