//! Per-call render state and the node evaluator
//!
//! A compiled [`Template`] is never mutated while rendering. Everything that
//! changes during one render call (cycle positions, ifchanged history, the
//! chain of block overrides and the recursion depth) lives in a [`Renderer`]
//! owned by that call, so one template can be rendered from many threads.

use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

use super::context::Context;
use super::environment::{Environment, Template};
use super::error::{Result, TemplateError};
use super::node::{BlockStore, ForNode, Node, NodeId, TemplateRef};
use super::value::{Function, SafeValue, Value};
use crate::filters::escape_html;

lazy_static! {
    static ref BETWEEN_TAGS_RE: Regex = Regex::new(r">\s+<").unwrap();
}

/// Rotation and change-tracking state of one render call
#[derive(Debug, Default)]
struct RenderState {
    cycles: HashMap<NodeId, usize>,
    /// Last output of each ifchanged node, per run of its enclosing loop
    last_seen: HashMap<(NodeId, u64), String>,
    /// Ids of the `for` runs currently being rendered, innermost last
    loop_runs: Vec<u64>,
    next_run: u64,
}

/// Evaluates nodes against a context
pub struct Renderer<'e> {
    env: &'e Environment,
    state: RenderState,
    /// Block stores of the templates being rendered, most derived first
    chain: Vec<Arc<BlockStore>>,
    depth: usize,
}

impl<'e> Renderer<'e> {
    pub fn new(env: &'e Environment) -> Self {
        Self {
            env,
            state: RenderState::default(),
            chain: Vec::new(),
            depth: 0,
        }
    }

    pub fn environment(&self) -> &'e Environment {
        self.env
    }

    /// Render a template as the most derived one in a fresh block chain
    pub fn render_template(&mut self, template: &Template, ctx: &Context) -> Result<String> {
        self.enter()?;
        let saved = std::mem::replace(&mut self.chain, vec![template.blocks().clone()]);
        let mut ctx = ctx.clone();
        let result = template.root().render(self, &mut ctx);
        self.chain = saved;
        self.leave();
        result
    }

    /// Render an ancestor whose blocks may be overridden by the templates
    /// already in the chain
    fn render_ancestor(&mut self, parent: &Template, ctx: &mut Context) -> Result<String> {
        self.enter()?;
        self.chain.push(parent.blocks().clone());
        let result = parent.root().render(self, ctx);
        self.chain.pop();
        self.leave();
        result
    }

    fn enter(&mut self) -> Result<()> {
        self.depth += 1;
        if self.depth > self.env.max_depth() {
            self.depth -= 1;
            return Err(TemplateError::Render(format!(
                "Maximum render depth of {} exceeded",
                self.env.max_depth()
            )));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }

    /// Every body registered for `name`, most derived first
    fn overrides(&self, name: &str) -> Vec<Arc<Node>> {
        self.chain
            .iter()
            .filter_map(|store| store.get(name).cloned())
            .collect()
    }

    /// Render the first body of `chain`; the rest become its `super`
    fn render_block_chain(&mut self, chain: &[Arc<Node>], ctx: &Context) -> Result<String> {
        let Some((body, rest)) = chain.split_first() else {
            return Ok(String::new());
        };

        let mut scope = ctx.child();
        if !rest.is_empty() {
            let rest: Vec<Arc<Node>> = rest.to_vec();
            let outer = ctx.clone();
            let parent = Function::with_renderer(move |r: &mut Renderer<'_>| {
                r.enter()?;
                let result = r.render_block_chain(&rest, &outer);
                r.leave();
                result.map(Value::Markup)
            });
            let mut block = IndexMap::new();
            block.insert("super".to_string(), Value::Function(parent.clone()));
            scope.set("super", Value::Function(parent));
            scope.set("block", Value::Object(block));
        }
        body.render(self, &mut scope)
    }

    fn load(&mut self, target: &TemplateRef, ctx: &Context) -> Result<Arc<Template>> {
        if let Some(template) = target.cached.get() {
            return Ok(template.clone());
        }

        let name = target.name.resolve(self, ctx)?.raw;
        let name = match name {
            Value::String(s) | Value::Markup(s) if !s.is_empty() => s,
            other => {
                return Err(TemplateError::Render(format!(
                    "Template name must be a non-empty string, got '{}'",
                    other.to_output_string()
                )))
            }
        };
        let template = self.env.get_template(&name)?;
        if target.name.is_constant() {
            let _ = target.cached.set(template.clone());
        }
        Ok(template)
    }

    fn begin_loop(&mut self) -> u64 {
        self.state.next_run += 1;
        let run = self.state.next_run;
        self.state.loop_runs.push(run);
        run
    }

    fn end_loop(&mut self, run: u64) {
        self.state.loop_runs.retain(|r| *r != run);
        self.state.last_seen.retain(|(_, r), _| *r != run);
    }

    /// Record `content` as the latest output of an ifchanged node; true when
    /// it differs from the previous one in the same loop run
    fn changed(&mut self, id: NodeId, content: &str) -> bool {
        let run = self.state.loop_runs.last().copied().unwrap_or(0);
        match self.state.last_seen.get(&(id, run)) {
            Some(previous) if previous == content => false,
            _ => {
                self.state.last_seen.insert((id, run), content.to_string());
                true
            }
        }
    }

    fn next_cycle(&mut self, id: NodeId, len: usize) -> usize {
        let slot = self.state.cycles.entry(id).or_insert(0);
        let index = *slot % len;
        *slot = index + 1;
        index
    }

    /// Render one node, appending to `output`
    pub fn render_node(&mut self, node: &Node, ctx: &mut Context, output: &mut String) -> Result<()> {
        match node {
            Node::Text(text) => output.push_str(text),

            Node::Output(expr) => output.push_str(&expr.resolve(self, ctx)?.render()),

            Node::Group(children) => {
                for child in children {
                    self.render_node(child, ctx, output)?;
                }
            }

            Node::For(for_node) => self.render_for(for_node, ctx, output)?,

            Node::If {
                condition,
                then_branch,
                else_branch,
            } => {
                if condition.resolve(self, ctx)?.raw.is_truthy() {
                    self.render_node(then_branch, ctx, output)?;
                } else if let Some(else_branch) = else_branch {
                    self.render_node(else_branch, ctx, output)?;
                }
            }

            Node::Extends(target) => {
                let parent = self.load(target, ctx)?;
                output.push_str(&self.render_ancestor(&parent, ctx)?);
            }

            Node::Block(block) => {
                let mut chain = self.overrides(&block.name);
                if chain.is_empty() {
                    chain.push(block.body.clone());
                }
                output.push_str(&self.render_block_chain(&chain, ctx)?);
            }

            Node::Cycle { id, values } => {
                if !values.is_empty() {
                    let index = self.next_cycle(*id, values.len());
                    output.push_str(&values[index].resolve(self, ctx)?.render());
                }
            }

            Node::FilterBlock { calls, body } => {
                let content = body.render(self, ctx)?;
                let mut value = SafeValue::with_safety(Value::String(content), true);
                for call in calls {
                    value = call.apply(&value, self, ctx)?;
                }
                output.push_str(&value.render());
            }

            Node::FirstOf(exprs) => {
                for expr in exprs {
                    let value = expr.resolve(self, ctx)?;
                    if value.raw.is_truthy() {
                        output.push_str(&value.render());
                        break;
                    }
                }
            }

            Node::IfChanged {
                id,
                watch,
                body,
                else_branch,
            } => {
                let (changed, content) = if watch.is_empty() {
                    let content = body.render(self, ctx)?;
                    (self.changed(*id, &content), Some(content))
                } else {
                    let mut key = String::new();
                    for expr in watch {
                        key.push_str(&expr.resolve(self, ctx)?.raw.to_output_string());
                        key.push('\u{1f}');
                    }
                    (self.changed(*id, &key), None)
                };

                if changed {
                    match content {
                        Some(content) => output.push_str(&content),
                        None => self.render_node(body, ctx, output)?,
                    }
                } else if let Some(else_branch) = else_branch {
                    self.render_node(else_branch, ctx, output)?;
                }
            }

            Node::Include(target) => {
                let template = self.load(target, ctx)?;
                output.push_str(&self.render_template(&template, ctx)?);
            }

            Node::Spaceless(body) => {
                let content = body.render(self, ctx)?;
                output.push_str(BETWEEN_TAGS_RE.replace_all(&content, "><").trim());
            }

            Node::TemplateTag(literal) => output.push_str(literal),

            Node::WidthRatio {
                current,
                max,
                width,
            } => {
                let current = current.resolve(self, ctx)?.raw.as_number();
                let max = max.resolve(self, ctx)?.raw.as_number();
                let width = width.resolve(self, ctx)?.raw.as_number();
                let ratio = match (current, max, width) {
                    (Some(c), Some(m), Some(w)) if m != 0.0 => (c / m * w).round(),
                    _ => 0.0,
                };
                if ratio.is_finite() {
                    output.push_str(&format!("{}", ratio as i64));
                } else {
                    output.push('0');
                }
            }

            Node::With { value, name, body } => {
                let value = value.resolve(self, ctx)?.into_value();
                let mut scope = ctx.child_with(name, value);
                self.render_node(body, &mut scope, output)?;
            }

            Node::Url {
                handler,
                args,
                target,
            } => {
                let name = handler.resolve(self, ctx)?.raw.to_output_string();
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(arg.resolve(self, ctx)?.raw);
                }
                let url = self.env.reverse_url(&name, &values)?;
                match target {
                    Some(target) => ctx.set(target, url),
                    None => output.push_str(&escape_html(&url)),
                }
            }

            Node::CsrfToken => match ctx.get("csrf_token").map(Value::to_output_string) {
                Some(token) if !token.is_empty() => {
                    output.push_str(&format!(
                        "<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"{}\">",
                        escape_html(&token)
                    ));
                }
                _ => warn!("csrfToken used but no csrf_token in the context"),
            },

            Node::Comment => {}
        }
        Ok(())
    }

    fn render_for(&mut self, node: &ForNode, ctx: &Context, output: &mut String) -> Result<()> {
        let source = node.iterable.resolve(self, ctx)?.raw;
        let mut items = match (&source, node.targets.len()) {
            _ if !source.is_truthy() => Vec::new(),
            (Value::Object(map), n) if n > 1 => map
                .iter()
                .map(|(k, v)| Value::Array(vec![Value::String(k.clone()), v.clone()]))
                .collect(),
            _ => source.iterate()?,
        };

        if items.is_empty() {
            if let Some(empty) = &node.empty {
                let mut scope = ctx.child();
                self.render_node(empty, &mut scope, output)?;
            }
            return Ok(());
        }
        if node.reversed {
            items.reverse();
        }

        let run = self.begin_loop();
        let result = self.render_iterations(node, items, ctx, output);
        self.end_loop(run);
        result
    }

    fn render_iterations(
        &mut self,
        node: &ForNode,
        items: Vec<Value>,
        ctx: &Context,
        output: &mut String,
    ) -> Result<()> {
        let parentloop = ctx.get("forloop").cloned();
        let len = items.len();

        for (i, item) in items.into_iter().enumerate() {
            let mut scope = ctx.child();
            bind_targets(&node.targets, item, &mut scope);

            let mut forloop = IndexMap::new();
            forloop.insert("counter".to_string(), Value::from(i + 1));
            forloop.insert("counter0".to_string(), Value::from(i));
            forloop.insert("revcounter".to_string(), Value::from(len - i));
            forloop.insert("revcounter0".to_string(), Value::from(len - i - 1));
            forloop.insert("first".to_string(), Value::Bool(i == 0));
            forloop.insert("last".to_string(), Value::Bool(i + 1 == len));
            if let Some(parent) = &parentloop {
                forloop.insert("parentloop".to_string(), parent.clone());
            }
            scope.set("forloop", Value::Object(forloop));

            self.render_node(&node.body, &mut scope, output)?;
        }
        Ok(())
    }
}

/// Assign a loop item to the loop variables, unpacking pairs
fn bind_targets(targets: &[String], item: Value, scope: &mut Context) {
    if let [single] = targets {
        scope.set(single, item);
        return;
    }
    let parts = match item {
        Value::Array(parts) => parts,
        other => vec![other],
    };
    let mut parts = parts.into_iter();
    for target in targets {
        scope.set(target, parts.next().unwrap_or_default());
    }
}
