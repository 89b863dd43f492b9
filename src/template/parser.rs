//! Parser - builds a node tree from the token stream
//!
//! Block tags are dispatched through the environment's tag table. A tag
//! compiler receives the parser and may call [`Parser::parse`] with its
//! terminator keywords to consume a nested body.

use std::collections::HashMap;
use std::sync::Arc;

use super::condition;
use super::environment::Environment;
use super::error::{Result, TemplateError};
use super::expr::{self, CompileError, Expression, FilterCall};
use super::lexer::{Lexer, Token, TokenKind};
use super::node::{BlockStore, Node, NodeId};

/// A `{% command args %}` token split into its parts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TagToken {
    pub command: String,
    pub args: String,
    /// Byte offset of the whole tag
    pub position: usize,
    /// Byte offset of `args` in the source
    pub args_offset: usize,
}

impl TagToken {
    /// Arguments split on whitespace, quoted strings kept whole
    pub fn split_args(&self) -> Vec<(usize, &str)> {
        expr::split_args(&self.args)
            .into_iter()
            .map(|(offset, arg)| (self.args_offset + offset, arg))
            .collect()
    }
}

/// Template parser
pub struct Parser<'a> {
    env: &'a Environment,
    source: &'a str,
    tokens: Vec<Token>,
    pos: usize,
    template_id: u64,
    next_index: u32,
    /// Set once any expression or tag has been seen
    seen_non_text: bool,
    blocks: BlockStore,
    cycles: HashMap<String, (NodeId, Vec<Expression>)>,
    /// Tags whose bodies are being parsed, innermost last
    open: Vec<TagToken>,
}

impl<'a> Parser<'a> {
    pub fn new(env: &'a Environment, source: &'a str, template_id: u64) -> Self {
        Self {
            env,
            source,
            tokens: Lexer::tokenize(source),
            pos: 0,
            template_id,
            next_index: 0,
            seen_non_text: false,
            blocks: HashMap::new(),
            cycles: HashMap::new(),
            open: Vec::new(),
        }
    }

    pub fn environment(&self) -> &'a Environment {
        self.env
    }

    /// Parse the whole template, returning the root node and its blocks
    pub fn parse_template(mut self) -> Result<(Node, BlockStore)> {
        let (root, _) = self.parse(&[])?;
        Ok((root, self.blocks))
    }

    /// Parse nodes until a block tag whose command is in `until`.
    ///
    /// Returns the collected group and the terminating tag. With an empty
    /// `until` the whole remaining stream is consumed and no tag is
    /// returned; otherwise running out of tokens is an error.
    pub fn parse(&mut self, until: &[&str]) -> Result<(Node, Option<TagToken>)> {
        let mut nodes = Vec::new();

        while let Some(token) = self.next_token() {
            match token.kind {
                TokenKind::Text => nodes.push(Node::Text(token.content)),
                TokenKind::Comment => {}
                TokenKind::Expr => {
                    if token.content.is_empty() {
                        return Err(self.error(token.position, "Empty expression"));
                    }
                    self.seen_non_text = true;
                    let offset = self.content_offset(&token);
                    nodes.push(Node::Output(self.compile_expr(&token.content, offset)?));
                }
                TokenKind::Block => {
                    let tag = self.split_tag(&token)?;
                    if until.contains(&tag.command.as_str()) {
                        return Ok((Node::Group(nodes), Some(tag)));
                    }
                    nodes.push(self.compile_tag(tag)?);
                }
            }
        }

        if until.is_empty() {
            return Ok((Node::Group(nodes), None));
        }
        let expected = until.join("' or '");
        match self.open.last() {
            Some(tag) => Err(self.error(
                tag.position,
                format!("Unclosed tag '{}', expected '{}'", tag.command, expected),
            )),
            None => Err(TemplateError::syntax(
                self.source,
                self.source.len(),
                "",
                format!("Unclosed tag, expected '{}'", expected),
            )),
        }
    }

    /// Discard tokens up to and including the block tag `end`
    pub fn skip(&mut self, end: &str) -> Result<TagToken> {
        while let Some(token) = self.next_token() {
            if token.kind != TokenKind::Block {
                continue;
            }
            if token.content.split_whitespace().next() == Some(end) {
                return self.split_tag(&token);
            }
        }
        let (position, command) = match self.open.last() {
            Some(tag) => (tag.position, tag.command.as_str()),
            None => (self.source.len(), ""),
        };
        Err(self.error(position, format!("Unclosed tag '{}', expected '{}'", command, end)))
    }

    fn compile_tag(&mut self, tag: TagToken) -> Result<Node> {
        let env = self.env;
        let compiler = env
            .tag(&tag.command)
            .ok_or_else(|| self.error(tag.position, format!("Unknown tag '{}'", tag.command)))?;

        if self.open.len() >= env.max_nesting() {
            return Err(self.error(
                tag.position,
                format!("Tags nested deeper than {}", env.max_nesting()),
            ));
        }

        self.open.push(tag.clone());
        let node = compiler(self, &tag);
        self.open.pop();
        self.seen_non_text = true;
        node
    }

    fn next_token(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned()?;
        self.pos += 1;
        Some(token)
    }

    fn split_tag(&self, token: &Token) -> Result<TagToken> {
        let content = token.content.as_str();
        if content.is_empty() {
            return Err(self.error(token.position, "Empty block tag"));
        }
        let command_len = content
            .find(char::is_whitespace)
            .unwrap_or(content.len());
        let command = &content[..command_len];
        let args_start = expr::skip_whitespace(content, command_len);
        Ok(TagToken {
            command: command.to_string(),
            args: content[args_start..].to_string(),
            position: token.position,
            args_offset: self.content_offset(token) + args_start,
        })
    }

    /// Byte offset of a tag token's trimmed content
    fn content_offset(&self, token: &Token) -> usize {
        let start = (token.position + 2).min(self.source.len());
        expr::skip_whitespace(self.source, start)
    }

    /// Whether an expression or tag has been seen yet. A tag compiled
    /// inside another tag's body always counts as having followed one.
    pub fn seen_non_text(&self) -> bool {
        self.seen_non_text || self.open.len() > 1
    }

    pub fn mark_non_text(&mut self) {
        self.seen_non_text = true;
    }

    /// Compile a `{{ }}`-style expression located at `offset` in the source
    pub fn compile_expr(&self, text: &str, offset: usize) -> Result<Expression> {
        expr::compile(text, self.env.filters(), self.env.max_nesting())
            .map_err(|e| self.compile_error(text, offset, e))
    }

    /// Compile an `if` condition located at `offset` in the source
    pub fn compile_condition(&self, text: &str, offset: usize) -> Result<Expression> {
        condition::compile(text, self.env.filters(), self.env.max_nesting())
            .map_err(|e| self.compile_error(text, offset, e))
    }

    /// Compile a bare filter chain such as `upper|cut:" "`
    pub fn compile_filter_chain(&self, text: &str, offset: usize) -> Result<Vec<FilterCall>> {
        let piped = format!("|{}", text);
        let shift = |e: CompileError| CompileError::new(e.offset.saturating_sub(1), e.message);
        let (calls, end) = expr::compile_pipes(&piped, 0, self.env.filters(), self.env.max_nesting())
            .map_err(|e| self.compile_error(text, offset, shift(e)))?;
        if calls.is_empty() || end < piped.len() {
            let at = end.saturating_sub(1).min(text.len());
            return Err(self.compile_error(
                text,
                offset,
                CompileError::new(at, format!("Invalid filter chain near '{}'", &text[at..])),
            ));
        }
        Ok(calls)
    }

    /// Compile every whitespace-separated argument of a tag
    pub fn compile_args(&self, tag: &TagToken) -> Result<Vec<Expression>> {
        tag.split_args()
            .into_iter()
            .map(|(offset, arg)| self.compile_expr(arg, offset))
            .collect()
    }

    /// A fresh identity for a stateful node
    pub fn next_id(&mut self) -> NodeId {
        let id = NodeId {
            template: self.template_id,
            index: self.next_index,
        };
        self.next_index += 1;
        id
    }

    /// Register a named block body; names are unique per template
    pub fn register_block(&mut self, name: &str, body: Arc<Node>, tag: &TagToken) -> Result<()> {
        if self.blocks.contains_key(name) {
            return Err(self.error(tag.position, format!("Block '{}' defined twice", name)));
        }
        self.blocks.insert(name.to_string(), body);
        Ok(())
    }

    pub fn define_cycle(&mut self, name: &str, id: NodeId, values: Vec<Expression>) {
        self.cycles.insert(name.to_string(), (id, values));
    }

    pub fn named_cycle(&self, name: &str) -> Option<(NodeId, Vec<Expression>)> {
        self.cycles.get(name).cloned()
    }

    /// Syntax error pointing at the tag or expression starting at `position`
    pub fn error(&self, position: usize, message: impl Into<String>) -> TemplateError {
        TemplateError::syntax(self.source, position, self.fragment_at(position), message)
    }

    /// Syntax error for a tag with the wrong arguments
    pub fn arity_error(&self, tag: &TagToken, expected: &str) -> TemplateError {
        self.error(tag.position, format!("'{}' {}", tag.command, expected))
    }

    fn compile_error(&self, text: &str, offset: usize, err: CompileError) -> TemplateError {
        TemplateError::syntax(self.source, offset + err.offset, text, err.message)
    }

    /// The tag starting at `position`, or the rest of its line
    fn fragment_at(&self, position: usize) -> &str {
        let rest = self.source.get(position..).unwrap_or("");
        let end = ["%}", "}}", "#}"]
            .iter()
            .filter_map(|close| rest.find(close).map(|i| i + close.len()))
            .min()
            .or_else(|| rest.find('\n'))
            .unwrap_or(rest.len());
        &rest[..end]
    }
}
