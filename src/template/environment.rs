//! Environment - tag and filter tables, loader, URL reversal and the
//! compiled-template cache

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

use super::context::Context;
use super::error::{Result, TemplateError};
use super::loader::{FileSystemLoader, Loader};
use super::node::{BlockStore, Node};
use super::parser::{Parser, TagToken};
use super::render::Renderer;
use super::tags::{builtin_tags, TagCompiler};
use super::value::Value;
use crate::cache::{CacheStats, TemplateCache};
use crate::config::EngineConfig;
use crate::filters::{builtin_filters, Filter};

pub const DEFAULT_MAX_DEPTH: usize = 64;
pub const DEFAULT_MAX_NESTING: usize = 256;

static NEXT_TEMPLATE_ID: AtomicU64 = AtomicU64::new(1);

/// Builds the URL for a named route
pub type ReverseFn = Arc<dyn Fn(&str, &[Value]) -> Result<String> + Send + Sync>;

/// A compiled template: the root node plus the blocks it defines
#[derive(Debug)]
pub struct Template {
    id: u64,
    name: Option<String>,
    root: Node,
    blocks: Arc<BlockStore>,
}

impl Template {
    /// Render against `ctx`. The template itself is not modified, so one
    /// template can serve any number of concurrent renders.
    pub fn render(&self, env: &Environment, ctx: &Context) -> Result<String> {
        Renderer::new(env).render_template(self, ctx)
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn root(&self) -> &Node {
        &self.root
    }

    pub fn blocks(&self) -> &Arc<BlockStore> {
        &self.blocks
    }

    /// Names of the blocks defined by this template, sorted
    pub fn block_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.blocks.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

/// Everything compilation and rendering need: the tag and filter tables,
/// where named templates come from, and the cache of compiled ones.
pub struct Environment {
    tags: HashMap<String, TagCompiler>,
    filters: HashMap<String, Filter>,
    loader: Option<Arc<dyn Loader>>,
    reverse: Option<ReverseFn>,
    cache: TemplateCache,
    max_depth: usize,
    max_nesting: usize,
}

impl Default for Environment {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut tags: Vec<&String> = self.tags.keys().collect();
        tags.sort();
        f.debug_struct("Environment")
            .field("tags", &tags)
            .field("filters", &self.filters.len())
            .field("loader", &self.loader.is_some())
            .field("reverse", &self.reverse.is_some())
            .field("cache", &self.cache)
            .field("max_depth", &self.max_depth)
            .field("max_nesting", &self.max_nesting)
            .finish()
    }
}

impl Environment {
    /// Built-in tags and filters, no loader
    pub fn new() -> Self {
        Self {
            tags: builtin_tags(),
            filters: builtin_filters(),
            loader: None,
            reverse: None,
            cache: TemplateCache::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_nesting: DEFAULT_MAX_NESTING,
        }
    }

    pub fn with_loader<L: Loader + 'static>(loader: L) -> Self {
        let mut env = Self::new();
        env.set_loader(loader);
        env
    }

    /// Environment reading templates from `config.template_dir`, with the
    /// configured limits and routes
    pub fn with_config(config: &EngineConfig) -> Self {
        let loader = FileSystemLoader::new(&config.template_dir).with_extension(&config.extension);
        let mut env = Self::with_loader(loader).with_limits(config.max_depth, config.max_nesting);
        if !config.routes.is_empty() {
            let routes = config.routes.clone();
            env.set_reverse(move |name: &str, args: &[Value]| {
                let pattern = routes.get(name).ok_or_else(|| {
                    TemplateError::Render(format!("No route named '{}'", name))
                })?;
                Ok(crate::config::fill_route(pattern, args))
            });
        }
        env
    }

    /// Set the render depth and tag nesting limits
    pub fn with_limits(mut self, max_depth: usize, max_nesting: usize) -> Self {
        self.max_depth = max_depth.max(1);
        self.max_nesting = max_nesting.max(1);
        self
    }

    pub fn with_reverse<F>(mut self, reverse: F) -> Self
    where
        F: Fn(&str, &[Value]) -> Result<String> + Send + Sync + 'static,
    {
        self.set_reverse(reverse);
        self
    }

    /// Replace the loader. Cached templates are kept.
    pub fn set_loader<L: Loader + 'static>(&mut self, loader: L) {
        self.loader = Some(Arc::new(loader));
    }

    pub fn set_reverse<F>(&mut self, reverse: F)
    where
        F: Fn(&str, &[Value]) -> Result<String> + Send + Sync + 'static,
    {
        self.reverse = Some(Arc::new(reverse));
    }

    /// Register a block tag, replacing any tag of the same name
    pub fn add_tag<F>(&mut self, name: &str, compiler: F)
    where
        F: Fn(&mut Parser<'_>, &TagToken) -> Result<Node> + Send + Sync + 'static,
    {
        self.tags.insert(name.to_string(), Arc::new(compiler));
    }

    /// Register a filter, replacing any filter of the same name
    pub fn add_filter(&mut self, name: &str, filter: Filter) {
        self.filters.insert(name.to_string(), filter);
    }

    pub fn tag(&self, name: &str) -> Option<&TagCompiler> {
        self.tags.get(name)
    }

    pub fn filter(&self, name: &str) -> Option<&Filter> {
        self.filters.get(name)
    }

    pub fn filters(&self) -> &HashMap<String, Filter> {
        &self.filters
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    pub fn max_nesting(&self) -> usize {
        self.max_nesting
    }

    /// Compile a template from source. The result is not cached.
    pub fn compile(&self, source: &str) -> Result<Template> {
        self.compile_named(None, source)
    }

    fn compile_named(&self, name: Option<&str>, source: &str) -> Result<Template> {
        let id = NEXT_TEMPLATE_ID.fetch_add(1, Ordering::Relaxed);
        let (root, blocks) = Parser::new(self, source, id).parse_template()?;
        debug!(
            "Compiled template {} ({} nodes, {} blocks)",
            name.unwrap_or("<string>"),
            root.count(),
            blocks.len()
        );
        Ok(Template {
            id,
            name: name.map(str::to_string),
            root,
            blocks: Arc::new(blocks),
        })
    }

    /// Load and compile a named template, caching the result
    pub fn get_template(&self, name: &str) -> Result<Arc<Template>> {
        if let Some(template) = self.cache.get(name) {
            debug!("Template cache hit: {}", name);
            return Ok(template);
        }
        debug!("Template cache miss: {}", name);

        let loader = self
            .loader
            .as_ref()
            .ok_or_else(|| TemplateError::NotFound(name.to_string()))?;
        let source = loader.load(name)?;
        let template = self.compile_named(Some(name), &source)?;
        Ok(self.cache.insert_if_absent(name, template))
    }

    /// Render a named template
    pub fn render(&self, name: &str, ctx: &Context) -> Result<String> {
        self.get_template(name)?.render(self, ctx)
    }

    /// Compile and render a source string in one go
    pub fn render_str(&self, source: &str, ctx: &Context) -> Result<String> {
        self.compile(source)?.render(self, ctx)
    }

    /// Build a URL through the configured reverser
    pub fn reverse_url(&self, name: &str, args: &[Value]) -> Result<String> {
        match &self.reverse {
            Some(reverse) => reverse(name, args),
            None => Err(TemplateError::Render(format!(
                "Cannot reverse URL '{}': no URL reverser configured",
                name
            ))),
        }
    }

    /// Drop a cached template so the next `get_template` reloads it
    pub fn invalidate(&self, name: &str) -> bool {
        self.cache.remove(name)
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::Safety;
    use crate::template::{mark_safe, MemoryLoader};
    use std::sync::atomic::AtomicUsize;

    fn render(source: &str, ctx: &Context) -> String {
        Environment::new().render_str(source, ctx).unwrap()
    }

    #[test]
    fn test_literal_text_is_unchanged() {
        assert_eq!(render("hello world", &Context::new()), "hello world");
        assert_eq!(render("a {{ b", &Context::new()), "a {{ b");
    }

    #[test]
    fn test_escaping() {
        let mut ctx = Context::new();
        ctx.set("x", "<a href='x'>&</a>");
        assert_eq!(
            render("{{ x }}", &ctx),
            "&lt;a href=&#39;x&#39;&gt;&amp;&lt;/a&gt;"
        );
        assert_eq!(render("{{ x|safe }}", &ctx), "<a href='x'>&</a>");
        assert_eq!(render("{{ '<b>' }}", &ctx), "<b>");
    }

    #[test]
    fn test_mark_safe_value() {
        let mut ctx = Context::new();
        ctx.set("x", mark_safe("<b>").into_value());
        assert_eq!(render("{{ x }}", &ctx), "<b>");
    }

    #[test]
    fn test_block_names() {
        let env = Environment::new();
        let template = env
            .compile("{% block title %}{% endblock %}{% block body %}{% block nav %}{% endblock %}{% endblock %}")
            .unwrap();
        assert_eq!(template.block_names(), vec!["body", "nav", "title"]);
        assert!(env.compile("plain").unwrap().block_names().is_empty());
    }

    #[test]
    fn test_filter_chaining() {
        let mut ctx = Context::new();
        ctx.set("x", "Hi");
        assert_eq!(render("{{ x|upper|lower }}", &ctx), "hi");
    }

    #[test]
    fn test_undefined_navigation() {
        let ctx = Context::from_json(&serde_json::json!({"x": null})).unwrap();
        assert_eq!(render("{{ x.y.z }}", &ctx), "");
        assert_eq!(render("{{ nothing.at.all }}", &ctx), "");
    }

    #[test]
    fn test_compile_time_rejection() {
        let env = Environment::new();
        assert!(env.compile("{% does_not_exist %}").unwrap_err().is_syntax());
        assert!(env.compile("{{ x|does_not_exist }}").unwrap_err().is_syntax());
        assert!(env.compile("{% if %}{% endif %}").unwrap_err().is_syntax());
    }

    #[test]
    fn test_pipe_whitespace_is_rejected() {
        let env = Environment::new();
        assert!(env.compile("{{ x |upper }}").is_err());
        assert!(env.compile("{{ x| upper }}").is_err());
        assert!(env.compile("{{  x|upper  }}").is_ok());
    }

    #[test]
    fn test_get_template_is_cached() {
        let loads = Arc::new(AtomicUsize::new(0));
        let counter = loads.clone();
        let env = Environment::with_loader(move |name: &str| -> Result<String> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(format!("template {}", name))
        });

        let first = env.get_template("a").unwrap();
        let second = env.get_template("a").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(first.name(), Some("a"));
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        assert!(env.invalidate("a"));
        env.get_template("a").unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);

        env.clear_cache();
        assert_eq!(env.cache_stats().entries, 0);
    }

    #[test]
    fn test_compile_error_is_not_cached() {
        let mut loader = MemoryLoader::new();
        loader.insert("bad", "{% nope %}");
        let env = Environment::with_loader(loader);
        assert!(env.get_template("bad").unwrap_err().is_syntax());
        assert_eq!(env.cache_stats().entries, 0);
    }

    #[test]
    fn test_no_loader() {
        let env = Environment::new();
        assert!(matches!(env.get_template("x"), Err(TemplateError::NotFound(_))));
    }

    #[test]
    fn test_custom_filter_and_tag() {
        let mut env = Environment::new();
        env.add_filter(
            "shout",
            Filter::text(Safety::IfValue, |s: &str, _| Ok(Value::from(format!("{}!", s)))),
        );
        env.add_tag("now", |parser: &mut Parser<'_>, tag: &TagToken| {
            if !tag.args.is_empty() {
                return Err(parser.arity_error(tag, "takes no arguments"));
            }
            Ok(Node::Text("NOW".to_string()))
        });
        let ctx = Context::new();
        assert_eq!(env.render_str("{{ 'hi'|shout }} {% now %}", &ctx).unwrap(), "hi! NOW");
        assert!(env.compile("{% now please %}").unwrap_err().is_syntax());
    }

    #[test]
    fn test_custom_filter_error_propagates() {
        let mut env = Environment::new();
        env.add_filter(
            "fail",
            Filter::raw(Safety::Never, |_, _| Err(TemplateError::custom("boom"))),
        );
        let err = env.render_str("{{ 1|fail }}", &Context::new()).unwrap_err();
        assert!(matches!(err, TemplateError::Custom(e) if e.to_string() == "boom"));
    }

    #[test]
    fn test_function_values_are_called() {
        let mut ctx = Context::new();
        ctx.set("greet", Value::function(|| Ok(Value::from("hello"))));
        ctx.set("fails", Value::function(|| Err(TemplateError::custom("nope"))));
        let env = Environment::new();
        assert_eq!(env.render_str("{{ greet|upper }}", &ctx).unwrap(), "HELLO");
        assert!(matches!(
            env.render_str("{{ fails }}", &ctx),
            Err(TemplateError::Custom(_))
        ));
    }

    #[test]
    fn test_concurrent_renders_share_template() {
        let env = Arc::new(Environment::new());
        let template = Arc::new(
            env.compile("{% for x in items %}{% cycle 'a' 'b' %}{% endfor %}")
                .unwrap(),
        );
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let env = env.clone();
                let template = template.clone();
                std::thread::spawn(move || {
                    let mut ctx = Context::new();
                    ctx.set("items", vec![1, 2, 3]);
                    template.render(&env, &ctx).unwrap()
                })
            })
            .collect();
        for handle in handles {
            assert_eq!(handle.join().unwrap(), "aba");
        }
    }
}
