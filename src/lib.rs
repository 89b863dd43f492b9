//! stencil: a Django-style string template engine
//!
//! Templates mix literal text with `{{ expression|filter }}` output,
//! `{% tag %}` blocks and `{# comments #}`. Every value that is not marked
//! safe is HTML-escaped on output.
//!
//! ```no_run
//! use stencil::{Context, Environment};
//!
//! let env = Environment::new();
//! let template = stencil::compile("Hello {{ name|capFirst }}!", &env).unwrap();
//! let mut ctx = Context::new();
//! ctx.set("name", "<world>");
//! assert_eq!(template.render(&env, &ctx).unwrap(), "Hello &lt;world&gt;!");
//! ```

pub mod cache;
pub mod commands;
pub mod config;
pub mod filters;
pub mod template;

use std::sync::Arc;

pub use config::EngineConfig;
pub use filters::{Filter, Safety};
pub use template::{
    mark_safe, Context, Environment, FileSystemLoader, Loader, MemoryLoader, Result, SafeValue,
    Template, TemplateError, Value,
};

/// Compile `source` with the tags and filters of `env`
pub fn compile(source: &str, env: &Environment) -> Result<Template> {
    env.compile(source)
}

/// Load, compile and cache the template `name`
pub fn get_template(name: &str, env: &Environment) -> Result<Arc<Template>> {
    env.get_template(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inheritance_example() {
        let loader: MemoryLoader = [(
            "parent",
            "{% block 1 %}P1{% endblock %} {% block 2 %}P2{% endblock %}",
        )]
        .into_iter()
        .collect();
        let env = Environment::with_loader(loader);
        let child = compile(
            "{% extends \"parent\" %}{% block 1 %}C1{% endblock %}",
            &env,
        )
        .unwrap();
        assert_eq!(child.render(&env, &Context::new()).unwrap(), "C1 P2");
        assert!(Arc::ptr_eq(
            &get_template("parent", &env).unwrap(),
            &get_template("parent", &env).unwrap()
        ));
    }
}
