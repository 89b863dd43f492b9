//! Rendering context: a stack of variable frames linked to their parent

use indexmap::IndexMap;
use serde::Serialize;
use std::sync::Arc;

use super::error::{Result, TemplateError};
use super::value::Value;

/// Variables visible to a render. Cloning is cheap; child scopes share the
/// parent through an `Arc` instead of copying it.
#[derive(Debug, Clone, Default)]
pub struct Context {
    frame: Arc<IndexMap<String, Value>>,
    parent: Option<Arc<Context>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context from a JSON object
    pub fn from_json(json: &serde_json::Value) -> Result<Self> {
        match Value::from_json(json) {
            Value::Object(map) => Ok(Self {
                frame: Arc::new(map),
                parent: None,
            }),
            _ => Err(TemplateError::Render(
                "context must be a JSON object".to_string(),
            )),
        }
    }

    /// Build a context from any serializable struct or map
    pub fn from_serialize<T: Serialize>(value: &T) -> Result<Self> {
        let json = serde_json::to_value(value).map_err(TemplateError::custom)?;
        Self::from_json(&json)
    }

    /// Set a variable in the innermost frame
    pub fn set<V: Into<Value>>(&mut self, name: &str, value: V) {
        Arc::make_mut(&mut self.frame).insert(name.to_string(), value.into());
    }

    /// Set a variable from a serializable value
    pub fn set_object<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        let json = serde_json::to_value(value).map_err(TemplateError::custom)?;
        self.set(name, Value::from_json(&json));
        Ok(())
    }

    /// Look a name up in this frame, then each parent in turn
    pub fn get(&self, name: &str) -> Option<&Value> {
        let mut scope = self;
        loop {
            if let Some(value) = scope.frame.get(name) {
                return Some(value);
            }
            scope = scope.parent.as_deref()?;
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// New empty scope on top of this one
    pub fn child(&self) -> Context {
        Context {
            frame: Arc::new(IndexMap::new()),
            parent: Some(Arc::new(self.clone())),
        }
    }

    /// New scope holding a single variable
    pub fn child_with<V: Into<Value>>(&self, name: &str, value: V) -> Context {
        let mut child = self.child();
        child.set(name, value);
        child
    }

    /// Variables of the innermost frame
    pub fn variables(&self) -> &IndexMap<String, Value> {
        &self.frame
    }
}

impl From<IndexMap<String, Value>> for Context {
    fn from(map: IndexMap<String, Value>) -> Self {
        Self {
            frame: Arc::new(map),
            parent: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_child_scope_shadows_parent() {
        let mut ctx = Context::new();
        ctx.set("a", 1);
        ctx.set("b", 2);

        let child = ctx.child_with("a", "inner");
        assert!(matches!(child.get("a"), Some(Value::String(s)) if s == "inner"));
        assert!(matches!(child.get("b"), Some(Value::Number(n)) if *n == 2.0));
        assert!(matches!(ctx.get("a"), Some(Value::Number(n)) if *n == 1.0));
    }

    #[test]
    fn test_set_does_not_leak_into_clone() {
        let mut ctx = Context::new();
        ctx.set("x", 1);
        let snapshot = ctx.clone();
        ctx.set("x", 2);
        assert!(matches!(snapshot.get("x"), Some(Value::Number(n)) if *n == 1.0));
    }

    #[test]
    fn test_from_json() {
        let json = serde_json::json!({"user": {"name": "Ada"}});
        let ctx = Context::from_json(&json).unwrap();
        assert!(matches!(ctx.get("user"), Some(Value::Object(_))));
        assert!(Context::from_json(&serde_json::json!([1])).is_err());
    }

    #[test]
    fn test_set_object() {
        #[derive(Serialize)]
        struct Post {
            title: String,
            tags: Vec<&'static str>,
        }

        let mut ctx = Context::new();
        let post = Post {
            title: "Hello".to_string(),
            tags: vec!["a", "b"],
        };
        ctx.set_object("post", &post).unwrap();
        let title = ctx.get("post").unwrap().get_property("title").unwrap();
        assert!(matches!(title, Some(Value::String(s)) if s == "Hello"));

        let mut bad = std::collections::HashMap::new();
        bad.insert((1, 2), "pair keys cannot become JSON");
        assert!(ctx.set_object("bad", &bad).is_err());
        assert!(!ctx.contains("bad"));
    }
}
