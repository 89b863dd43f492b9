//! Engine configuration (stencil.yml)

use anyhow::{Context as _, Result};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use percent_encoding::utf8_percent_encode;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::filters::url::COMPONENT;
use crate::template::environment::{DEFAULT_MAX_DEPTH, DEFAULT_MAX_NESTING};
use crate::template::Value;

lazy_static! {
    static ref ROUTE_PARAM_RE: Regex = Regex::new(r":([A-Za-z_]\w*)").unwrap();
}

/// Default config file name, looked up in the working directory
pub const CONFIG_FILE: &str = "stencil.yml";

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct EngineConfig {
    /// Directory templates are loaded from
    pub template_dir: PathBuf,
    /// Extension appended to template names that have none
    pub extension: String,
    /// Maximum include/extends/super depth while rendering
    pub max_depth: usize,
    /// Maximum tag nesting depth while compiling
    pub max_nesting: usize,
    /// Route name → URL pattern with `:param` placeholders
    pub routes: IndexMap<String, String>,
    /// Injected as `csrf_token` into every render context
    pub csrf_token: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            template_dir: PathBuf::from("templates"),
            extension: String::new(),
            max_depth: DEFAULT_MAX_DEPTH,
            max_nesting: DEFAULT_MAX_NESTING,
            routes: IndexMap::new(),
            csrf_token: None,
        }
    }
}

impl EngineConfig {
    /// Load configuration from a YAML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {:?}", path))?;
        let config: EngineConfig = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config {:?}", path))?;
        tracing::debug!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load `path` if given, else `stencil.yml` if present, else defaults
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None if Path::new(CONFIG_FILE).exists() => Self::load(CONFIG_FILE),
            None => Ok(Self::default()),
        }
    }
}

/// Substitute `:param` placeholders positionally with `args`, each one
/// percent-encoded as a single path segment. Placeholders without a
/// matching argument are left empty.
pub fn fill_route(pattern: &str, args: &[Value]) -> String {
    let mut args = args.iter();
    ROUTE_PARAM_RE
        .replace_all(pattern, |_: &regex::Captures| match args.next() {
            Some(arg) => utf8_percent_encode(&arg.to_output_string(), COMPONENT).to_string(),
            None => String::new(),
        })
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.template_dir, PathBuf::from("templates"));
        assert_eq!(config.max_depth, 64);
        assert_eq!(config.max_nesting, 256);
        assert!(config.routes.is_empty());
    }

    #[test]
    fn test_parse_config() {
        let yaml = r#"
template_dir: views
extension: html
max_depth: 10
routes:
  home: /
  post: /posts/:year/:slug/
csrf_token: secret
"#;
        let config: EngineConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.template_dir, PathBuf::from("views"));
        assert_eq!(config.extension, "html");
        assert_eq!(config.max_depth, 10);
        assert_eq!(config.max_nesting, 256);
        assert_eq!(config.routes.keys().collect::<Vec<_>>(), vec!["home", "post"]);
        assert_eq!(config.csrf_token.as_deref(), Some("secret"));
    }

    #[test]
    fn test_load_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("stencil.yml");
        fs::write(&path, "extension: txt\n").unwrap();
        assert_eq!(EngineConfig::load(&path).unwrap().extension, "txt");
        assert!(EngineConfig::load(dir.path().join("missing.yml")).is_err());
    }

    #[test]
    fn test_fill_route() {
        let args = [Value::from(2024), Value::from("hello")];
        assert_eq!(fill_route("/posts/:year/:slug/", &args), "/posts/2024/hello/");
        assert_eq!(fill_route("/posts/:id/", &[]), "/posts//");
        assert_eq!(fill_route("/", &args), "/");
    }

    #[test]
    fn test_fill_route_encodes_args() {
        let args = [Value::from("a/b"), Value::from("what? yes&no")];
        assert_eq!(
            fill_route("/tags/:tag/:q", &args),
            "/tags/a%2Fb/what%3F%20yes%26no"
        );
    }
}
