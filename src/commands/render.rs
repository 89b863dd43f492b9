//! Render one template to stdout or a file

use anyhow::{bail, Context as _, Result};
use std::fs;
use std::io::Write;
use std::path::Path;

use crate::config::EngineConfig;
use crate::template::{Context, Environment};

/// Read a render context from a JSON or YAML file, chosen by extension
pub fn load_context(path: &Path) -> Result<Context> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read context file {:?}", path))?;
    let json: serde_json::Value = match path.extension().and_then(|e| e.to_str()) {
        Some("yml") | Some("yaml") => serde_yaml::from_str(&content)?,
        Some("json") => serde_json::from_str(&content)?,
        other => bail!("Unsupported context file type: {:?}", other.unwrap_or("")),
    };
    Ok(Context::from_json(&json)?)
}

/// Render `name` with the optional context file
pub fn run(
    env: &Environment,
    config: &EngineConfig,
    name: &str,
    context: Option<&Path>,
    output: Option<&Path>,
) -> Result<()> {
    let mut ctx = match context {
        Some(path) => load_context(path)?,
        None => Context::new(),
    };
    if let Some(token) = &config.csrf_token {
        if !ctx.contains("csrf_token") {
            ctx.set("csrf_token", token.as_str());
        }
    }

    let rendered = env
        .render(name, &ctx)
        .with_context(|| format!("Failed to render {}", name))?;

    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, &rendered)?;
            tracing::info!("Rendered {} to {:?}", name, path);
        }
        None => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(rendered.as_bytes())?;
            stdout.flush()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup() -> (TempDir, EngineConfig) {
        let dir = TempDir::new().unwrap();
        let templates = dir.path().join("templates");
        fs::create_dir_all(&templates).unwrap();
        fs::write(templates.join("hello.html"), "Hello {{ name }}{% csrfToken %}").unwrap();
        let config = EngineConfig {
            template_dir: templates,
            extension: "html".to_string(),
            csrf_token: Some("t0k".to_string()),
            ..Default::default()
        };
        (dir, config)
    }

    #[test]
    fn test_load_context_json_and_yaml() {
        let dir = TempDir::new().unwrap();
        let json = dir.path().join("ctx.json");
        let yaml = dir.path().join("ctx.yml");
        fs::write(&json, r#"{"name": "json"}"#).unwrap();
        fs::write(&yaml, "name: yaml\n").unwrap();

        let ctx = load_context(&json).unwrap();
        assert_eq!(ctx.get("name").and_then(|v| v.as_str()), Some("json"));
        let ctx = load_context(&yaml).unwrap();
        assert_eq!(ctx.get("name").and_then(|v| v.as_str()), Some("yaml"));

        let toml = dir.path().join("ctx.toml");
        fs::write(&toml, "").unwrap();
        assert!(load_context(&toml).is_err());
    }

    #[test]
    fn test_render_to_file() {
        let (dir, config) = setup();
        let env = Environment::with_config(&config);
        let ctx_path = dir.path().join("ctx.json");
        fs::write(&ctx_path, r#"{"name": "<you>"}"#).unwrap();
        let out = dir.path().join("out/hello.html");

        run(&env, &config, "hello", Some(&ctx_path), Some(&out)).unwrap();
        assert_eq!(
            fs::read_to_string(&out).unwrap(),
            "Hello &lt;you&gt;<input type=\"hidden\" name=\"csrfmiddlewaretoken\" value=\"t0k\">"
        );
    }

    #[test]
    fn test_render_missing_template() {
        let (_dir, config) = setup();
        let env = Environment::with_config(&config);
        assert!(run(&env, &config, "nope", None, None).is_err());
    }
}
