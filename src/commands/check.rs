//! Compile every template and report syntax errors

use anyhow::{bail, Result};

use crate::config::EngineConfig;
use crate::template::Environment;

/// Compile all templates; returns how many compiled cleanly
pub fn run(env: &Environment, config: &EngineConfig) -> Result<usize> {
    let names = super::loader(config).template_names()?;
    let mut failures = 0;

    for name in &names {
        match env.get_template(name) {
            Ok(template) => {
                tracing::debug!("ok {} (blocks: {})", name, template.block_names().join(", "))
            }
            Err(e) => {
                failures += 1;
                eprintln!("{}: {}", name, e);
            }
        }
    }

    if failures > 0 {
        bail!("{} of {} templates failed to compile", failures, names.len());
    }
    println!("Checked {} templates", names.len());
    Ok(names.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn config_for(dir: &TempDir) -> EngineConfig {
        EngineConfig {
            template_dir: dir.path().to_path_buf(),
            ..Default::default()
        }
    }

    #[test]
    fn test_check_passes() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("a.html"), "{% if x %}{{ x }}{% endif %}").unwrap();
        fs::write(dir.path().join("b.html"), "plain").unwrap();
        let config = config_for(&dir);
        let env = Environment::with_config(&config);
        assert_eq!(run(&env, &config).unwrap(), 2);
    }

    #[test]
    fn test_check_reports_failures() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("good.html"), "fine").unwrap();
        fs::write(dir.path().join("bad.html"), "{% if x %}never closed").unwrap();
        let config = config_for(&dir);
        let env = Environment::with_config(&config);
        let err = run(&env, &config).unwrap_err();
        assert!(err.to_string().contains("1 of 2"));
    }
}
