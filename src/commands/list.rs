//! List templates under the template directory

use anyhow::Result;

use crate::config::EngineConfig;

/// Print every template name
pub fn run(config: &EngineConfig) -> Result<Vec<String>> {
    let names = super::loader(config).template_names()?;
    println!("Templates ({}):", names.len());
    for name in &names {
        println!("  {}", name);
    }
    Ok(names)
}
