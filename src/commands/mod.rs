//! CLI subcommands

pub mod check;
pub mod list;
pub mod render;

use crate::config::EngineConfig;
use crate::template::FileSystemLoader;

/// Loader over the configured template directory
fn loader(config: &EngineConfig) -> FileSystemLoader {
    FileSystemLoader::new(&config.template_dir).with_extension(&config.extension)
}
