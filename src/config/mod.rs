//! Configuration module

mod settings;

pub use settings::{fill_route, EngineConfig, CONFIG_FILE};
