//! Template engine
//!
//! Source text goes through the [`lexer`] into the [`parser`], which builds a
//! tree of [`Node`]s using the tag table of an [`Environment`]. Rendering
//! walks that tree with a per-call [`Renderer`], escaping every unsafe value
//! on the way out.

pub mod condition;
pub mod context;
pub mod environment;
pub mod error;
pub mod expr;
pub mod lexer;
pub mod loader;
pub mod node;
pub mod parser;
pub mod render;
pub mod tags;
pub mod value;

pub use context::Context;
pub use environment::{Environment, ReverseFn, Template};
pub use error::{Result, TemplateError};
pub use expr::Expression;
pub use loader::{FileSystemLoader, Loader, MemoryLoader};
pub use node::{Node, NodeId};
pub use parser::{Parser, TagToken};
pub use render::Renderer;
pub use tags::TagCompiler;
pub use value::{mark_safe, Function, Object, SafeValue, Value};
