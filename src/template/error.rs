//! Template compile and render errors

use thiserror::Error;

/// Errors raised while compiling or rendering a template
#[derive(Error, Debug)]
pub enum TemplateError {
    /// Structural problem found while compiling. Never raised by `render`.
    #[error("Syntax error at line {line} (offset {position}): {message} in `{fragment}`")]
    Syntax {
        line: usize,
        position: usize,
        fragment: String,
        message: String,
    },

    #[error("Template not found: {0}")]
    NotFound(String),

    #[error("Render error: {0}")]
    Render(String),

    /// Error raised by application code (functions, lookup hooks, custom
    /// filters, loaders). Passed through untouched.
    #[error(transparent)]
    Custom(Box<dyn std::error::Error + Send + Sync>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl TemplateError {
    /// Build a syntax error, computing the line from the byte offset
    pub fn syntax(source: &str, position: usize, fragment: &str, message: impl Into<String>) -> Self {
        let position = position.min(source.len());
        let line = source
            .get(..position)
            .map(|s| s.matches('\n').count() + 1)
            .unwrap_or(1);
        TemplateError::Syntax {
            line,
            position,
            fragment: fragment.to_string(),
            message: message.into(),
        }
    }

    /// Wrap an application error
    pub fn custom<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        TemplateError::Custom(err.into())
    }

    pub fn is_syntax(&self) -> bool {
        matches!(self, TemplateError::Syntax { .. })
    }
}

pub type Result<T> = std::result::Result<T, TemplateError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_syntax_error_line() {
        let err = TemplateError::syntax("a\nb\n{% x %}", 4, "{% x %}", "Unknown tag");
        match err {
            TemplateError::Syntax { line, position, .. } => {
                assert_eq!(line, 3);
                assert_eq!(position, 4);
            }
            _ => panic!("expected syntax error"),
        }
    }

    #[test]
    fn test_display_contains_fragment() {
        let err = TemplateError::syntax("{{ x|nope }}", 0, "x|nope", "Unknown filter 'nope'");
        let message = err.to_string();
        assert!(message.contains("x|nope"));
        assert!(message.contains("Unknown filter"));
    }
}
