//! Lexer - splits template source into text, expression, block and comment tokens

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref TAG_RE: Regex = Regex::new(r"(?s)\{%.*?%\}|\{\{.*?\}\}|\{#.*?#\}").unwrap();
}

/// Kind of a lexed token
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    /// Literal text between tags
    Text,
    /// `{{ ... }}`
    Expr,
    /// `{% ... %}`
    Block,
    /// `{# ... #}` - content is discarded
    Comment,
}

/// A single lexed token
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: TokenKind,
    /// Inner content with delimiters stripped and whitespace trimmed.
    /// Text tokens keep their content verbatim.
    pub content: String,
    /// Byte offset of the token in the template source
    pub position: usize,
}

impl Token {
    fn new(kind: TokenKind, content: impl Into<String>, position: usize) -> Self {
        Self {
            kind,
            content: content.into(),
            position,
        }
    }
}

/// Lexer over a template source. Cheap to construct, so re-tokenizing is
/// just building a new one.
#[derive(Debug, Clone)]
pub struct Lexer<'s> {
    source: &'s str,
    pos: usize,
    pending: Option<Token>,
}

impl<'s> Lexer<'s> {
    pub fn new(source: &'s str) -> Self {
        Self {
            source,
            pos: 0,
            pending: None,
        }
    }

    /// Tokenize the entire input
    pub fn tokenize(source: &str) -> Vec<Token> {
        Lexer::new(source).collect()
    }

    fn classify(&self, start: usize, raw: &str) -> Token {
        let inner = raw[2..raw.len() - 2].trim();
        match &raw[..2] {
            "{{" => Token::new(TokenKind::Expr, inner, start),
            "{%" => Token::new(TokenKind::Block, inner, start),
            _ => Token::new(TokenKind::Comment, "", start),
        }
    }
}

impl Iterator for Lexer<'_> {
    type Item = Token;

    fn next(&mut self) -> Option<Token> {
        if let Some(token) = self.pending.take() {
            return Some(token);
        }
        if self.pos >= self.source.len() {
            return None;
        }

        match TAG_RE.find_at(self.source, self.pos) {
            Some(m) => {
                let tag = self.classify(m.start(), m.as_str());
                let text_start = self.pos;
                self.pos = m.end();
                if m.start() > text_start {
                    self.pending = Some(tag);
                    Some(Token::new(
                        TokenKind::Text,
                        &self.source[text_start..m.start()],
                        text_start,
                    ))
                } else {
                    Some(tag)
                }
            }
            None => {
                let text_start = self.pos;
                self.pos = self.source.len();
                Some(Token::new(
                    TokenKind::Text,
                    &self.source[text_start..],
                    text_start,
                ))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lexer_simple() {
        let tokens = Lexer::tokenize("Hello {{ name }}!");
        assert_eq!(tokens.len(), 3);
        assert_eq!(tokens[0], Token::new(TokenKind::Text, "Hello ", 0));
        assert_eq!(tokens[1], Token::new(TokenKind::Expr, "name", 6));
        assert_eq!(tokens[2], Token::new(TokenKind::Text, "!", 16));
    }

    #[test]
    fn test_lexer_block_and_comment() {
        let tokens = Lexer::tokenize("{% if x %}yes{# hidden #}{% endif %}");
        let kinds: Vec<_> = tokens.iter().map(|t| t.kind).collect();
        assert_eq!(
            kinds,
            vec![
                TokenKind::Block,
                TokenKind::Text,
                TokenKind::Comment,
                TokenKind::Block
            ]
        );
        assert_eq!(tokens[0].content, "if x");
        assert_eq!(tokens[2].content, "");
        assert_eq!(tokens[3].content, "endif");
    }

    #[test]
    fn test_unclosed_tag_is_text() {
        let tokens = Lexer::tokenize("a {{ b");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].kind, TokenKind::Text);
        assert_eq!(tokens[0].content, "a {{ b");
    }

    #[test]
    fn test_unclosed_tag_before_real_tag() {
        let tokens = Lexer::tokenize("{{ a {% b %}");
        assert_eq!(tokens.len(), 2);
        assert_eq!(tokens[0].content, "{{ a ");
        assert_eq!(tokens[1].kind, TokenKind::Block);
        assert_eq!(tokens[1].position, 5);
    }

    #[test]
    fn test_comment_is_not_nested() {
        let tokens = Lexer::tokenize("{# a {# b #} c #}");
        assert_eq!(tokens[0].kind, TokenKind::Comment);
        assert_eq!(tokens[1].content, " c #}");
    }

    #[test]
    fn test_multiline_tag() {
        let tokens = Lexer::tokenize("{{\n  name\n}}");
        assert_eq!(tokens.len(), 1);
        assert_eq!(tokens[0].content, "name");
    }
}
