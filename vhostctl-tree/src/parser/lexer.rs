//! Lexer for httpd configuration files
//!
//! Tokenizes Apache-style configuration text.
//!
//! Key features:
//! - Line oriented (newlines terminate directives)
//! - `\` at the end of a line continues the directive
//! - `<Section args>` / `</Section>` for blocks
//! - "..." and '...' arguments are kept verbatim, quotes included
//! - `#` at the start of a line is a comment

use logos::{Logos, Span};
use std::fmt;

/// Source location for error reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub start: usize,
    pub end: usize,
}

impl From<Span> for Location {
    fn from(span: Span) -> Self {
        Self {
            start: span.start,
            end: span.end,
        }
    }
}

/// A token with its location in the source
#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub value: T,
    pub span: Location,
}

impl<T> Spanned<T> {
    pub fn new(value: T, span: impl Into<Location>) -> Self {
        Self {
            value,
            span: span.into(),
        }
    }
}

/// Token types for httpd syntax
#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    // Skip whitespace (spaces and tabs), but NOT newlines
    #[regex(r"[ \t\f]+", logos::skip)]
    Whitespace,

    // Escaped newline joins two physical lines
    #[regex(r"\\\r?\n", logos::skip)]
    Continuation,

    #[regex(r"\r?\n")]
    Newline,

    /// Comment, raw text including the leading `#`
    #[regex(r"#[^\r\n]*", |lex| lex.slice().to_string())]
    Comment(String),

    // ============================================================
    // Structural
    // ============================================================

    /// `<Name` of a section opening tag
    #[regex(r"<[A-Za-z][A-Za-z0-9_]*", |lex| lex.slice()[1..].to_string(), priority = 10)]
    SectionOpen(String),

    /// `</Name>` closing tag
    #[regex(r"</[A-Za-z][A-Za-z0-9_]*[ \t]*>", |lex| {
        let s = lex.slice();
        s[2..s.len() - 1].trim().to_string()
    }, priority = 10)]
    SectionClose(String),

    // ============================================================
    // Values
    // ============================================================

    /// Double quoted argument, kept with its quotes
    #[regex(r#""([^"\\\r\n]|\\.)*""#, |lex| lex.slice().to_string())]
    DoubleQuoted(String),

    /// Single quoted argument, kept with its quotes
    #[regex(r"'[^'\r\n]*'", |lex| lex.slice().to_string())]
    SingleQuoted(String),

    /// Generic word (directive names, unquoted arguments, paths, ...)
    #[regex(r#"[^ \t\f\r\n"'#][^ \t\f\r\n]*"#, |lex| lex.slice().to_string())]
    Word(String),
}

impl Token {
    /// Source text of a token usable as a directive argument
    pub fn as_arg(&self) -> Option<String> {
        match self {
            Token::Word(s) | Token::DoubleQuoted(s) | Token::SingleQuoted(s) | Token::Comment(s) => {
                Some(s.clone())
            }
            Token::SectionOpen(name) => Some(format!("<{}", name)),
            Token::SectionClose(name) => Some(format!("</{}>", name)),
            _ => None,
        }
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Newline => write!(f, "\\n"),
            Token::Comment(s) => write!(f, "{}", s),
            Token::SectionOpen(s) => write!(f, "<{}", s),
            Token::SectionClose(s) => write!(f, "</{}>", s),
            Token::DoubleQuoted(s) | Token::SingleQuoted(s) | Token::Word(s) => write!(f, "{}", s),
            _ => write!(f, "{:?}", self),
        }
    }
}

/// Lexer result type
pub type LexResult = Result<Vec<Spanned<Token>>, LexError>;

/// Lexer error
#[derive(Debug, Clone, thiserror::Error)]
pub enum LexError {
    #[error("Unexpected character at position {position}")]
    UnexpectedChar { position: usize },
}

impl LexError {
    pub fn position(&self) -> usize {
        match self {
            LexError::UnexpectedChar { position } => *position,
        }
    }
}

/// Tokenize httpd configuration source
pub fn tokenize(source: &str) -> LexResult {
    let lexer = Token::lexer(source);
    let mut tokens: Vec<Spanned<Token>> = Vec::new();

    for (result, span) in lexer.spanned() {
        match result {
            Ok(Token::Whitespace) | Ok(Token::Continuation) => continue,
            Ok(Token::Newline) => {
                // `Indexes\` + newline: the word swallowed the backslash,
                // so the continuation has to be undone here.
                if let Some(Spanned { value: Token::Word(word), .. }) = tokens.last_mut() {
                    if word.ends_with('\\') {
                        word.pop();
                        if word.is_empty() {
                            tokens.pop();
                        }
                        continue;
                    }
                }
                tokens.push(Spanned::new(Token::Newline, span));
            }
            Ok(token) => tokens.push(Spanned::new(token, span)),
            Err(_) => {
                // Only an unterminated quote can get here
                return Err(LexError::UnexpectedChar { position: span.start });
            }
        }
    }

    Ok(tokens)
}
