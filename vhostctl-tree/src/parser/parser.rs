//! httpd configuration parser
//!
//! Recursive descent parser that converts tokens into a [`TreeNode`] forest.

use crate::parser::ast::TreeNode;
use crate::parser::lexer::{tokenize, LexError, Location, Spanned, Token};
use thiserror::Error;

/// Parser error types
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("Lexer error: {0}")]
    Lex(#[from] LexError),

    #[error("Unexpected token at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        expected: String,
        found: String,
    },

    #[error("Section <{name}> opened at position {position} is never closed")]
    UnclosedSection { name: String, position: usize },

    #[error("Mismatched closing tag at position {position}: expected </{expected}>, found </{found}>")]
    MismatchedSection {
        position: usize,
        expected: String,
        found: String,
    },
}

impl ParseError {
    /// Byte offset the error points at
    pub fn position(&self) -> usize {
        match self {
            ParseError::Lex(e) => e.position(),
            ParseError::UnexpectedToken { position, .. }
            | ParseError::UnclosedSection { position, .. }
            | ParseError::MismatchedSection { position, .. } => *position,
        }
    }

    fn label(&self) -> &'static str {
        match self {
            ParseError::Lex(_) => "unterminated quote",
            ParseError::UnexpectedToken { .. } => "unexpected here",
            ParseError::UnclosedSection { .. } => "section opened here",
            ParseError::MismatchedSection { .. } => "wrong closing tag",
        }
    }

    /// Render a plain-text diagnostic pointing into `source`
    pub fn report(&self, file_name: &str, source: &str) -> String {
        use ariadne::{Config, Label, Report, ReportKind, Source};

        let start = self.position().min(source.len());
        let end = source[start..]
            .char_indices()
            .nth(1)
            .map(|(i, _)| start + i)
            .unwrap_or(source.len());

        let mut buf = Vec::new();
        let written = Report::build(ReportKind::Error, (file_name, start..end))
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string())
            .with_label(Label::new((file_name, start..end)).with_message(self.label()))
            .finish()
            .write((file_name, Source::from(source)), &mut buf);

        match written {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Parser state
pub struct Parser {
    tokens: Vec<Spanned<Token>>,
    pos: usize,
}

impl Parser {
    /// Create a new parser from source text
    pub fn new(source: &str) -> ParseResult<Self> {
        let tokens = tokenize(source)?;
        Ok(Self { tokens, pos: 0 })
    }

    /// Parse a whole file
    pub fn parse(&mut self) -> ParseResult<Vec<TreeNode>> {
        self.parse_body(None)
    }

    // ========================================
    // Statements
    // ========================================

    /// Parse statements until EOF, or until the closing tag of `open`
    fn parse_body(&mut self, open: Option<(&str, usize)>) -> ParseResult<Vec<TreeNode>> {
        let mut nodes = Vec::new();

        loop {
            let Some(token) = self.peek().cloned() else {
                return match open {
                    Some((name, position)) => Err(ParseError::UnclosedSection {
                        name: name.to_string(),
                        position,
                    }),
                    None => Ok(nodes),
                };
            };

            match token {
                Token::Newline => {
                    self.advance();
                }
                Token::Comment(raw) => {
                    let span = self.current_span();
                    self.advance();
                    let text = raw.trim_start_matches('#').trim();
                    nodes.push(TreeNode::comment(text, Some(span)));
                }
                Token::SectionOpen(_) => nodes.push(self.parse_section()?),
                Token::SectionClose(found) => {
                    return match open {
                        Some((expected, _)) if expected.eq_ignore_ascii_case(&found) => Ok(nodes),
                        Some((expected, _)) => Err(ParseError::MismatchedSection {
                            position: self.current_span().start,
                            expected: expected.to_string(),
                            found,
                        }),
                        None => Err(ParseError::UnexpectedToken {
                            position: self.current_span().start,
                            expected: "directive".to_string(),
                            found: format!("</{}>", found),
                        }),
                    };
                }
                Token::Word(_) => nodes.push(self.parse_directive()?),
                other => {
                    return Err(ParseError::UnexpectedToken {
                        position: self.current_span().start,
                        expected: "directive name".to_string(),
                        found: other.to_string(),
                    });
                }
            }
        }
    }

    fn parse_directive(&mut self) -> ParseResult<TreeNode> {
        let start = self.current_span();
        let name = match self.advance() {
            Some(Token::Word(name)) => name,
            other => {
                return Err(ParseError::UnexpectedToken {
                    position: start.start,
                    expected: "directive name".to_string(),
                    found: format!("{:?}", other),
                });
            }
        };

        let mut end = start.end;
        let mut args = Vec::new();
        while let Some(token) = self.peek() {
            if *token == Token::Newline {
                break;
            }
            if let Some(arg) = token.as_arg() {
                args.push(arg);
            }
            end = self.current_span().end;
            self.advance();
        }

        Ok(TreeNode::directive(
            name,
            args,
            Some(Location { start: start.start, end }),
        ))
    }

    fn parse_section(&mut self) -> ParseResult<TreeNode> {
        let start = self.current_span();
        let name = match self.advance() {
            Some(Token::SectionOpen(name)) => name,
            other => {
                return Err(ParseError::UnexpectedToken {
                    position: start.start,
                    expected: "section".to_string(),
                    found: format!("{:?}", other),
                });
            }
        };

        let (args, header_end) = self.parse_section_args()?;
        let body = self.parse_body(Some((&name, start.start)))?;

        // parse_body only returns Ok on the matching close tag
        let end = self.current_span();
        self.advance();

        let mut section = TreeNode::section(
            name,
            args,
            body,
            Some(Location { start: start.start, end: end.end }),
        );
        section.inner = Some(Location { start: header_end, end: end.start });
        Ok(section)
    }

    /// Arguments of an opening tag, up to and including the `>`, and the
    /// offset just past it
    fn parse_section_args(&mut self) -> ParseResult<(Vec<String>, usize)> {
        let mut args = Vec::new();

        loop {
            let span = self.current_span();
            match self.advance() {
                Some(Token::Word(word)) if word == ">" => return Ok((args, span.end)),
                Some(Token::Word(word)) if word.ends_with('>') => {
                    let arg = &word[..word.len() - 1];
                    if !arg.is_empty() {
                        args.push(arg.to_string());
                    }
                    return Ok((args, span.end));
                }
                Some(token @ (Token::Word(_) | Token::DoubleQuoted(_) | Token::SingleQuoted(_))) => {
                    if let Some(arg) = token.as_arg() {
                        args.push(arg);
                    }
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        position: span.start,
                        expected: "'>'".to_string(),
                        found: other.map(|t| t.to_string()).unwrap_or_else(|| "end of input".to_string()),
                    });
                }
            }
        }
    }

    // ========================================
    // Token utilities
    // ========================================

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|s| &s.value)
    }

    fn advance(&mut self) -> Option<Token> {
        if self.pos < self.tokens.len() {
            let token = self.tokens[self.pos].value.clone();
            self.pos += 1;
            Some(token)
        } else {
            None
        }
    }

    fn current_span(&self) -> Location {
        self.tokens
            .get(self.pos)
            .or_else(|| self.tokens.last())
            .map(|s| s.span)
            .unwrap_or(Location { start: 0, end: 0 })
    }
}

/// Parse httpd configuration source into a node forest
pub fn parse(source: &str) -> ParseResult<Vec<TreeNode>> {
    let mut parser = Parser::new(source)?;
    parser.parse()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::ast::NodeKind;

    #[test]
    fn test_parse_empty() {
        assert!(parse("").unwrap().is_empty());
        assert!(parse("\n\n   \n").unwrap().is_empty());
    }

    #[test]
    fn test_parse_directives() {
        let nodes = parse("Listen 80\nInclude ports.conf\n").unwrap();
        assert_eq!(nodes.len(), 2);
        assert!(nodes[0].is_directive_named("Listen"));
        assert_eq!(nodes[0].args().collect::<Vec<_>>(), vec!["80"]);
        assert_eq!(nodes[1].args().collect::<Vec<_>>(), vec!["ports.conf"]);
    }

    #[test]
    fn test_parse_virtual_host() {
        let source = r#"
# Default site
<VirtualHost *:80 [::]:80>
    ServerName example.com
    ServerAlias www.example.com
    DocumentRoot "/var/www/example"
    <Directory /var/www/example>
        Options Indexes FollowSymLinks
    </Directory>
</VirtualHost>
"#;
        let nodes = parse(source).unwrap();
        assert_eq!(nodes.len(), 2);
        assert_eq!(nodes[0].kind(), NodeKind::Comment);
        assert_eq!(nodes[0].value.as_deref(), Some("Default site"));

        let vhost = &nodes[1];
        assert_eq!(vhost.label, "VirtualHost");
        assert_eq!(vhost.args().collect::<Vec<_>>(), vec!["*:80", "[::]:80"]);
        let body: Vec<_> = vhost.body().collect();
        assert_eq!(body.len(), 4);
        assert_eq!(body[2].args().next(), Some("\"/var/www/example\""));
        assert_eq!(body[3].label, "Directory");
    }

    #[test]
    fn test_section_span_covers_close_tag() {
        let source = "<IfModule ssl_module>\n    Listen 443\n</IfModule>\n";
        let nodes = parse(source).unwrap();
        let span = nodes[0].span.unwrap();
        assert_eq!(span.start, 0);
        assert_eq!(&source[span.start..span.end], source.trim_end());
    }

    #[test]
    fn test_section_inner_span() {
        let source = "<IfModule ssl_module>\n    Listen 443\n</IfModule>\n";
        let inner = parse(source).unwrap()[0].inner.unwrap();
        assert_eq!(&source[inner.start..inner.end], "\n    Listen 443\n");
    }

    #[test]
    fn test_quoted_section_arg() {
        let nodes = parse("<Directory \"/var/www/my site\">\n</Directory>\n").unwrap();
        assert_eq!(nodes[0].args().collect::<Vec<_>>(), vec!["\"/var/www/my site\""]);
    }

    #[test]
    fn test_close_tag_is_case_insensitive() {
        assert!(parse("<ifmodule mod_ssl.c>\n</IfModule>\n").is_ok());
    }

    #[test]
    fn test_unclosed_section() {
        let err = parse("<VirtualHost *:80>\nServerName a\n").unwrap_err();
        assert!(matches!(err, ParseError::UnclosedSection { .. }));
    }

    #[test]
    fn test_mismatched_section() {
        let err = parse("<VirtualHost *:80>\n</Directory>\n").unwrap_err();
        assert!(matches!(err, ParseError::MismatchedSection { .. }));
    }

    #[test]
    fn test_stray_close_tag() {
        assert!(parse("</VirtualHost>\n").is_err());
    }

    #[test]
    fn test_report_mentions_file() {
        let source = "<VirtualHost *:80>\n</Directory>\n";
        let err = parse(source).unwrap_err();
        let report = err.report("broken.conf", source);
        assert!(report.contains("broken.conf"));
        assert!(report.contains("Mismatched closing tag"));
    }
}
