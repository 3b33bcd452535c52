//! Parser module for httpd configuration files
//!
//! This module provides the lexer, tree, parser and writer.

pub mod ast;
pub mod lexer;
pub mod parser;
pub mod writer;

pub use ast::{NodeKind, TreeNode, ARG, COMMENT, DIRECTIVE};
pub use lexer::{tokenize, LexError, Location, Spanned, Token};
pub use parser::{parse, ParseError, ParseResult, Parser};
pub use writer::{write_source, write_tree};
