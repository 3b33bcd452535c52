//! Syntax tree for httpd configuration files
//!
//! The tree is deliberately untyped: every node carries a label and an
//! optional value. Directives are `directive` nodes whose value is the
//! directive name and whose children are `arg` nodes. Sections are labelled
//! with their own name and hold `arg` children followed by their body.

use crate::parser::lexer::Location;

/// Label of directive nodes
pub const DIRECTIVE: &str = "directive";

/// Label of argument nodes
pub const ARG: &str = "arg";

/// Label of comment nodes
pub const COMMENT: &str = "#comment";

/// What a node represents, derived from its label
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Directive,
    Arg,
    Comment,
    Section,
}

/// A node of the configuration tree
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeNode {
    pub label: String,
    pub value: Option<String>,
    pub children: Vec<TreeNode>,

    /// Byte range in the source file, `None` for nodes created in memory
    pub span: Option<Location>,

    /// Sections only: the body between the opening tag's `>` and the
    /// closing tag
    pub inner: Option<Location>,

    /// Set when the node's own text changed since it was parsed: its value,
    /// or the argument list of a directive or section
    pub edited: bool,
}

impl TreeNode {
    /// Create an empty node with the given label
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            value: None,
            children: Vec::new(),
            span: None,
            inner: None,
            edited: false,
        }
    }

    pub fn arg(value: impl Into<String>) -> Self {
        Self {
            value: Some(value.into()),
            ..Self::new(ARG)
        }
    }

    pub fn comment(text: impl Into<String>, span: Option<Location>) -> Self {
        Self {
            value: Some(text.into()),
            span,
            ..Self::new(COMMENT)
        }
    }

    pub fn directive(name: impl Into<String>, args: Vec<String>, span: Option<Location>) -> Self {
        Self {
            value: Some(name.into()),
            children: args.into_iter().map(TreeNode::arg).collect(),
            span,
            ..Self::new(DIRECTIVE)
        }
    }

    /// Create a section; `args` come first, then the body
    pub fn section(
        name: impl Into<String>,
        args: Vec<String>,
        body: Vec<TreeNode>,
        span: Option<Location>,
    ) -> Self {
        let mut children: Vec<TreeNode> = args.into_iter().map(TreeNode::arg).collect();
        children.extend(body);
        Self {
            children,
            span,
            ..Self::new(name)
        }
    }

    pub fn kind(&self) -> NodeKind {
        match self.label.as_str() {
            DIRECTIVE => NodeKind::Directive,
            ARG => NodeKind::Arg,
            COMMENT => NodeKind::Comment,
            _ => NodeKind::Section,
        }
    }

    /// Argument values in order
    pub fn args(&self) -> impl Iterator<Item = &str> {
        self.children
            .iter()
            .filter(|c| c.kind() == NodeKind::Arg)
            .filter_map(|c| c.value.as_deref())
    }

    /// Non-argument children
    pub fn body(&self) -> impl Iterator<Item = &TreeNode> {
        self.children.iter().filter(|c| c.kind() != NodeKind::Arg)
    }

    /// Case-insensitive check of a directive's name
    pub fn is_directive_named(&self, name: &str) -> bool {
        self.kind() == NodeKind::Directive
            && self
                .value
                .as_deref()
                .is_some_and(|v| v.eq_ignore_ascii_case(name))
    }
}
