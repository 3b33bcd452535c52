//! Serializes a node forest back into httpd configuration text
//!
//! [`write_tree`] renders nodes from scratch. [`write_source`] keeps the
//! text of the file the nodes were parsed from and only renders what was
//! added or edited in memory, so blank lines, comments and indentation of
//! untouched lines survive a save.

use crate::parser::ast::{NodeKind, TreeNode};
use std::fmt::Write;

const INDENT: &str = "    ";

/// Render nodes as configuration text, one statement per line
pub fn write_tree(nodes: &[TreeNode]) -> String {
    let mut out = String::new();
    write_nodes(&mut out, nodes, "");
    out
}

fn write_nodes(out: &mut String, nodes: &[TreeNode], indent: &str) {
    for node in nodes {
        match node.kind() {
            // written with their owner
            NodeKind::Arg => {}
            NodeKind::Comment => {
                let text = node.value.as_deref().unwrap_or("");
                if text.is_empty() {
                    let _ = writeln!(out, "{}#", indent);
                } else {
                    let _ = writeln!(out, "{}# {}", indent, text);
                }
            }
            NodeKind::Directive => {
                // Nodes inserted but never named are not written
                if let Some(line) = directive_line(node) {
                    let _ = writeln!(out, "{}{}", indent, line);
                }
            }
            NodeKind::Section => {
                let _ = writeln!(out, "{}{}", indent, section_header(node));
                write_nodes(out, &node.children, &format!("{}{}", indent, INDENT));
                let _ = writeln!(out, "{}</{}>", indent, node.label);
            }
        }
    }
}

fn directive_line(node: &TreeNode) -> Option<String> {
    let mut line = node.value.clone()?;
    for arg in node.args() {
        line.push(' ');
        line.push_str(arg);
    }
    Some(line)
}

fn section_header(node: &TreeNode) -> String {
    let mut header = format!("<{}", node.label);
    for arg in node.args() {
        header.push(' ');
        header.push_str(arg);
    }
    header.push('>');
    header
}

// ============================================================
// Source-preserving writer
// ============================================================

/// Render `nodes`, parsed from `source` and possibly edited since, reusing
/// the source text of every node that did not change.
///
/// Removed nodes take their own line with them; new nodes are written on
/// a line of their own, indented like the sibling before them.
pub fn write_source(source: &str, nodes: &[TreeNode]) -> String {
    let mut splicer = Splicer {
        source,
        out: String::new(),
        cursor: 0,
        fresh_last: false,
    };
    splicer.nodes(nodes, String::new());

    let tail = whitespace_before(source, splicer.cursor, source.len());
    if splicer.fresh_last && !tail.contains('\n') {
        splicer.out.push('\n');
    }
    splicer.out.push_str(tail);
    splicer.out
}

struct Splicer<'a> {
    source: &'a str,
    out: String,
    /// End of the last source text copied out
    cursor: usize,
    /// Whether the last thing written was rendered rather than copied
    fresh_last: bool,
}

impl Splicer<'_> {
    fn nodes(&mut self, nodes: &[TreeNode], mut indent: String) {
        for node in nodes {
            if node.kind() == NodeKind::Arg {
                continue;
            }
            match node.span {
                Some(span) => {
                    let gap = whitespace_before(self.source, self.cursor, span.start);
                    if let Some(found) = line_indent(self.source, span.start) {
                        indent = found.to_string();
                    }
                    self.copy_gap(gap);
                    self.cursor = span.start;
                    self.sourced(node, span.end, &indent);
                }
                None => self.fresh(node, &indent),
            }
        }
    }

    fn sourced(&mut self, node: &TreeNode, end: usize, indent: &str) {
        match (node.kind(), node.inner) {
            (NodeKind::Section, Some(inner)) => {
                if node.edited {
                    self.out.push_str(&section_header(node));
                } else {
                    self.copy(self.cursor, inner.start);
                }
                self.cursor = inner.start;
                self.fresh_last = false;

                self.nodes(&node.children, format!("{}{}", indent, INDENT));

                let gap = whitespace_before(self.source, self.cursor, inner.end);
                self.copy_gap(gap);
                self.copy(inner.end, end);
            }
            (NodeKind::Directive, _) if node.edited => {
                if let Some(line) = directive_line(node) {
                    self.out.push_str(&line);
                }
            }
            (NodeKind::Comment, _) if node.edited => {
                let mut text = String::new();
                write_nodes(&mut text, std::slice::from_ref(node), "");
                self.out.push_str(text.trim_end());
            }
            (NodeKind::Section, None) => {
                let mut text = String::new();
                write_nodes(&mut text, std::slice::from_ref(node), indent);
                self.out.push_str(text.trim());
            }
            _ => self.copy(self.cursor, end),
        }
        self.cursor = end;
        self.fresh_last = false;
    }

    fn fresh(&mut self, node: &TreeNode, indent: &str) {
        let mut text = String::new();
        write_nodes(&mut text, std::slice::from_ref(node), indent);
        if text.is_empty() {
            return;
        }
        if !self.out.is_empty() && !self.out.ends_with('\n') {
            self.out.push('\n');
        }
        self.out.push_str(text.trim_end_matches('\n'));
        self.fresh_last = true;
    }

    /// Whitespace leading up to a copied node; a rendered node before it
    /// needs a line break of its own
    fn copy_gap(&mut self, gap: &str) {
        if self.fresh_last && !gap.contains('\n') {
            self.out.push('\n');
        }
        self.out.push_str(gap);
    }

    fn copy(&mut self, start: usize, end: usize) {
        self.out.push_str(self.source.get(start..end).unwrap_or(""));
    }
}

/// Trailing whitespace of `source[from..to]`. Anything before it belonged
/// to nodes that are gone.
fn whitespace_before(source: &str, from: usize, to: usize) -> &str {
    let region = source.get(from..to).unwrap_or("");
    let kept = region.trim_end_matches([' ', '\t', '\x0c', '\r', '\n']);
    &region[kept.len()..]
}

/// Indentation of the line `at` is on, when only whitespace precedes it
fn line_indent(source: &str, at: usize) -> Option<&str> {
    let before = source.get(..at)?;
    let line_start = before.rfind('\n').map_or(0, |i| i + 1);
    let lead = &before[line_start..];
    lead.chars().all(|c| c == ' ' || c == '\t').then_some(lead)
}
