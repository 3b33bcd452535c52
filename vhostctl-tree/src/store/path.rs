//! Tree path handles
//!
//! A handle looks like `/files/etc/apache2/ports.conf/IfModule[2]/directive`:
//! the `/files` prefix, the absolute file path, then one segment per level.
//! A segment carries an explicit 1-based index only when the parent has
//! more than one child with the same label.

use crate::parser::TreeNode;
use std::fmt;
use std::path::Path;

/// Prefix of every file handle
pub const FILES_PREFIX: &str = "/files";

/// Handle of a file's root
pub fn file_handle(file: &Path) -> String {
    format!("{}{}", FILES_PREFIX, file.display())
}

/// One `label[index]` step of a handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    pub label: String,
    pub index: Option<usize>,
}

impl Segment {
    /// Parse `label` or `label[n]`
    pub fn parse(raw: &str) -> Option<Self> {
        match raw.strip_suffix(']').and_then(|r| r.rsplit_once('[')) {
            Some((label, index)) => {
                let index: usize = index.parse().ok()?;
                if label.is_empty() || index == 0 {
                    return None;
                }
                Some(Self {
                    label: label.to_string(),
                    index: Some(index),
                })
            }
            None if !raw.is_empty() => Some(Self {
                label: raw.to_string(),
                index: None,
            }),
            None => None,
        }
    }

    /// Position of the selected node among `siblings`
    pub fn select(&self, siblings: &[TreeNode]) -> Option<usize> {
        let nth = self.index.unwrap_or(1);
        siblings
            .iter()
            .enumerate()
            .filter(|(_, n)| n.label == self.label)
            .nth(nth - 1)
            .map(|(i, _)| i)
    }
}

impl fmt::Display for Segment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.index {
            Some(i) => write!(f, "{}[{}]", self.label, i),
            None => write!(f, "{}", self.label),
        }
    }
}

/// Handle of `siblings[position]` below `parent`
pub fn child_handle(parent: &str, siblings: &[TreeNode], position: usize) -> String {
    let label = &siblings[position].label;
    let mut same = 0;
    let mut ordinal = 0;
    for (i, node) in siblings.iter().enumerate() {
        if node.label == *label {
            same += 1;
            if i == position {
                ordinal = same;
            }
        }
    }

    if same > 1 {
        format!("{}/{}[{}]", parent, label, ordinal)
    } else {
        format!("{}/{}", parent, label)
    }
}

/// Parent of a handle (`/files/a/b/c` -> `/files/a/b`)
pub fn parent_handle(handle: &str) -> &str {
    handle.rsplit_once('/').map(|(p, _)| p).unwrap_or("")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_segment_parse() {
        assert_eq!(
            Segment::parse("VirtualHost[2]"),
            Some(Segment { label: "VirtualHost".into(), index: Some(2) })
        );
        assert_eq!(
            Segment::parse("directive"),
            Some(Segment { label: "directive".into(), index: None })
        );
        assert_eq!(Segment::parse("arg[0]"), None);
        assert_eq!(Segment::parse(""), None);
    }

    #[test]
    fn test_child_handle_indexes_duplicates_only() {
        let siblings = vec![
            TreeNode::new("directive"),
            TreeNode::new("IfModule"),
            TreeNode::new("directive"),
        ];
        assert_eq!(child_handle("/files/a.conf", &siblings, 0), "/files/a.conf/directive[1]");
        assert_eq!(child_handle("/files/a.conf", &siblings, 1), "/files/a.conf/IfModule");
        assert_eq!(child_handle("/files/a.conf", &siblings, 2), "/files/a.conf/directive[2]");
    }

    #[test]
    fn test_select() {
        let siblings = vec![
            TreeNode::new("arg"),
            TreeNode::new("directive"),
            TreeNode::new("directive"),
        ];
        assert_eq!(Segment::parse("directive").unwrap().select(&siblings), Some(1));
        assert_eq!(Segment::parse("directive[2]").unwrap().select(&siblings), Some(2));
        assert_eq!(Segment::parse("directive[3]").unwrap().select(&siblings), None);
    }

    #[test]
    fn test_parent_handle() {
        assert_eq!(parent_handle("/files/etc/a.conf/directive[2]"), "/files/etc/a.conf");
        assert_eq!(file_handle(Path::new("/etc/a.conf")), "/files/etc/a.conf");
    }
}
