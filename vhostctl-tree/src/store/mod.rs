//! Tree store abstraction
//!
//! The configurator talks to the configuration tree only through
//! [`TreeStore`]. Nodes are addressed by string handles (see [`path`]).
//! Every query returns handles in document order.

pub mod file_store;
pub mod path;

pub use file_store::FileTreeStore;
pub use path::{child_handle, file_handle, parent_handle, Segment, FILES_PREFIX};

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Store errors
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("No node matches '{0}'")]
    NoMatch(String),

    #[error("Invalid tree path '{0}'")]
    InvalidPath(String),

    #[error("Node '{0}' has no source span")]
    NoSpan(String),

    #[error("Invalid pattern '{pattern}': {message}")]
    Pattern { pattern: String, message: String },

    #[error("IO error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// Byte range of a node inside its source file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Span {
    pub file: PathBuf,
    pub start: usize,
    pub end: usize,
}

/// A file the store failed to parse
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseFailure {
    /// Error handle, `/augeas/files<file>/error`
    pub path: String,
    pub file: PathBuf,
    pub message: String,
    /// Rendered diagnostic with the offending line
    pub report: String,
}

impl ParseFailure {
    pub fn handle_for(file: &Path) -> String {
        format!("/augeas{}/error", file_handle(file))
    }
}

/// Node queries
#[derive(Debug, Clone, Copy)]
pub enum Query<'a> {
    /// Directives whose name is one of `names` (case-insensitive),
    /// anywhere below `scope`
    Directives { scope: &'a str, names: &'a [&'a str] },

    /// Argument nodes of `node`, optionally filtered by a regex matched
    /// case-insensitively against the whole value
    Args { node: &'a str, pattern: Option<&'a str> },

    /// Sections labelled `label` (case-insensitive) anywhere below `scope`
    Blocks { scope: &'a str, label: &'a str },

    /// Direct children of `scope` labelled `label`, optionally only those
    /// whose first argument equals `arg`
    Children { scope: &'a str, label: &'a str, arg: Option<&'a str> },

    /// Root handles of loaded files whose path matches the regex `pattern`
    Files { pattern: &'a str },
}

/// Hierarchical view of the configuration files
///
/// A `scope` may be a node handle, a file handle, or a directory handle
/// (`/files/etc/apache2`), the last one covering every loaded file below it.
pub trait TreeStore {
    /// Handles matching `query`, in document order
    fn find(&self, query: &Query<'_>) -> StoreResult<Vec<String>>;

    /// Value of the node at `path`
    fn get(&self, path: &str) -> StoreResult<Option<String>>;

    /// Set the value of the node at `path`
    fn set(&mut self, path: &str, value: &str) -> StoreResult<()>;

    /// Insert a sibling of `path` labelled `label`, before or after it
    fn insert(&mut self, path: &str, label: &str, before: bool) -> StoreResult<String>;

    /// Append a child labelled `label` to `parent`
    fn append(&mut self, parent: &str, label: &str) -> StoreResult<String>;

    /// Remove the node at `path`; returns how many nodes were removed
    fn remove(&mut self, path: &str) -> StoreResult<usize>;

    /// (Re)load every file covered by a transform
    fn load(&mut self) -> StoreResult<()>;

    /// Write modified files back to disk
    fn save(&mut self) -> StoreResult<()>;

    /// Source location of the node at `path`
    fn span(&self, path: &str) -> StoreResult<Span>;

    /// Files with in-memory modifications
    fn unsaved_files(&self) -> StoreResult<Vec<PathBuf>>;

    /// Parse failures, minus those whose error handle is in `exclude`
    fn errors(&self, exclude: &[String]) -> Vec<ParseFailure>;

    /// Register a glob of files to load
    fn add_transform(&mut self, pattern: &str) -> StoreResult<()>;

    fn remove_transform(&mut self, pattern: &str) -> StoreResult<()>;

    /// Whether `file` is matched by a registered transform
    fn is_covered(&self, file: &str) -> bool;

    /// Force `file` to be re-read by the next [`TreeStore::load`]
    fn invalidate(&mut self, file: &Path);

    /// File that contains the node at `path`
    fn file_of(&self, path: &str) -> Option<PathBuf>;
}
