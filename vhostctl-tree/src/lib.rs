//! Vhostctl configuration tree
//!
//! This crate parses httpd configuration files into an editable tree and
//! writes them back.
//!
//! # Example
//!
//! ```rust,ignore
//! use vhostctl_tree::{FileTreeStore, Query, TreeStore};
//!
//! let mut store = FileTreeStore::new();
//! store.add_transform("/etc/apache2/apache2.conf")?;
//! store.load()?;
//!
//! let listens = store.find(&Query::Directives {
//!     scope: "/files/etc/apache2",
//!     names: &["Listen"],
//! })?;
//! ```

pub mod parser;
pub mod store;

pub use parser::{parse, write_source, write_tree, NodeKind, ParseError, TreeNode};
pub use store::{
    file_handle, FileTreeStore, ParseFailure, Query, Span, StoreError, StoreResult, TreeStore,
};
