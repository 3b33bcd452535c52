//! File-backed tree store
//!
//! Parses every file matched by a registered glob into memory, edits the
//! trees in place and writes modified files back on save.

use crate::parser::{parse, write_source, NodeKind, TreeNode, ARG};
use crate::store::path::{child_handle, file_handle, parent_handle, Segment, FILES_PREFIX};
use crate::store::{ParseFailure, Query, Span, StoreError, StoreResult, TreeStore};
use glob::{MatchOptions, Pattern};
use regex::RegexBuilder;
use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, warn};

/// Size and mtime of a file when it was parsed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct FileStamp {
    modified: Option<SystemTime>,
    len: u64,
}

impl FileStamp {
    fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        Some(Self {
            modified: meta.modified().ok(),
            len: meta.len(),
        })
    }
}

#[derive(Debug)]
struct LoadedFile {
    nodes: Vec<TreeNode>,
    /// Text the nodes' spans point into
    source: String,
    dirty: bool,
    stamp: Option<FileStamp>,
}

/// In-memory tree over a set of configuration files
#[derive(Debug, Default)]
pub struct FileTreeStore {
    transforms: Vec<String>,
    files: BTreeMap<PathBuf, LoadedFile>,
    failures: BTreeMap<PathBuf, ParseFailure>,
    stale: BTreeSet<PathBuf>,
}

impl FileTreeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registered globs
    pub fn transforms(&self) -> &[String] {
        &self.transforms
    }

    /// Loaded files, sorted
    pub fn files(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }

    /// Split a handle into its file and the segments below the file root.
    /// `None` when no loaded file contains the handle.
    fn locate(&self, path: &str) -> StoreResult<Option<(PathBuf, Vec<Segment>)>> {
        let rest = path
            .strip_prefix(FILES_PREFIX)
            .ok_or_else(|| StoreError::InvalidPath(path.to_string()))?;

        let mut best: Option<(&PathBuf, usize)> = None;
        for file in self.files.keys() {
            let key = file.to_string_lossy();
            let hit = rest == key || (rest.starts_with(&*key) && rest[key.len()..].starts_with('/'));
            if hit && best.is_none_or(|(_, len)| key.len() > len) {
                best = Some((file, key.len()));
            }
        }

        let Some((file, len)) = best else {
            return Ok(None);
        };

        let segments = rest[len..]
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| Segment::parse(s).ok_or_else(|| StoreError::InvalidPath(path.to_string())))
            .collect::<StoreResult<Vec<_>>>()?;

        Ok(Some((file.clone(), segments)))
    }

    fn resolve(&self, path: &str) -> StoreResult<(PathBuf, Vec<Segment>)> {
        self.locate(path)?
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))
    }

    fn node(&self, path: &str) -> StoreResult<(PathBuf, &TreeNode)> {
        let (file, segments) = self.resolve(path)?;
        let node = self
            .files
            .get(&file)
            .and_then(|f| node_at(&f.nodes, &segments))
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;
        Ok((file, node))
    }

    /// `(handle, children)` pairs a scope covers
    fn scope_roots(&self, scope: &str) -> StoreResult<Vec<(String, &[TreeNode])>> {
        let scope = scope.trim_end_matches('/');
        if let Some((file, segments)) = self.locate(scope)? {
            let roots = self
                .files
                .get(&file)
                .and_then(|f| children_of(&f.nodes, &segments))
                .map(|children| vec![(scope.to_string(), children)])
                .unwrap_or_default();
            return Ok(roots);
        }

        // Not inside a file: treat it as a directory
        let dir = scope
            .strip_prefix(FILES_PREFIX)
            .ok_or_else(|| StoreError::InvalidPath(scope.to_string()))?;
        let prefix = format!("{}/", dir);
        Ok(self
            .files
            .iter()
            .filter(|(file, _)| file.to_string_lossy().starts_with(&prefix))
            .map(|(file, loaded)| (file_handle(file), loaded.nodes.as_slice()))
            .collect())
    }

    fn collect_below<F>(&self, scope: &str, pred: F) -> StoreResult<Vec<String>>
    where
        F: Fn(&TreeNode) -> bool,
    {
        let mut out = Vec::new();
        for (base, nodes) in self.scope_roots(scope)? {
            collect(&base, nodes, &pred, &mut out);
        }
        Ok(out)
    }

    fn record_failure(&mut self, file: &Path, message: String, report: String) {
        warn!("Failed to parse {}: {}", file.display(), message);
        self.files.remove(file);
        self.failures.insert(
            file.to_path_buf(),
            ParseFailure {
                path: ParseFailure::handle_for(file),
                file: file.to_path_buf(),
                message,
                report,
            },
        );
    }

    fn load_file(&mut self, file: &Path) {
        let stamp = FileStamp::of(file);
        let source = match fs::read_to_string(file) {
            Ok(source) => source,
            Err(e) => {
                let message = e.to_string();
                self.record_failure(file, message.clone(), message);
                return;
            }
        };

        match parse(&source) {
            Ok(nodes) => {
                debug!("Loaded {} ({} top-level nodes)", file.display(), nodes.len());
                self.failures.remove(file);
                self.files.insert(
                    file.to_path_buf(),
                    LoadedFile {
                        nodes,
                        source,
                        dirty: false,
                        stamp,
                    },
                );
            }
            Err(e) => {
                let report = e.report(&file.to_string_lossy(), &source);
                self.record_failure(file, e.to_string(), report);
            }
        }
    }
}

// ============================================================
// Node navigation
// ============================================================

fn node_at<'a>(nodes: &'a [TreeNode], segments: &[Segment]) -> Option<&'a TreeNode> {
    let (first, rest) = segments.split_first()?;
    let node = &nodes[first.select(nodes)?];
    if rest.is_empty() {
        Some(node)
    } else {
        node_at(&node.children, rest)
    }
}

fn node_at_mut<'a>(nodes: &'a mut [TreeNode], segments: &[Segment]) -> Option<&'a mut TreeNode> {
    let (first, rest) = segments.split_first()?;
    let index = first.select(nodes)?;
    let node = &mut nodes[index];
    if rest.is_empty() {
        Some(node)
    } else {
        node_at_mut(&mut node.children, rest)
    }
}

/// Flag the directive or section at `segments` as needing a re-render,
/// after one of its arguments changed
fn mark_edited(nodes: &mut [TreeNode], segments: &[Segment]) {
    if let Some(owner) = node_at_mut(nodes, segments) {
        owner.edited = true;
    }
}

fn children_of<'a>(nodes: &'a [TreeNode], segments: &[Segment]) -> Option<&'a [TreeNode]> {
    if segments.is_empty() {
        Some(nodes)
    } else {
        node_at(nodes, segments).map(|n| n.children.as_slice())
    }
}

fn children_of_mut<'a>(
    nodes: &'a mut Vec<TreeNode>,
    segments: &[Segment],
) -> Option<&'a mut Vec<TreeNode>> {
    if segments.is_empty() {
        Some(nodes)
    } else {
        node_at_mut(nodes, segments).map(|n| &mut n.children)
    }
}

/// Depth-first, document-order walk collecting matching handles
fn collect<F>(base: &str, nodes: &[TreeNode], pred: &F, out: &mut Vec<String>)
where
    F: Fn(&TreeNode) -> bool,
{
    for (i, node) in nodes.iter().enumerate() {
        if node.kind() == NodeKind::Arg {
            continue;
        }
        let handle = child_handle(base, nodes, i);
        if pred(node) {
            out.push(handle.clone());
        }
        if node.kind() == NodeKind::Section {
            collect(&handle, &node.children, pred, out);
        }
    }
}

fn pattern_error(pattern: &str, message: impl ToString) -> StoreError {
    StoreError::Pattern {
        pattern: pattern.to_string(),
        message: message.to_string(),
    }
}

fn glob_options() -> MatchOptions {
    MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    }
}

impl TreeStore for FileTreeStore {
    fn find(&self, query: &Query<'_>) -> StoreResult<Vec<String>> {
        match *query {
            Query::Directives { scope, names } => self.collect_below(scope, |node| {
                names.iter().any(|name| node.is_directive_named(name))
            }),

            Query::Blocks { scope, label } => self.collect_below(scope, |node| {
                node.kind() == NodeKind::Section && node.label.eq_ignore_ascii_case(label)
            }),

            Query::Args { node, pattern } => {
                let regex = pattern
                    .map(|p| {
                        RegexBuilder::new(&format!("^(?:{})$", p))
                            .case_insensitive(true)
                            .build()
                            .map_err(|e| pattern_error(p, e))
                    })
                    .transpose()?;

                let base = node.trim_end_matches('/');
                let Some((file, segments)) = self.locate(base)? else {
                    return Ok(Vec::new());
                };
                let Some(children) = self
                    .files
                    .get(&file)
                    .and_then(|f| node_at(&f.nodes, &segments))
                    .map(|n| n.children.as_slice())
                else {
                    return Ok(Vec::new());
                };

                Ok(children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.kind() == NodeKind::Arg)
                    .filter(|(_, c)| match (&regex, c.value.as_deref()) {
                        (Some(re), Some(value)) => re.is_match(value),
                        (Some(_), None) => false,
                        (None, _) => true,
                    })
                    .map(|(i, _)| child_handle(base, children, i))
                    .collect())
            }

            Query::Children { scope, label, arg } => {
                let base = scope.trim_end_matches('/');
                let Some((file, segments)) = self.locate(base)? else {
                    return Ok(Vec::new());
                };
                let Some(children) = self
                    .files
                    .get(&file)
                    .and_then(|f| children_of(&f.nodes, &segments))
                else {
                    return Ok(Vec::new());
                };

                Ok(children
                    .iter()
                    .enumerate()
                    .filter(|(_, c)| c.label.eq_ignore_ascii_case(label))
                    .filter(|(_, c)| arg.is_none_or(|a| c.args().next() == Some(a)))
                    .map(|(i, _)| child_handle(base, children, i))
                    .collect())
            }

            Query::Files { pattern } => {
                let regex = RegexBuilder::new(&format!("^(?:{})$", pattern))
                    .build()
                    .map_err(|e| pattern_error(pattern, e))?;
                Ok(self
                    .files
                    .keys()
                    .filter(|file| regex.is_match(&file.to_string_lossy()))
                    .map(|file| file_handle(file))
                    .collect())
            }
        }
    }

    fn get(&self, path: &str) -> StoreResult<Option<String>> {
        let (_, segments) = self.resolve(path)?;
        if segments.is_empty() {
            return Ok(None);
        }
        let (_, node) = self.node(path)?;
        Ok(node.value.clone())
    }

    fn set(&mut self, path: &str, value: &str) -> StoreResult<()> {
        let (file, segments) = self.resolve(path)?;
        let loaded = self
            .files
            .get_mut(&file)
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;
        let node = node_at_mut(&mut loaded.nodes, &segments)
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;
        node.value = Some(value.to_string());
        node.edited = true;
        if node.kind() == NodeKind::Arg {
            if let Some((_, owner)) = segments.split_last() {
                mark_edited(&mut loaded.nodes, owner);
            }
        }
        loaded.dirty = true;
        Ok(())
    }

    fn insert(&mut self, path: &str, label: &str, before: bool) -> StoreResult<String> {
        let (file, segments) = self.resolve(path)?;
        let Some((last, parents)) = segments.split_last() else {
            return Err(StoreError::InvalidPath(path.to_string()));
        };

        let loaded = self
            .files
            .get_mut(&file)
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;
        let siblings = children_of_mut(&mut loaded.nodes, parents)
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;
        let at = last
            .select(siblings)
            .ok_or_else(|| StoreError::NoMatch(path.to_string()))?;

        let position = if before { at } else { at + 1 };
        siblings.insert(position, TreeNode::new(label));
        let handle = child_handle(parent_handle(path), siblings, position);
        if label == ARG {
            mark_edited(&mut loaded.nodes, parents);
        }
        loaded.dirty = true;
        Ok(handle)
    }

    fn append(&mut self, parent: &str, label: &str) -> StoreResult<String> {
        let parent = parent.trim_end_matches('/');
        let (file, segments) = self.resolve(parent)?;

        let loaded = self
            .files
            .get_mut(&file)
            .ok_or_else(|| StoreError::NoMatch(parent.to_string()))?;
        let children = children_of_mut(&mut loaded.nodes, &segments)
            .ok_or_else(|| StoreError::NoMatch(parent.to_string()))?;

        children.push(TreeNode::new(label));
        let handle = child_handle(parent, children, children.len() - 1);
        if label == ARG {
            mark_edited(&mut loaded.nodes, &segments);
        }
        loaded.dirty = true;
        Ok(handle)
    }

    fn remove(&mut self, path: &str) -> StoreResult<usize> {
        let Some((file, segments)) = self.locate(path)? else {
            return Ok(0);
        };

        let Some((last, parents)) = segments.split_last() else {
            // Dropping a file root forgets the whole file until the next load
            self.files.remove(&file);
            return Ok(1);
        };

        let Some(loaded) = self.files.get_mut(&file) else {
            return Ok(0);
        };
        let Some(siblings) = children_of_mut(&mut loaded.nodes, parents) else {
            return Ok(0);
        };
        let Some(at) = last.select(siblings) else {
            return Ok(0);
        };

        let removed = siblings.remove(at);
        if removed.kind() == NodeKind::Arg {
            mark_edited(&mut loaded.nodes, parents);
        }
        loaded.dirty = true;
        Ok(1)
    }

    fn load(&mut self) -> StoreResult<()> {
        let mut wanted = BTreeSet::new();
        for transform in &self.transforms {
            let paths = glob::glob(transform).map_err(|e| pattern_error(transform, e))?;
            for entry in paths {
                match entry {
                    Ok(path) if path.is_file() => {
                        wanted.insert(path);
                    }
                    Ok(_) => {}
                    Err(e) => debug!("Skipping unreadable glob entry: {}", e),
                }
            }
        }

        self.files.retain(|file, _| wanted.contains(file));
        self.failures.retain(|file, _| wanted.contains(file));

        for file in wanted {
            let reload = match self.files.get(&file) {
                // new, or failed to parse last time
                None => true,
                Some(loaded) => {
                    self.stale.contains(&file)
                        || (!loaded.dirty && loaded.stamp != FileStamp::of(&file))
                }
            };
            if reload {
                self.stale.remove(&file);
                self.load_file(&file);
            }
        }

        Ok(())
    }

    fn save(&mut self) -> StoreResult<()> {
        for (file, loaded) in self.files.iter_mut().filter(|(_, l)| l.dirty) {
            let text = write_source(&loaded.source, &loaded.nodes);
            fs::write(file, &text).map_err(|source| StoreError::Io {
                path: file.clone(),
                source,
            })?;

            // Re-read what was written so that spans point into the new text
            match parse(&text) {
                Ok(nodes) => {
                    loaded.nodes = nodes;
                    loaded.source = text;
                }
                Err(e) => {
                    warn!("Saved {} does not parse back: {}", file.display(), e);
                    self.stale.insert(file.clone());
                }
            }
            loaded.dirty = false;
            loaded.stamp = FileStamp::of(file);
            debug!("Saved {}", file.display());
        }
        Ok(())
    }

    fn span(&self, path: &str) -> StoreResult<Span> {
        let (file, node) = self.node(path)?;
        let location = node
            .span
            .ok_or_else(|| StoreError::NoSpan(path.to_string()))?;
        Ok(Span {
            file,
            start: location.start,
            end: location.end,
        })
    }

    fn unsaved_files(&self) -> StoreResult<Vec<PathBuf>> {
        Ok(self
            .files
            .iter()
            .filter(|(_, l)| l.dirty)
            .map(|(file, _)| file.clone())
            .collect())
    }

    fn errors(&self, exclude: &[String]) -> Vec<ParseFailure> {
        self.failures
            .values()
            .filter(|f| !exclude.contains(&f.path))
            .cloned()
            .collect()
    }

    fn add_transform(&mut self, pattern: &str) -> StoreResult<()> {
        Pattern::new(pattern).map_err(|e| pattern_error(pattern, e))?;
        if !self.transforms.iter().any(|t| t == pattern) {
            debug!("Adding transform {}", pattern);
            self.transforms.push(pattern.to_string());
        }
        Ok(())
    }

    fn remove_transform(&mut self, pattern: &str) -> StoreResult<()> {
        self.transforms.retain(|t| t != pattern);
        Ok(())
    }

    fn is_covered(&self, file: &str) -> bool {
        self.transforms.iter().any(|t| {
            t == file
                || Pattern::new(t)
                    .map(|p| p.matches_with(file, glob_options()))
                    .unwrap_or(false)
        })
    }

    fn invalidate(&mut self, file: &Path) {
        self.stale.insert(file.to_path_buf());
    }

    fn file_of(&self, path: &str) -> Option<PathBuf> {
        self.locate(path).ok().flatten().map(|(file, _)| file)
    }
}
