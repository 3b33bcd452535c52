//! Transform bookkeeping: which files of which directories are loaded

use super::ConfigParser;
use crate::StoreContext;
use glob::{MatchOptions, Pattern};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::debug;
use vhostctl_core::Result;
use vhostctl_tree::TreeStore;

impl<S: TreeStore> ConfigParser<S> {
    /// Load `path` (a file or a glob) into the tree unless an existing
    /// transform already covers it
    pub fn parse_file(&mut self, path: &Path) -> Result<()> {
        if self.before_reload.is_some() {
            let unsaved = self.unsaved_files()?;
            if let Some(hook) = self.before_reload.as_mut() {
                hook(&unsaved);
            }
        }

        let (use_new, remove_old) = self.check_path(path);
        if !use_new {
            debug!("{} is already covered by a wildcard", path.display());
            return Ok(());
        }

        let pattern = path.to_string_lossy();
        if self.store.is_covered(&pattern) {
            return Ok(());
        }

        if remove_old {
            self.remove_transforms_for(path)?;
        }
        self.add_transform(path)?;
        self.store
            .load()
            .with_context(|| format!("loading {}", path.display()))
    }

    /// `(use_new, remove_old)` for a candidate transform. A wildcard
    /// replaces narrower patterns of its directory and makes later ones
    /// redundant.
    pub(crate) fn check_path(&self, path: &Path) -> (bool, bool) {
        let (dir, filename) = split_path(path);
        let Some(existing) = self.paths.get(&dir) else {
            return (true, false);
        };

        let remove_old = filename == "*";
        let use_new = !existing.iter().any(|name| name == "*");
        (use_new, remove_old)
    }

    fn add_transform(&mut self, path: &Path) -> Result<()> {
        self.store
            .add_transform(&path.to_string_lossy())
            .with_context(|| format!("adding a transform for {}", path.display()))?;

        let (dir, filename) = split_path(path);
        let names = self.paths.entry(dir).or_default();
        if !names.contains(&filename) {
            names.push(filename);
        }
        Ok(())
    }

    /// Drop every transform of `path`'s directory
    fn remove_transforms_for(&mut self, path: &Path) -> Result<()> {
        let (dir, _) = split_path(path);
        let Some(names) = self.paths.remove(&dir) else {
            return Ok(());
        };

        for name in names {
            let old = dir.join(&name);
            self.store
                .remove_transform(&old.to_string_lossy())
                .with_context(|| format!("removing the transform for {}", old.display()))?;
        }
        Ok(())
    }

    /// Whether a currently loaded pattern matches `path`
    pub fn is_filename_exist_in_current_paths(&self, path: &Path) -> bool {
        matches_any(&self.paths, path)
    }

    /// Whether a pattern of the configuration as first read (or an include
    /// added since) matches `path`
    pub fn is_filename_exist_in_original_paths(&self, path: &Path) -> bool {
        matches_any(&self.existing_paths, path)
    }

    /// Record `path` as included by the configuration
    pub(crate) fn add_existing_path(&mut self, path: &Path) {
        let (dir, filename) = split_path(path);
        let names = self.existing_paths.entry(dir).or_default();
        if !names.contains(&filename) {
            names.push(filename);
        }
    }
}

/// Directory and file name (or file pattern) of `path`
fn split_path(path: &Path) -> (PathBuf, String) {
    let dir = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    (dir, filename)
}

fn matches_any(paths: &BTreeMap<PathBuf, Vec<String>>, path: &Path) -> bool {
    let options = MatchOptions {
        require_literal_separator: true,
        ..MatchOptions::new()
    };

    paths.iter().any(|(dir, names)| {
        names.iter().any(|name| {
            let full = dir.join(name);
            full == path
                || Pattern::new(&full.to_string_lossy())
                    .map(|p| p.matches_path_with(path, options))
                    .unwrap_or(false)
        })
    })
}

#[cfg(test)]
mod tests {
    use crate::parser::ConfigParser;
    use crate::testing::{server_root, FakeCtl};
    use std::path::Path;
    use vhostctl_tree::{FileTreeStore, TreeStore};

    fn parser(root: &Path) -> ConfigParser<FileTreeStore> {
        ConfigParser::new(FileTreeStore::new(), &FakeCtl::default(), Some(root), None).unwrap()
    }

    #[test]
    fn test_check_path() {
        let (_dir, root) = server_root();
        let parser = parser(&root);

        // untracked directory
        assert_eq!(parser.check_path(&root.join("conf.d/ssl.conf")), (true, false));
        // narrower file next to a narrower pattern
        assert_eq!(parser.check_path(&root.join("sites-enabled/a.conf")), (true, false));
        // wildcard replaces what is there
        assert_eq!(parser.check_path(&root.join("sites-enabled/*")), (true, true));
    }

    #[test]
    fn test_wildcard_replaces_narrower_transforms() {
        let (_dir, root) = server_root();
        let mut parser = parser(&root);
        let available = root.join("sites-available");

        parser.parse_file(&available.join("other.org.conf")).unwrap();
        assert_eq!(parser.paths()[&available], vec!["other.org.conf"]);

        parser.parse_file(&available.join("*")).unwrap();
        assert_eq!(parser.paths()[&available], vec!["*"]);
        let transforms = parser.store().transforms();
        assert!(!transforms.iter().any(|t| t.ends_with("other.org.conf")));

        // covered by the wildcard: no-op
        parser.parse_file(&available.join("example.com.conf")).unwrap();
        assert_eq!(parser.paths()[&available], vec!["*"]);
        assert!(parser.store().is_covered(&available.join("example.com.conf").to_string_lossy()));
    }

    #[test]
    fn test_current_and_original_paths() {
        let (_dir, root) = server_root();
        let mut parser = parser(&root);
        let other = root.join("sites-available/other.org.conf");

        assert!(parser.is_filename_exist_in_original_paths(&root.join("sites-enabled/example.com.conf")));
        assert!(!parser.is_filename_exist_in_current_paths(&other));

        parser.parse_file(&other).unwrap();
        assert!(parser.is_filename_exist_in_current_paths(&other));
        assert!(!parser.is_filename_exist_in_original_paths(&other));

        // wildcards never cross directories
        assert!(!parser.is_filename_exist_in_current_paths(&root.join("sites-enabled/sub/x.conf")));
    }
}
