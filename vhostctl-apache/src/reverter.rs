//! Change journal for one configuration session
//!
//! Records created files, backed-up files and enabled sites so that a
//! session can be undone with [`Reverter::rollback`] or made permanent with
//! [`Reverter::commit`].

use crate::site::SiteUtility;
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info};
use vhostctl_core::{Error, Result};

/// Suffix appended to a file's path to name its backup
pub const BACKUP_SUFFIX: &str = ".back";

/// Journal of reversible changes
///
/// A path is never both slated for deletion and backed up.
#[derive(Debug, Default)]
pub struct Reverter {
    files_to_delete: Vec<PathBuf>,
    /// original -> backup
    files_to_restore: BTreeMap<PathBuf, PathBuf>,
    configs_to_disable: Vec<String>,
}

impl Reverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Backup location of `path`
    pub fn backup_path(path: &Path) -> PathBuf {
        let mut name = OsString::from(path.as_os_str());
        name.push(BACKUP_SUFFIX);
        PathBuf::from(name)
    }

    /// Remember a file created during the session
    pub fn add_file_to_delete(&mut self, path: &Path) {
        if self.files_to_restore.contains_key(path) {
            debug!("{} existed before this session, keeping its backup", path.display());
            return;
        }
        if !self.files_to_delete.iter().any(|p| p == path) {
            self.files_to_delete.push(path.to_path_buf());
        }
    }

    /// Remember a site enabled during the session
    pub fn add_site_config_to_disable(&mut self, config_name: &str) {
        if !self.configs_to_disable.iter().any(|c| c == config_name) {
            self.configs_to_disable.push(config_name.to_string());
        }
    }

    /// Copy `path` to its backup location, once per session
    pub fn backup_file(&mut self, path: &Path) -> Result<()> {
        if self.files_to_delete.iter().any(|p| p == path) {
            debug!("{} was created in this session, no backup needed", path.display());
            return Ok(());
        }
        if self.files_to_restore.contains_key(path) {
            debug!("{} is already backed up", path.display());
            return Ok(());
        }

        let backup = Self::backup_path(path);
        fs::copy(path, &backup).map_err(|e| {
            error!("❌ Could not back up {}: {}", path.display(), e);
            e
        })?;

        debug!("Backed up {} to {}", path.display(), backup.display());
        self.files_to_restore.insert(path.to_path_buf(), backup);
        Ok(())
    }

    /// Back up every file; the first failure stops and is returned
    pub fn backup_files(&mut self, paths: &[PathBuf]) -> Result<()> {
        for path in paths {
            self.backup_file(path)?;
        }
        Ok(())
    }

    /// Files created in this session
    pub fn files_to_delete(&self) -> &[PathBuf] {
        &self.files_to_delete
    }

    /// Files with a backup, mapped to the backup's path
    pub fn files_to_restore(&self) -> &BTreeMap<PathBuf, PathBuf> {
        &self.files_to_restore
    }

    pub fn configs_to_disable(&self) -> &[String] {
        &self.configs_to_disable
    }

    /// Every file a rollback would delete or restore
    pub fn touched_files(&self) -> Vec<PathBuf> {
        self.files_to_delete
            .iter()
            .chain(self.files_to_restore.keys())
            .cloned()
            .collect()
    }

    /// Keep the session's changes and drop the backups
    pub fn commit(&mut self) -> Result<()> {
        for backup in self.files_to_restore.values() {
            if let Err(e) = fs::remove_file(backup) {
                error!("❌ Could not remove backup {}: {}", backup.display(), e);
            }
        }

        info!(
            "Committed {} new and {} modified file(s)",
            self.files_to_delete.len(),
            self.files_to_restore.len()
        );
        self.files_to_delete.clear();
        self.files_to_restore.clear();
        self.configs_to_disable.clear();
        Ok(())
    }

    /// Undo the session: disable sites, delete created files, restore backups.
    ///
    /// Entries leave the journal only once their step succeeded, so a failed
    /// rollback can be retried.
    pub fn rollback(&mut self, site: &dyn SiteUtility) -> Result<()> {
        while let Some(config) = self.configs_to_disable.first() {
            site.disable(config)
                .map_err(|e| Error::Rollback(format!("could not disable site {}: {}", config, e)))?;
            debug!("Disabled site {}", config);
            self.configs_to_disable.remove(0);
        }

        while let Some(path) = self.files_to_delete.first() {
            if path.exists() {
                fs::remove_file(path).map_err(|e| {
                    Error::Rollback(format!("could not remove {}: {}", path.display(), e))
                })?;
                debug!("Removed {}", path.display());
            } else {
                debug!("{} is already gone", path.display());
            }
            self.files_to_delete.remove(0);
        }

        while let Some((path, backup)) = self.files_to_restore.first_key_value() {
            fs::copy(backup, path).map_err(|e| {
                Error::Rollback(format!(
                    "could not restore {} from {}: {}",
                    path.display(),
                    backup.display(),
                    e
                ))
            })?;
            if let Err(e) = fs::remove_file(backup) {
                error!("❌ Could not remove backup {}: {}", backup.display(), e);
            }
            debug!("Restored {}", path.display());

            let path = path.clone();
            self.files_to_restore.remove(&path);
        }

        info!("Rolled back configuration changes");
        Ok(())
    }
}
