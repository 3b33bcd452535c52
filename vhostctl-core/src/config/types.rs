//! Configuration type definitions
//!
//! These types describe how the configurator finds and drives the
//! web server it manages.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// Configurator options
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Options {
    /// Server root directory (first existing well-known default when unset)
    pub server_root: Option<PathBuf>,

    /// Directory holding virtual host files, also the home of cloned SSL hosts
    pub vhost_root: Option<PathBuf>,

    /// Glob of the files under `vhost_root` that are parsed into the tree
    pub vhost_files: String,

    /// Control binary (name on PATH or absolute path)
    pub ctl: String,

    /// Suffix of files created for SSL hosts, replaces a trailing `.conf`
    pub ssl_vhost_ext: String,

    /// Site enabling utility
    pub ensite: String,

    /// Site disabling utility
    pub dissite: String,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            server_root: None,
            vhost_root: None,
            vhost_files: default_vhost_files(),
            ctl: "apache2ctl".to_string(),
            ssl_vhost_ext: "-ssl.conf".to_string(),
            ensite: "a2ensite".to_string(),
            dissite: "a2dissite".to_string(),
        }
    }
}

fn default_vhost_files() -> String {
    "*".to_string()
}

/// Legacy option keys accepted by [`Options::apply_overrides`]
pub mod keys {
    pub const SERVER_ROOT: &str = "SERVER_ROOT";
    pub const VHOST_ROOT: &str = "VHOST_ROOT";
    pub const VHOST_FILES: &str = "VHOST_FILES";
    pub const CTL: &str = "CTL";
    pub const SSL_VHOST_EXT: &str = "SSL_VHOST_EXT";
    pub const APACHE_ENSITE: &str = "APACHE_ENSITE";
    pub const APACHE_DISSITE: &str = "APACHE_DISSITE";
}

impl Options {
    /// Apply a flat `KEY -> value` map on top of these options.
    ///
    /// Empty values for the root directories clear them. Unknown keys are
    /// ignored with a debug log.
    pub fn apply_overrides(&mut self, overrides: &HashMap<String, String>) {
        for (key, value) in overrides {
            match key.as_str() {
                keys::SERVER_ROOT => self.server_root = non_empty_path(value),
                keys::VHOST_ROOT => self.vhost_root = non_empty_path(value),
                keys::VHOST_FILES => self.vhost_files = value.clone(),
                keys::CTL => self.ctl = value.clone(),
                keys::SSL_VHOST_EXT => self.ssl_vhost_ext = value.clone(),
                keys::APACHE_ENSITE => self.ensite = value.clone(),
                keys::APACHE_DISSITE => self.dissite = value.clone(),
                other => tracing::debug!("Ignoring unknown option '{}'", other),
            }
        }
    }

    /// Glob of vhost files to parse, when a vhost root is configured
    pub fn vhost_files_pattern(&self) -> Option<PathBuf> {
        match &self.vhost_root {
            Some(root) if !self.vhost_files.is_empty() => Some(root.join(&self.vhost_files)),
            _ => None,
        }
    }
}

fn non_empty_path(value: &str) -> Option<PathBuf> {
    if value.is_empty() {
        None
    } else {
        Some(PathBuf::from(value))
    }
}
