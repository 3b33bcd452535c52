//! Virtual host discovery and selection

use super::Configurator;
use crate::address::Address;
use crate::ctl::ControlProcess;
use crate::site::SiteUtility;
use crate::vhost::{VhostId, VirtualHost};
use crate::StoreContext;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::PathBuf;
use tracing::{debug, error, info, warn};
use vhostctl_core::{Error, Result};
use vhostctl_tree::{file_handle, Query, TreeStore};

impl<S: TreeStore, C: ControlProcess, U: SiteUtility> Configurator<S, C, U> {
    /// Every host in the configuration, discovered on first use
    pub fn get_vhosts(&mut self) -> Result<&[VirtualHost]> {
        if self.vhosts.is_none() {
            let found = self.discover_vhosts()?;
            info!("Found {} virtual host(s)", found.len());
            self.vhosts = Some(found);
        }
        Ok(self.vhosts.as_deref().unwrap_or_default())
    }

    /// Walk every tracked directory for `<VirtualHost>` blocks. Hosts
    /// reached through several paths (symlinks) are reported once.
    fn discover_vhosts(&mut self) -> Result<Vec<VirtualHost>> {
        let dirs: Vec<PathBuf> = self.parser.paths().keys().cloned().collect();
        let mut index = VhostIndex::default();

        for dir in dirs {
            let scope = file_handle(&dir);
            let blocks = match self
                .parser
                .store()
                .find(&Query::Blocks { scope: &scope, label: "VirtualHost" })
            {
                Ok(blocks) => blocks,
                Err(e) => {
                    warn!("Could not search {} for virtual hosts: {}", dir.display(), e);
                    continue;
                }
            };

            for path in blocks {
                let vhost = match self.create_vhost(&path) {
                    Ok(vhost) => vhost,
                    Err(e) => {
                        error!("❌ Could not read virtual host {}: {}", path, e);
                        continue;
                    }
                };
                let real = match fs::canonicalize(&vhost.file_path) {
                    Ok(real) => real,
                    Err(e) => {
                        error!("❌ Could not resolve {}: {}", vhost.file_path.display(), e);
                        continue;
                    }
                };
                index.observe(vhost, real);
            }
        }

        Ok(index.into_vhosts())
    }

    /// Build a [`VirtualHost`] from the block at `path`
    pub fn create_vhost(&mut self, path: &str) -> Result<VirtualHost> {
        let file_path = self
            .parser
            .store()
            .file_of(path)
            .ok_or_else(|| Error::Resolution(format!("{} is not inside a loaded file", path)))?;

        let args = self
            .parser
            .store()
            .find(&Query::Args { node: path, pattern: None })
            .with_context(|| format!("reading the addresses of {}", path))?;
        let mut addresses = BTreeMap::new();
        for arg in &args {
            let address = Address::parse(&self.parser.resolve_argument(arg)?);
            addresses.insert(address.hash_key(), address);
        }

        let ssl_engine = self.parser.find_directive("SSLEngine", Some("on"), Some(path), false)?;
        let ssl = !ssl_engine.is_empty() || addresses.values().any(|a| a.port == "443");

        let mod_macro = inside_macro(path);
        let enabled = self.parser.is_filename_exist_in_original_paths(&file_path);
        let doc_root = self.document_root(path)?;

        let mut vhost = VirtualHost {
            file_path,
            server_name: String::new(),
            doc_root,
            tree_path: path.to_string(),
            addresses,
            aliases: Vec::new(),
            ssl,
            enabled,
            mod_macro,
            ancestor: None,
        };

        // Names inside a macro are placeholders
        if !mod_macro {
            self.add_server_names(&mut vhost)?;
        }

        debug!("Read virtual host {} ({})", vhost.server_name, path);
        Ok(vhost)
    }

    fn document_root(&mut self, path: &str) -> Result<String> {
        let roots = self.parser.find_directive("DocumentRoot", None, Some(path), false)?;
        let Some(last) = roots.last() else {
            return Ok(String::new());
        };

        let root = self.parser.resolve_argument(last)?;
        if root.is_empty() || root.starts_with('/') {
            return Ok(root);
        }
        Ok(self.parser.server_root().join(root).to_string_lossy().into_owned())
    }

    fn add_server_names(&mut self, vhost: &mut VirtualHost) -> Result<()> {
        let names = self
            .parser
            .find_directive("ServerName", None, Some(&vhost.tree_path), false)?;
        if let Some(last) = names.last() {
            vhost.server_name = self.parser.resolve_argument(last)?;
        }

        let aliases = self
            .parser
            .find_directive("ServerAlias", None, Some(&vhost.tree_path), false)?;
        for alias in &aliases {
            vhost.aliases.push(self.parser.resolve_argument(alias)?);
        }
        Ok(())
    }

    /// Host whose `ServerName` is `server_name`: an SSL one if any, else
    /// the last plaintext match
    pub fn find_suitable_vhost(&mut self, server_name: &str) -> Result<Option<VhostId>> {
        self.get_vhosts()?;

        let mut suitable = None;
        for (id, vhost) in self.vhosts.iter().flatten().enumerate() {
            if vhost.mod_macro {
                warn!("Skipping {}: hosts defined in a Macro are not supported", vhost.tree_path);
                continue;
            }
            if vhost.server_name == server_name {
                if vhost.ssl {
                    return Ok(Some(id));
                }
                suitable = Some(id);
            }
        }
        Ok(suitable)
    }

    /// The host to configure for `server_name`. With `create_if_no_ssl`, a
    /// plaintext match is cloned into an SSL host first.
    pub fn get_suitable_vhost(&mut self, server_name: &str, create_if_no_ssl: bool) -> Result<VhostId> {
        if let Some(id) = self.suitable_vhosts.get(server_name) {
            return Ok(*id);
        }

        let id = self.find_suitable_vhost(server_name)?.ok_or_else(|| {
            Error::Resolution(format!(
                "could not find a virtual host with ServerName {}",
                server_name
            ))
        })?;

        if !create_if_no_ssl {
            return Ok(id);
        }

        let id = if self.vhost(id)?.ssl {
            id
        } else {
            self.make_vhost_ssl(id).inspect_err(|e| {
                error!("❌ Could not create an SSL host for {}: {}", server_name, e);
            })?
        };

        self.suitable_vhosts.insert(server_name.to_string(), id);
        Ok(id)
    }
}

/// Deduplicates hosts seen through several file paths
#[derive(Default)]
struct VhostIndex {
    vhosts: Vec<VirtualHost>,
    /// Resolved path -> file path the kept hosts were read from
    representative: HashMap<PathBuf, PathBuf>,
    /// Resolved path -> block paths inside the file already kept
    internal: HashMap<PathBuf, HashSet<String>>,
}

impl VhostIndex {
    fn observe(&mut self, vhost: VirtualHost, real: PathBuf) {
        let internal = internal_path(&vhost);

        match self.representative.get(&real) {
            None => {
                self.representative.insert(real.clone(), vhost.file_path.clone());
                self.internal.entry(real).or_default().insert(internal);
                self.vhosts.push(vhost);
            }
            // The real file wins over any symlink seen before it
            Some(seen) if vhost.file_path == real && *seen != real => {
                let seen = seen.clone();
                self.vhosts.retain(|v| v.file_path != seen);
                self.representative.insert(real.clone(), real.clone());
                self.internal.insert(real, HashSet::from([internal]));
                self.vhosts.push(vhost);
            }
            Some(seen) if vhost.file_path == *seen => {
                if self.internal.entry(real).or_default().insert(internal) {
                    self.vhosts.push(vhost);
                }
            }
            Some(_) => debug!("{} duplicates a known host", vhost.tree_path),
        }
    }

    fn into_vhosts(self) -> Vec<VirtualHost> {
        self.vhosts
    }
}

/// Block path below the file root, e.g. `/IfModule/VirtualHost[2]`
fn internal_path(vhost: &VirtualHost) -> String {
    let root = file_handle(&vhost.file_path);
    vhost
        .tree_path
        .strip_prefix(&root)
        .unwrap_or(&vhost.tree_path)
        .to_string()
}

/// Whether the handle runs through a `<Macro>` block, indexed or not
fn inside_macro(path: &str) -> bool {
    path.split('/').any(|segment| {
        let label = segment.split_once('[').map_or(segment, |(label, _)| label);
        label.eq_ignore_ascii_case("macro")
    })
}
