//! Cloning a plaintext host into an SSL host

use super::rewrite::sanitize_rewrite_rules;
use super::Configurator;
use crate::address::Address;
use crate::ctl::ControlProcess;
use crate::site::SiteUtility;
use crate::vhost::{VhostId, VirtualHost};
use crate::StoreContext;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use vhostctl_core::{Error, Result};
use vhostctl_tree::{file_handle, Query, TreeStore};

impl<S: TreeStore, C: ControlProcess, U: SiteUtility> Configurator<S, C, U> {
    /// Copy host `id` into an SSL host bound to port 443, in its own file
    pub fn make_vhost_ssl(&mut self, id: VhostId) -> Result<VhostId> {
        let source = self.vhost(id)?.clone();
        let ssl_path = self.ssl_vhost_path(&source.file_path)?;
        let ssl_scope = file_handle(&ssl_path);

        let before = self.vhost_blocks(&ssl_scope)?;
        self.write_ssl_skeleton(&source, &ssl_path)?;
        self.parser.store_mut().load().context("loading the SSL host")?;

        let new_path = match new_block(&before, &self.vhost_blocks(&ssl_scope)?) {
            Some(path) => path,
            // one more look, the store may not have caught up
            None => new_block(&before, &self.vhost_blocks(&ssl_scope)?).ok_or_else(|| {
                Error::Reconciliation(format!(
                    "could not find the copy of {} in {}",
                    source.tree_path,
                    ssl_path.display()
                ))
            })?,
        };

        self.rebind_to_443(&new_path)?;
        self.save()?;

        // Handles may move across a reload
        let new_path = new_block(&before, &self.vhost_blocks(&ssl_scope)?).ok_or_else(|| {
            Error::Reconciliation(format!("lost the SSL host in {} after saving", ssl_path.display()))
        })?;

        let mut ssl_vhost = self.create_vhost(&new_path)?;
        ssl_vhost.ancestor = Some(id);

        info!("🔒 Created SSL host {} in {}", ssl_vhost.server_name, ssl_path.display());
        let vhosts = self.vhosts.get_or_insert_with(Vec::new);
        vhosts.push(ssl_vhost);
        Ok(vhosts.len() - 1)
    }

    /// Where the SSL copy of `source` goes: the vhost root when it exists,
    /// else next to the resolved source file, with the SSL suffix
    pub fn ssl_vhost_path(&self, source: &Path) -> Result<PathBuf> {
        let base = match self.parser.vhost_root().filter(|r| r.exists()) {
            Some(root) => {
                let name = source
                    .file_name()
                    .ok_or_else(|| Error::Resolution(format!("{} has no file name", source.display())))?;
                fs::canonicalize(root)?.join(name)
            }
            None => fs::canonicalize(source)?,
        };

        let base = base.to_string_lossy();
        let ext = &self.options.ssl_vhost_ext;
        let path = match base.strip_suffix(".conf") {
            Some(stem) => format!("{}{}", stem, ext),
            None => format!("{}{}", base, ext),
        };
        Ok(PathBuf::from(path))
    }

    fn vhost_blocks(&self, scope: &str) -> Result<Vec<String>> {
        self.parser
            .store()
            .find(&Query::Blocks { scope, label: "VirtualHost" })
            .with_context(|| format!("searching {} for virtual hosts", scope))
    }

    /// Append a sanitized copy of `source`'s block to `ssl_path`, wrapped in
    /// `<IfModule mod_ssl.c>`, and load that file
    fn write_ssl_skeleton(&mut self, source: &VirtualHost, ssl_path: &Path) -> Result<()> {
        if ssl_path.exists() {
            self.reverter.backup_file(ssl_path)?;
        } else {
            self.reverter.add_file_to_delete(ssl_path);
        }

        let lines = self.block_lines(source)?;
        let (lines, skipped) = sanitize_rewrite_rules(&lines);
        if skipped {
            warn!(
                "Commented out https redirects copied into {}, review them",
                ssl_path.display()
            );
        }

        let mut text = String::new();
        if fs::read_to_string(ssl_path).is_ok_and(|t| !t.is_empty() && !t.ends_with('\n')) {
            text.push('\n');
        }
        text.push_str("<IfModule mod_ssl.c>\n");
        text.push_str(&lines.join("\n"));
        text.push_str("</VirtualHost>\n</IfModule>\n");

        let mut file = OpenOptions::new().create(true).append(true).open(ssl_path)?;
        file.write_all(text.as_bytes())?;
        debug!("Wrote SSL skeleton to {}", ssl_path.display());

        if !self.parser.is_filename_exist_in_current_paths(ssl_path) {
            self.parser.parse_file(ssl_path)?;
        }

        let store = self.parser.store_mut();
        store.invalidate(ssl_path);
        store.invalidate(&source.file_path);
        Ok(())
    }

    /// Source text of `vhost`'s block, split into lines, without its
    /// closing tag
    fn block_lines(&self, vhost: &VirtualHost) -> Result<Vec<String>> {
        let span = self.parser.store().span(&vhost.tree_path).with_context(|| {
            format!("locating {} in {}", vhost.tree_path, vhost.file_path.display())
        })?;

        let content = fs::read(&span.file)?;
        let block = content.get(span.start..span.end).ok_or_else(|| {
            Error::Resolution(format!(
                "{} changed on disk, cannot copy {}",
                span.file.display(),
                vhost.tree_path
            ))
        })?;

        let mut lines: Vec<String> = String::from_utf8_lossy(block).split('\n').map(str::to_string).collect();
        remove_closing_tag(&mut lines);
        Ok(lines)
    }

    /// Point every address of the block at `path` to port 443, dropping
    /// addresses that become duplicates
    fn rebind_to_443(&mut self, path: &str) -> Result<()> {
        let args = self
            .parser
            .store()
            .find(&Query::Args { node: path, pattern: None })
            .with_context(|| format!("reading the addresses of {}", path))?;

        let mut seen: Vec<Address> = Vec::new();
        let mut duplicates = Vec::new();
        for arg in &args {
            let address = Address::parse(&self.parser.resolve_argument(arg)?).with_port("443");
            if seen.contains(&address) {
                duplicates.push(arg.clone());
                continue;
            }
            self.parser
                .store_mut()
                .set(arg, &address.to_string())
                .with_context(|| format!("setting {}", arg))?;
            seen.push(address);
        }

        for arg in duplicates.iter().rev() {
            self.parser
                .store_mut()
                .remove(arg)
                .with_context(|| format!("removing {}", arg))?;
        }
        Ok(())
    }
}

/// The block handle present in `after` only, ignoring `[1]` indexes (a lone
/// block gains one when a sibling appears)
fn new_block(before: &[String], after: &[String]) -> Option<String> {
    let known: Vec<String> = before.iter().map(|p| p.replace("[1]", "")).collect();
    after
        .iter()
        .find(|p| !known.contains(&p.replace("[1]", "")))
        .cloned()
}

/// Drop the last `</VirtualHost>` (any case), keeping what precedes it on
/// its line
fn remove_closing_tag(lines: &mut [String]) {
    for line in lines.iter_mut().rev() {
        if let Some(at) = line.to_lowercase().rfind("</virtualhost>") {
            line.truncate(at);
            return;
        }
    }
}
