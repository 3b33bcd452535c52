//! Discovered virtual hosts

use crate::address::Address;
use regex::Regex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::LazyLock;

/// Position of a host in the configurator's discovered list
pub type VhostId = usize;

static SERVER_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:.+://)?([^ :$]*)").expect("server name regex is valid"));

/// One `<VirtualHost>` block
#[derive(Debug, Clone, Serialize)]
pub struct VirtualHost {
    /// File the block was found in (as loaded, possibly a symlink)
    pub file_path: PathBuf,
    pub server_name: String,
    pub doc_root: String,
    /// Tree handle of the block
    pub tree_path: String,
    /// Keyed by [`Address::hash_key`]
    pub addresses: BTreeMap<String, Address>,
    pub aliases: Vec<String>,
    pub ssl: bool,
    pub enabled: bool,
    /// Defined inside a `<Macro>`; its names are unknown
    pub mod_macro: bool,
    /// Plaintext host this one was cloned from
    pub ancestor: Option<VhostId>,
}

impl VirtualHost {
    /// Server name (scheme and port stripped) and aliases, deduplicated
    pub fn names(&self) -> Vec<String> {
        let mut names: BTreeSet<String> = self.aliases.iter().cloned().collect();

        if !self.server_name.is_empty() {
            if let Some(name) = SERVER_NAME.captures(&self.server_name).and_then(|c| c.get(1)) {
                names.insert(name.as_str().to_string());
            }
        }

        names.into_iter().collect()
    }

    /// Base name of the host's file, as the site utilities expect it
    pub fn config_name(&self) -> String {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// Addresses joined by spaces, e.g. `172.10.52.2:80 172.10.52.3:8080`
    pub fn addresses_string(&self, hosts_only: bool) -> String {
        self.addresses
            .values()
            .map(|a| if hosts_only { a.host.clone() } else { a.to_string() })
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn has_port(&self, port: &str) -> bool {
        self.addresses.values().any(|a| a.port == port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vhost() -> VirtualHost {
        let addresses = ["10.0.0.1:80", "10.0.0.2:8080"]
            .iter()
            .map(|raw| {
                let addr = Address::parse(raw);
                (addr.hash_key(), addr)
            })
            .collect();

        VirtualHost {
            file_path: PathBuf::from("/etc/apache2/sites-available/example.com.conf"),
            server_name: "https://example.com:443".to_string(),
            doc_root: "/var/www/html".to_string(),
            tree_path: "/files/etc/apache2/sites-available/example.com.conf/VirtualHost".to_string(),
            addresses,
            aliases: vec!["www.example.com".to_string(), "example.com".to_string()],
            ssl: false,
            enabled: true,
            mod_macro: false,
            ancestor: None,
        }
    }

    #[test]
    fn test_names() {
        assert_eq!(vhost().names(), vec!["example.com", "www.example.com"]);

        let mut bare = vhost();
        bare.aliases.clear();
        bare.server_name = "example.org".to_string();
        assert_eq!(bare.names(), vec!["example.org"]);
    }

    #[test]
    fn test_config_name() {
        assert_eq!(vhost().config_name(), "example.com.conf");
    }

    #[test]
    fn test_addresses_string() {
        let vh = vhost();
        assert_eq!(vh.addresses_string(false), "10.0.0.1:80 10.0.0.2:8080");
        assert_eq!(vh.addresses_string(true), "10.0.0.1 10.0.0.2");
        assert!(vh.has_port("8080"));
        assert!(!vh.has_port("443"));
    }
}
