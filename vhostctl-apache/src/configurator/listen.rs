//! `Listen` directive management

use super::Configurator;
use crate::ctl::ControlProcess;
use crate::site::SiteUtility;
use tracing::{debug, info};
use vhostctl_core::Result;
use vhostctl_tree::store::parent_handle;
use vhostctl_tree::{file_handle, TreeStore};

/// Whether one of `listens` (`80`, `1.2.3.4:443`, `[::]:8443 https`) binds `port`
pub fn is_port_listened(listens: &[String], port: &str) -> bool {
    listens.iter().any(|listen| {
        let address = listen.split_whitespace().next().unwrap_or("");
        let bound = address.rsplit_once(':').map(|(_, p)| p).unwrap_or(address);
        bound == port
    })
}

/// IP part of a `Listen` address, empty when only a port is given
fn ip_from_listen(address: &str) -> &str {
    address.rsplit_once(':').map(|(ip, _)| ip).unwrap_or("")
}

impl<S: TreeStore, C: ControlProcess, U: SiteUtility> Configurator<S, C, U> {
    /// Every active `Listen` directive, its arguments joined by a space
    pub fn listen_values(&mut self) -> Result<Vec<String>> {
        let args = self.parser.find_directive("Listen", None, None, true)?;

        let mut listens: Vec<(String, Vec<String>)> = Vec::new();
        for arg in &args {
            let value = self.parser.resolve_argument(arg)?;
            let directive = parent_handle(arg);
            match listens.last_mut() {
                Some((last, values)) if last == directive => values.push(value),
                _ => listens.push((directive.to_string(), vec![value])),
            }
        }

        Ok(listens.into_iter().map(|(_, values)| values.join(" ")).collect())
    }

    /// Make httpd listen on `port`, on every address it already listens
    /// on. `https` bindings go inside `<IfModule mod_ssl.c>`.
    pub fn ensure_port_is_listening(&mut self, port: &str, https: bool) -> Result<()> {
        let port_service = if https && port != "443" {
            format!("{} https", port)
        } else {
            port.to_string()
        };

        let listens = self.listen_values()?;
        if is_port_listened(&listens, port) {
            debug!("Port {} is already listened on", port);
            return Ok(());
        }

        let mut wanted: Vec<String> = Vec::new();
        if listens.is_empty() {
            wanted.push(port_service.clone());
        }
        for listen in &listens {
            let address = listen.split_whitespace().next().unwrap_or("");
            let entry = if address.contains(':') {
                format!("{}:{}", ip_from_listen(address), port_service)
            } else {
                port_service.clone()
            };
            if !wanted.contains(&entry) {
                wanted.push(entry);
            }
        }

        // A bare port already covers every address
        let new: Vec<String> = if wanted.contains(&port_service) {
            vec![port_service]
        } else {
            wanted.into_iter().filter(|w| !listens.contains(w)).collect()
        };

        let scope = file_handle(self.parser.config_listen());
        for entry in &new {
            let args: Vec<&str> = entry.split_whitespace().collect();
            if https {
                self.parser
                    .add_directive_inside_module_guard(&scope, "Listen", &args, "mod_ssl.c")?;
            } else {
                self.parser.add_directive(&scope, "Listen", &args)?;
            }
            info!("Added Listen {}", entry);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurator::tests::configurator;
    use crate::testing::{lines, server_root};
    use std::fs;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_is_port_listened() {
        let listens = strings(&["80", "10.0.0.1:443", "[::1]:8443 https"]);
        assert!(is_port_listened(&listens, "80"));
        assert!(is_port_listened(&listens, "443"));
        assert!(is_port_listened(&listens, "8443"));
        assert!(!is_port_listened(&listens, "8080"));
        assert!(!is_port_listened(&[], "80"));
    }

    #[test]
    fn test_ip_from_listen() {
        assert_eq!(ip_from_listen("10.0.0.1:443"), "10.0.0.1");
        assert_eq!(ip_from_listen("[::1]:443"), "[::1]");
        assert_eq!(ip_from_listen("443"), "");
    }

    #[test]
    fn test_listen_values_grouped_per_directive() {
        let (_dir, root) = server_root();
        fs::write(root.join("ports.conf"), "Listen 80\nListen 8443 https\n").unwrap();
        let mut configurator = configurator(&root);

        assert_eq!(configurator.listen_values().unwrap(), vec!["80", "8443 https"]);
    }

    #[test]
    fn test_plain_port_added_once() {
        let (_dir, root) = server_root();
        let mut configurator = configurator(&root);

        configurator.ensure_port_is_listening("8080", false).unwrap();
        configurator.ensure_port_is_listening("8080", false).unwrap();
        configurator.save().unwrap();

        let ports = lines(&root.join("ports.conf"));
        assert_eq!(ports.iter().filter(|l| *l == "Listen 8080").count(), 1);
    }

    #[test]
    fn test_https_port_guarded() {
        let (_dir, root) = server_root();
        let mut configurator = configurator(&root);

        configurator.ensure_port_is_listening("8443", true).unwrap();
        configurator.save().unwrap();

        let text = fs::read_to_string(root.join("ports.conf")).unwrap();
        assert!(text.contains("<IfModule mod_ssl.c>\n    Listen 8443 https\n</IfModule>"));
    }

    #[test]
    fn test_per_address_bindings() {
        let (_dir, root) = server_root();
        fs::write(root.join("ports.conf"), "Listen 10.0.0.1:80\nListen 10.0.0.2:80\n").unwrap();
        let mut configurator = configurator(&root);

        configurator.ensure_port_is_listening("443", true).unwrap();
        assert_eq!(
            configurator.listen_values().unwrap(),
            vec!["10.0.0.1:80", "10.0.0.2:80", "10.0.0.1:443", "10.0.0.2:443"]
        );
    }
}
