//! Certificate deployment

use super::Configurator;
use crate::ctl::ControlProcess;
use crate::site::SiteUtility;
use crate::version::FULLCHAIN_SINCE;
use crate::StoreContext;
use tracing::{debug, info};
use vhostctl_core::{Error, Result};
use vhostctl_tree::store::parent_handle;
use vhostctl_tree::TreeStore;

/// Directives a TLS host needs, with the placeholder values they start with
const SSL_DIRECTIVES: &[(&str, &str)] = &[
    ("SSLEngine", "on"),
    ("SSLCertificateFile", "insert_cert_file_path"),
    ("SSLCertificateKeyFile", "insert_key_file_path"),
];

/// Files to install for one server name
#[derive(Debug, Clone, Copy)]
pub struct CertificateRequest<'a> {
    pub server_name: &'a str,
    pub cert: Option<&'a str>,
    pub key: &'a str,
    pub chain: Option<&'a str>,
    pub fullchain: Option<&'a str>,
}

impl<S: TreeStore, C: ControlProcess, U: SiteUtility> Configurator<S, C, U> {
    /// Point the SSL host of `request.server_name` (cloned from its
    /// plaintext host when needed) at the given files and enable it.
    ///
    /// Servers older than 2.4.8, or requests with a chain but no full chain,
    /// get `SSLCertificateFile` + `SSLCertificateChainFile`; otherwise the
    /// full chain goes into `SSLCertificateFile`.
    pub fn deploy_certificate(&mut self, request: &CertificateRequest<'_>) -> Result<()> {
        let id = self.get_suitable_vhost(request.server_name, true)?;

        self.prepare_server_https("443")?;
        if !self.parser.has_module("ssl_module") {
            return Err(Error::Resolution("ssl_module is not loaded".to_string()));
        }

        let vhost_path = self.vhost(id)?.tree_path.clone();
        self.add_placeholder_ssl_directives(&vhost_path)?;
        self.clean_ssl_vhost(&vhost_path)?;

        let cert_args = self
            .parser
            .find_directive("SSLCertificateFile", None, Some(&vhost_path), true)?;
        let key_args = self
            .parser
            .find_directive("SSLCertificateKeyFile", None, Some(&vhost_path), true)?;
        let (Some(cert_arg), Some(key_arg)) = (cert_args.last(), key_args.last()) else {
            return Err(Error::Resolution(format!(
                "{} lacks SSLCertificateFile or SSLCertificateKeyFile",
                vhost_path
            )));
        };

        let separate_chain = !self.version.at_least(FULLCHAIN_SINCE)?
            || (request.chain.is_some() && request.fullchain.is_none());

        let cert = if separate_chain {
            let chain = request.chain.ok_or_else(|| {
                Error::Resolution(format!(
                    "apache {} needs the certificate chain path, but none was given",
                    self.version
                ))
            })?;
            let cert = request.cert.ok_or_else(|| {
                Error::Resolution("the certificate path is required with a separate chain".to_string())
            })?;
            self.parser
                .add_directive(&vhost_path, "SSLCertificateChainFile", &[chain])?;
            cert
        } else {
            request.fullchain.ok_or_else(|| {
                Error::Resolution("the full-chain certificate path is required, but none was given".to_string())
            })?
        };

        let store = self.parser.store_mut();
        store
            .set(cert_arg, cert)
            .with_context(|| format!("setting {}", cert_arg))?;
        store
            .set(key_arg, request.key)
            .with_context(|| format!("setting {}", key_arg))?;

        if !self.vhost(id)?.enabled {
            self.enable_site(id)?;
        }

        info!("🔒 Certificate for {} installed in {}", request.server_name, vhost_path);
        Ok(())
    }

    /// Ensure mod_ssl is active and `port` is listened on for https
    pub fn prepare_server_https(&mut self, port: &str) -> Result<()> {
        self.prepare_https_modules()?;
        self.ensure_port_is_listening(port, true)
    }

    fn prepare_https_modules(&mut self) -> Result<()> {
        if self.parser.has_module("ssl_module") {
            return Ok(());
        }

        self.enable_module("ssl")?;
        self.save()?;
        self.parser.store_mut().load().context("reloading after enabling ssl")?;
        self.parser.reset_modules(&self.ctl)
    }

    fn add_placeholder_ssl_directives(&mut self, vhost_path: &str) -> Result<()> {
        for (name, placeholder) in SSL_DIRECTIVES {
            let existing = self.parser.find_directive(name, None, Some(vhost_path), false)?;
            if existing.is_empty() {
                self.parser.add_directive(vhost_path, name, &[*placeholder])?;
            }
        }
        Ok(())
    }

    /// Keep one of each SSL directive and drop any chain file
    fn clean_ssl_vhost(&mut self, vhost_path: &str) -> Result<()> {
        for (name, _) in SSL_DIRECTIVES {
            self.deduplicate_directive(vhost_path, name)?;
        }

        let chains = self
            .parser
            .find_directive("SSLCertificateChainFile", None, Some(vhost_path), false)?;
        let removed = self.parser.remove_directives(&chains)?;
        if removed > 0 {
            debug!("Removed {} SSLCertificateChainFile directive(s)", removed);
        }
        Ok(())
    }

    /// Remove every `name` directive but the last one
    fn deduplicate_directive(&mut self, vhost_path: &str, name: &str) -> Result<()> {
        let mut args = self.parser.find_directive(name, None, Some(vhost_path), false)?;
        // one entry per directive
        args.dedup_by(|a, b| parent_handle(a) == parent_handle(b));

        if let Some((_, earlier)) = args.split_last() {
            let removed = self.parser.remove_directives(earlier)?;
            if removed > 0 {
                debug!("Removed {} duplicate {} directive(s)", removed, name);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configurator::tests::{configurator, configurator_with};
    use crate::testing::{lines, server_root, FakeCtl, FakeSite};

    fn request<'a>(chain: Option<&'a str>, fullchain: Option<&'a str>) -> CertificateRequest<'a> {
        CertificateRequest {
            server_name: "example.com",
            cert: Some("/etc/ssl/cert.pem"),
            key: "/etc/ssl/key.pem",
            chain,
            fullchain,
        }
    }

    #[test]
    fn test_deploy_with_fullchain() {
        let (_dir, root) = server_root();
        let mut configurator = configurator(&root);

        configurator
            .deploy_certificate(&request(None, Some("/etc/ssl/fullchain.pem")))
            .unwrap();
        configurator.save().unwrap();

        let ssl = lines(&root.join("sites-available/example.com-ssl.conf"));
        let count = |wanted: &str| ssl.iter().filter(|l| *l == wanted).count();
        assert_eq!(count("SSLEngine on"), 1);
        assert_eq!(count("SSLCertificateFile /etc/ssl/fullchain.pem"), 1);
        assert_eq!(count("SSLCertificateKeyFile /etc/ssl/key.pem"), 1);
        assert!(!ssl.iter().any(|l| l.starts_with("SSLCertificateChainFile")));

        assert_eq!(configurator.reverter().configs_to_disable(), ["example.com-ssl.conf"]);
    }

    #[test]
    fn test_deploy_requires_fullchain() {
        let (_dir, root) = server_root();
        let mut configurator = configurator(&root);

        let err = configurator.deploy_certificate(&request(None, None)).unwrap_err();
        assert!(matches!(err, Error::Resolution(_)));
        assert!(err.to_string().contains("full-chain"));
    }

    #[test]
    fn test_deploy_with_chain_on_old_server() {
        let (_dir, root) = server_root();
        let ctl = FakeCtl {
            version: "2.4.7".to_string(),
            ..FakeCtl::default()
        };
        let mut configurator = configurator_with(&root, ctl, FakeSite::default());

        assert!(configurator
            .deploy_certificate(&request(None, Some("/etc/ssl/fullchain.pem")))
            .is_err());
        configurator
            .deploy_certificate(&request(Some("/etc/ssl/chain.pem"), None))
            .unwrap();
        configurator.save().unwrap();

        let ssl = lines(&root.join("sites-available/example.com-ssl.conf"));
        assert!(ssl.iter().any(|l| l == "SSLCertificateFile /etc/ssl/cert.pem"));
        assert_eq!(
            ssl.iter().filter(|l| *l == "SSLCertificateChainFile /etc/ssl/chain.pem").count(),
            1
        );
    }

    #[test]
    fn test_duplicates_collapsed() {
        let (_dir, root) = server_root();
        std::fs::write(
            root.join("sites-enabled/example-ssl.conf"),
            "<VirtualHost *:443>\n    ServerName example.com\n    SSLEngine on\n    SSLCertificateFile /old/a.pem\n    SSLCertificateFile /old/b.pem\n    SSLCertificateKeyFile /old/key.pem\n    SSLCertificateChainFile /old/chain.pem\n</VirtualHost>\n",
        )
        .unwrap();
        let mut configurator = configurator(&root);

        configurator
            .deploy_certificate(&request(None, Some("/etc/ssl/fullchain.pem")))
            .unwrap();
        configurator.save().unwrap();

        let ssl = lines(&root.join("sites-enabled/example-ssl.conf"));
        let certs: Vec<&String> = ssl.iter().filter(|l| l.starts_with("SSLCertificateFile")).collect();
        assert_eq!(certs, ["SSLCertificateFile /etc/ssl/fullchain.pem"]);
        assert!(!ssl.iter().any(|l| l.starts_with("SSLCertificateChainFile")));
        // already enabled: no site utility call
        assert!(configurator.reverter().configs_to_disable().is_empty());
    }
}
