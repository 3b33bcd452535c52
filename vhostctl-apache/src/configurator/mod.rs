//! Apache configurator
//!
//! Ties the [`ConfigParser`], the [`Reverter`] and the server's control
//! utilities together: host discovery, SSL host cloning, `Listen`
//! management and certificate deployment.

mod certificate;
mod discovery;
mod listen;
mod rewrite;
mod ssl;

pub use certificate::CertificateRequest;
pub use listen::is_port_listened;
pub use rewrite::sanitize_rewrite_rules;

use crate::ctl::ControlProcess;
use crate::parser::ConfigParser;
use crate::reverter::Reverter;
use crate::site::SiteUtility;
use crate::version::{ServerVersion, MIN_SUPPORTED};
use crate::vhost::{VhostId, VirtualHost};
use crate::StoreContext;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use vhostctl_core::config::Options;
use vhostctl_core::{Error, Result};
use vhostctl_tree::TreeStore;

/// Apache configurator
pub struct Configurator<S: TreeStore, C: ControlProcess, U: SiteUtility> {
    parser: ConfigParser<S>,
    reverter: Reverter,
    ctl: C,
    site: U,
    options: Options,
    version: ServerVersion,
    /// Discovered hosts plus those cloned since; `None` until first asked for
    vhosts: Option<Vec<VirtualHost>>,
    /// Server name -> host chosen for it
    suitable_vhosts: HashMap<String, VhostId>,
}

impl<S: TreeStore, C: ControlProcess, U: SiteUtility> Configurator<S, C, U> {
    /// Check the server and load its configuration
    pub fn new(store: S, ctl: C, site: U, options: Options) -> Result<Self> {
        let version: ServerVersion = ctl.version()?.parse()?;
        if !version.at_least(MIN_SUPPORTED)? {
            return Err(Error::Validation(format!(
                "apache {} is not supported, the oldest supported version is {}",
                version, MIN_SUPPORTED
            )));
        }

        ctl.test_configuration()
            .map_err(|e| Error::Validation(format!("configuration test failed: {}", e)))?;

        let mut parser = ConfigParser::new(
            store,
            &ctl,
            options.server_root.as_deref(),
            options.vhost_root.as_deref(),
        )?;

        if let Some(pattern) = options.vhost_files_pattern() {
            parser.parse_file(&pattern)?;
        }

        info!("✅ Apache {} configuration loaded from {}", version, parser.config_root().display());

        Ok(Self {
            parser,
            reverter: Reverter::new(),
            ctl,
            site,
            options,
            version,
            vhosts: None,
            suitable_vhosts: HashMap::new(),
        })
    }

    pub fn parser(&self) -> &ConfigParser<S> {
        &self.parser
    }

    pub fn parser_mut(&mut self) -> &mut ConfigParser<S> {
        &mut self.parser
    }

    pub fn reverter(&self) -> &Reverter {
        &self.reverter
    }

    pub fn version(&self) -> &ServerVersion {
        &self.version
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    /// Host `id`, as returned by discovery or cloning
    pub fn vhost(&self, id: VhostId) -> Result<&VirtualHost> {
        self.vhosts
            .as_ref()
            .and_then(|v| v.get(id))
            .ok_or_else(|| Error::Resolution(format!("unknown virtual host #{}", id)))
    }

    // ============================================================
    // Session
    // ============================================================

    /// Write pending tree changes, backing up what they overwrite
    pub fn save(&mut self) -> Result<()> {
        self.parser.save(&mut self.reverter)
    }

    /// Make the session's changes permanent
    pub fn commit(&mut self) -> Result<()> {
        self.reverter.commit()
    }

    /// Undo the session's changes on disk and reload the tree
    pub fn rollback(&mut self) -> Result<()> {
        let touched = self.reverter.touched_files();
        self.reverter.rollback(&self.site)?;

        let store = self.parser.store_mut();
        for file in &touched {
            store.invalidate(file);
        }
        store.load().context("reloading after rollback")?;

        self.vhosts = None;
        self.suitable_vhosts.clear();
        Ok(())
    }

    /// Whether the server accepts the configuration as written
    pub fn check_configuration(&self) -> bool {
        match self.ctl.test_configuration() {
            Ok(()) => true,
            Err(e) => {
                warn!("Configuration test failed: {}", e);
                false
            }
        }
    }

    pub fn restart(&self) -> Result<()> {
        self.ctl.restart()?;
        info!("🔄 Apache restarted");
        Ok(())
    }

    // ============================================================
    // Sites
    // ============================================================

    /// Make host `id` active: through the site utility when it works,
    /// otherwise by including its file from the root configuration
    pub fn enable_site(&mut self, id: VhostId) -> Result<()> {
        let vhost = self.vhost(id)?;
        if vhost.enabled {
            debug!("{} is already enabled", vhost.file_path.display());
            return Ok(());
        }
        let config_name = vhost.config_name();
        let file_path = vhost.file_path.clone();

        match self.site.enable(&config_name) {
            Ok(()) => {
                self.reverter.add_site_config_to_disable(&config_name);
                self.set_enabled(id);
                info!("Enabled site {}", config_name);
                return Ok(());
            }
            Err(e) => debug!("Site utility could not enable {}: {}", config_name, e),
        }

        if !self.parser.is_filename_exist_in_original_paths(&file_path) {
            let config_root = self.parser.config_root().to_path_buf();
            self.parser.add_include(&config_root, &file_path)?;
            self.set_enabled(id);
            info!("Enabled {} through an Include", file_path.display());
        }
        Ok(())
    }

    fn set_enabled(&mut self, id: VhostId) {
        if let Some(vhost) = self.vhosts.as_mut().and_then(|v| v.get_mut(id)) {
            vhost.enabled = true;
        }
    }

    /// Activate an httpd module. Installing modules is left to the
    /// administrator.
    pub fn enable_module(&mut self, module: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "apache needs module {} to be active, install it yourself",
            module
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{server_root, FakeCtl, FakeSite};
    use std::path::Path;
    use vhostctl_tree::FileTreeStore;

    pub(crate) type TestConfigurator = Configurator<FileTreeStore, FakeCtl, FakeSite>;

    pub(crate) fn configurator(root: &Path) -> TestConfigurator {
        configurator_with(root, FakeCtl::default(), FakeSite::default())
    }

    pub(crate) fn configurator_with(root: &Path, ctl: FakeCtl, site: FakeSite) -> TestConfigurator {
        let options = Options {
            server_root: Some(root.to_path_buf()),
            ..Options::default()
        };
        Configurator::new(FileTreeStore::new(), ctl, site, options).unwrap()
    }

    #[test]
    fn test_rejects_old_versions() {
        let (_dir, root) = server_root();
        let ctl = FakeCtl {
            version: "2.2.34".to_string(),
            ..FakeCtl::default()
        };
        let options = Options {
            server_root: Some(root),
            ..Options::default()
        };
        let result = Configurator::new(FileTreeStore::new(), ctl, FakeSite::default(), options);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_rejects_broken_configuration() {
        let (_dir, root) = server_root();
        let ctl = FakeCtl {
            config_ok: false,
            ..FakeCtl::default()
        };
        let options = Options {
            server_root: Some(root),
            ..Options::default()
        };
        let result = Configurator::new(FileTreeStore::new(), ctl, FakeSite::default(), options);
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[test]
    fn test_enable_module_is_unsupported() {
        let (_dir, root) = server_root();
        let mut configurator = configurator(&root);
        let err = configurator.enable_module("ssl").unwrap_err();
        assert!(matches!(err, Error::Unsupported(_)));
        assert!(err.to_string().contains("install it yourself"));
    }

    #[test]
    fn test_enable_site_through_utility() {
        let (_dir, root) = server_root();
        let options = Options {
            server_root: Some(root.clone()),
            vhost_root: Some(root.join("sites-available")),
            ..Options::default()
        };
        let mut configurator =
            Configurator::new(FileTreeStore::new(), FakeCtl::default(), FakeSite::default(), options)
                .unwrap();

        let other = configurator.find_suitable_vhost("other.org").unwrap().unwrap();
        assert!(!configurator.vhost(other).unwrap().enabled);

        configurator.enable_site(other).unwrap();
        assert!(configurator.vhost(other).unwrap().enabled);
        assert_eq!(configurator.reverter().configs_to_disable(), ["other.org.conf"]);
    }

    #[test]
    fn test_enable_site_falls_back_to_include() {
        let (_dir, root) = server_root();
        let site = FakeSite {
            missing: true,
            ..FakeSite::default()
        };
        let options = Options {
            server_root: Some(root.clone()),
            vhost_root: Some(root.join("sites-available")),
            ..Options::default()
        };
        let mut configurator =
            Configurator::new(FileTreeStore::new(), FakeCtl::default(), site, options).unwrap();

        let other = configurator.find_suitable_vhost("other.org").unwrap().unwrap();
        configurator.enable_site(other).unwrap();
        configurator.save().unwrap();

        assert!(configurator.vhost(other).unwrap().enabled);
        let root_conf = std::fs::read_to_string(root.join("apache2.conf")).unwrap();
        assert!(root_conf.contains(&format!(
            "Include {}",
            root.join("sites-available/other.org.conf").display()
        )));
    }
}
