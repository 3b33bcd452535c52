//! Shared fixtures for the configurator integration tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;
use std::cell::RefCell;
use tempfile::TempDir;
use vhostctl_apache::{Configurator, ControlProcess, SiteUtility};
use vhostctl_core::config::Options;
use vhostctl_core::Result;
use vhostctl_tree::FileTreeStore;

pub type TestConfigurator = Configurator<FileTreeStore, StubCtl, SharedSite>;

/// A Debian-style layout with one enabled site
pub struct ServerRoot {
    _dir: TempDir,
    pub root: PathBuf,
}

impl ServerRoot {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let root = fs::canonicalize(dir.path()).unwrap();

        for sub in ["mods-enabled", "sites-available", "sites-enabled"] {
            fs::create_dir(root.join(sub)).unwrap();
        }
        fs::write(
            root.join("apache2.conf"),
            "Include ports.conf\nIncludeOptional mods-enabled/*.load\nIncludeOptional sites-enabled/*.conf\n",
        )
        .unwrap();
        fs::write(
            root.join("ports.conf"),
            "Listen 80\n\n<IfModule ssl_module>\n    Listen 443\n</IfModule>\n",
        )
        .unwrap();
        fs::write(
            root.join("sites-available/example.com.conf"),
            "<VirtualHost *:80>\n    ServerName example.com\n    DocumentRoot /var/www/example\n    RewriteEngine on\n    RewriteCond %{SERVER_NAME} =example.com\n    RewriteRule ^ https://%{SERVER_NAME}%{REQUEST_URI} [END,NE,R=permanent]\n</VirtualHost>\n",
        )
        .unwrap();
        std::os::unix::fs::symlink(
            root.join("sites-available/example.com.conf"),
            root.join("sites-enabled/example.com.conf"),
        )
        .unwrap();

        Self { _dir: dir, root }
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    /// Every `.back` file below the root
    pub fn backups(&self) -> Vec<PathBuf> {
        let mut found = Vec::new();
        collect_backups(&self.root, &mut found);
        found
    }

    pub fn configurator(&self) -> (TestConfigurator, SharedSite) {
        let site = SharedSite::default();
        let options = Options {
            server_root: Some(self.root.clone()),
            ..Options::default()
        };
        let configurator =
            Configurator::new(FileTreeStore::new(), StubCtl, site.clone(), options).unwrap();
        (configurator, site)
    }
}

fn collect_backups(dir: &Path, found: &mut Vec<PathBuf>) {
    for entry in fs::read_dir(dir).unwrap() {
        let path = entry.unwrap().path();
        if path.is_dir() {
            collect_backups(&path, found);
        } else if path.to_string_lossy().ends_with(".back") {
            found.push(path);
        }
    }
}

/// Control process of an httpd 2.4.41 with mod_ssl loaded
pub struct StubCtl;

impl ControlProcess for StubCtl {
    fn version(&self) -> Result<String> {
        Ok("2.4.41".to_string())
    }

    fn test_configuration(&self) -> Result<()> {
        Ok(())
    }

    fn restart(&self) -> Result<()> {
        Ok(())
    }

    fn parse_defines(&self) -> Result<HashMap<String, String>> {
        Ok(HashMap::new())
    }

    fn parse_includes(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn parse_modules(&self) -> Result<Vec<String>> {
        Ok(vec!["core".to_string(), "ssl".to_string()])
    }
}

/// Site utility whose calls stay observable after it is moved
#[derive(Clone, Default)]
pub struct SharedSite {
    pub calls: Rc<RefCell<Vec<String>>>,
}

impl SiteUtility for SharedSite {
    fn enable(&self, config_name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("enable {}", config_name));
        Ok(())
    }

    fn disable(&self, config_name: &str) -> Result<()> {
        self.calls.borrow_mut().push(format!("disable {}", config_name));
        Ok(())
    }
}
