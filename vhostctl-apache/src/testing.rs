//! Fakes and a Debian-style server root for unit tests

use crate::ctl::ControlProcess;
use crate::site::SiteUtility;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use vhostctl_core::{Error, Result};

pub const APACHE2_CONF: &str = "\
Include ports.conf
IncludeOptional mods-enabled/*.load
IncludeOptional sites-enabled/*.conf
ErrorLog ${APACHE_LOG_DIR}/error.log
";

pub const PORTS_CONF: &str = "\
Listen 80

<IfModule ssl_module>
    Listen 443
</IfModule>
";

pub const EXAMPLE_COM: &str = "\
<VirtualHost *:80>
    ServerName example.com
    ServerAlias www.example.com
    DocumentRoot /var/www/example
    ErrorLog ${APACHE_LOG_DIR}/example-error.log
    RewriteEngine on
    RewriteCond %{SERVER_NAME} =example.com [OR]
    RewriteCond %{SERVER_NAME} =www.example.com
    RewriteRule ^ https://%{SERVER_NAME}%{REQUEST_URI} [END,NE,R=permanent]
</VirtualHost>
";

pub const OTHER_ORG: &str = "\
<VirtualHost 10.0.0.1:80 [fd00::1]:80>
    ServerName other.org
    DocumentRoot html/other
</VirtualHost>
";

/// Server root with `example.com` enabled and `other.org` available only
pub fn server_root() -> (TempDir, PathBuf) {
    let dir = TempDir::new().unwrap();
    let root = fs::canonicalize(dir.path()).unwrap();

    for sub in ["mods-enabled", "sites-available", "sites-enabled"] {
        fs::create_dir(root.join(sub)).unwrap();
    }
    fs::write(root.join("apache2.conf"), APACHE2_CONF).unwrap();
    fs::write(root.join("ports.conf"), PORTS_CONF).unwrap();
    fs::write(
        root.join("mods-enabled/ssl.load"),
        "LoadModule ssl_module /usr/lib/apache2/modules/mod_ssl.so\n",
    )
    .unwrap();
    fs::write(root.join("sites-available/example.com.conf"), EXAMPLE_COM).unwrap();
    fs::write(root.join("sites-available/other.org.conf"), OTHER_ORG).unwrap();
    std::os::unix::fs::symlink(
        root.join("sites-available/example.com.conf"),
        root.join("sites-enabled/example.com.conf"),
    )
    .unwrap();

    (dir, root)
}

/// Scripted control process
pub struct FakeCtl {
    pub version: String,
    pub defines: HashMap<String, String>,
    pub modules: Vec<String>,
    pub config_ok: bool,
}

impl Default for FakeCtl {
    fn default() -> Self {
        Self {
            version: "2.4.41".to_string(),
            defines: HashMap::from([(
                "APACHE_LOG_DIR".to_string(),
                "/var/log/apache2".to_string(),
            )]),
            modules: vec!["core".to_string(), "ssl".to_string(), "rewrite".to_string()],
            config_ok: true,
        }
    }
}

impl ControlProcess for FakeCtl {
    fn version(&self) -> Result<String> {
        Ok(self.version.clone())
    }

    fn test_configuration(&self) -> Result<()> {
        if self.config_ok {
            Ok(())
        } else {
            Err(Error::Control("Syntax error on line 1".to_string()))
        }
    }

    fn restart(&self) -> Result<()> {
        Ok(())
    }

    fn parse_defines(&self) -> Result<HashMap<String, String>> {
        Ok(self.defines.clone())
    }

    fn parse_includes(&self) -> Result<Vec<String>> {
        Ok(Vec::new())
    }

    fn parse_modules(&self) -> Result<Vec<String>> {
        Ok(self.modules.clone())
    }
}

/// Site utility recording its calls
#[derive(Default)]
pub struct FakeSite {
    pub missing: bool,
    pub enabled: RefCell<Vec<String>>,
    pub disabled: RefCell<Vec<String>>,
}

impl SiteUtility for FakeSite {
    fn enable(&self, config_name: &str) -> Result<()> {
        if self.missing {
            return Err(Error::Site("a2ensite is not installed".to_string()));
        }
        self.enabled.borrow_mut().push(config_name.to_string());
        Ok(())
    }

    fn disable(&self, config_name: &str) -> Result<()> {
        if self.missing {
            return Err(Error::Site("a2dissite is not installed".to_string()));
        }
        self.disabled.borrow_mut().push(config_name.to_string());
        Ok(())
    }
}

/// Lines of `path`, trimmed
pub fn lines(path: &Path) -> Vec<String> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|l| l.trim().to_string())
        .collect()
}
