//! Site enabling utilities (`a2ensite` / `a2dissite`)

use std::io::ErrorKind;
use std::process::Command;
use tracing::debug;
use vhostctl_core::{Error, Result};

/// Enables and disables site configurations by name
pub trait SiteUtility {
    fn enable(&self, config_name: &str) -> Result<()>;

    fn disable(&self, config_name: &str) -> Result<()>;
}

/// [`SiteUtility`] running the Debian helper scripts
#[derive(Debug, Clone)]
pub struct ApacheSite {
    ensite: String,
    dissite: String,
}

impl ApacheSite {
    pub fn new(ensite: impl Into<String>, dissite: impl Into<String>) -> Self {
        Self {
            ensite: ensite.into(),
            dissite: dissite.into(),
        }
    }

    fn run(bin: &str, config_name: &str) -> Result<()> {
        debug!("Running {} {}", bin, config_name);

        let output = Command::new(bin).arg(config_name).output().map_err(|e| {
            if e.kind() == ErrorKind::NotFound {
                Error::Site(format!("{} is not installed", bin))
            } else {
                Error::Site(format!("could not run {}: {}", bin, e))
            }
        })?;

        if !output.status.success() {
            return Err(Error::Site(format!(
                "{} {} failed ({}): {}",
                bin,
                config_name,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(())
    }
}

impl Default for ApacheSite {
    fn default() -> Self {
        Self::new("a2ensite", "a2dissite")
    }
}

impl SiteUtility for ApacheSite {
    fn enable(&self, config_name: &str) -> Result<()> {
        Self::run(&self.ensite, config_name)
    }

    fn disable(&self, config_name: &str) -> Result<()> {
        Self::run(&self.dissite, config_name)
    }
}
