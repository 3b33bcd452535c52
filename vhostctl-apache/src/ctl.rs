//! Control process wrapper
//!
//! Asks the httpd control binary (`apache2ctl`, `apachectl`) for its version,
//! runtime defines, includes and loaded modules, and drives config tests and
//! restarts.

use regex::Regex;
use std::collections::HashMap;
use std::process::Command;
use tracing::debug;
use vhostctl_core::{Error, Result};

/// Everything the configurator needs from the running server
pub trait ControlProcess {
    fn version(&self) -> Result<String>;

    /// Syntax check of the whole configuration
    fn test_configuration(&self) -> Result<()>;

    fn restart(&self) -> Result<()>;

    /// `Define`d variables, valueless ones mapped to an empty string
    fn parse_defines(&self) -> Result<HashMap<String, String>>;

    /// Every file the server includes
    fn parse_includes(&self) -> Result<Vec<String>>;

    /// Loaded module names without the `_module` suffix
    fn parse_modules(&self) -> Result<Vec<String>>;
}

/// [`ControlProcess`] backed by the `apachectl` binary
#[derive(Debug, Clone)]
pub struct ApacheCtl {
    bin: String,
}

impl ApacheCtl {
    pub fn new(bin: impl Into<String>) -> Self {
        Self { bin: bin.into() }
    }

    fn exec(&self, args: &[&str]) -> Result<String> {
        let command = format!("{} {}", self.bin, args.join(" "));
        debug!("Running {}", command);

        let output = Command::new(&self.bin)
            .args(args)
            .output()
            .map_err(|e| Error::Control(format!("could not run '{}': {}", command, e)))?;

        if !output.status.success() {
            return Err(Error::Control(format!(
                "'{}' failed ({}): {}",
                command,
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

impl Default for ApacheCtl {
    fn default() -> Self {
        Self::new("apache2ctl")
    }
}

impl ControlProcess for ApacheCtl {
    fn version(&self) -> Result<String> {
        parse_version(&self.exec(&["-v"])?)
    }

    fn test_configuration(&self) -> Result<()> {
        self.exec(&["-t"])
            .map(|_| ())
            .map_err(|e| Error::Control(format!("invalid apache configuration: {}", e)))
    }

    fn restart(&self) -> Result<()> {
        self.exec(&["-k", "restart"])
            .map(|_| ())
            .map_err(|e| Error::Control(format!("could not restart apache: {}", e)))
    }

    fn parse_defines(&self) -> Result<HashMap<String, String>> {
        parse_defines(&self.exec(&["-t", "-D", "DUMP_RUN_CFG"])?)
    }

    fn parse_includes(&self) -> Result<Vec<String>> {
        captures(&self.exec(&["-t", "-D", "DUMP_INCLUDES"])?, r"\(.*\) (.*)")
    }

    fn parse_modules(&self) -> Result<Vec<String>> {
        let modules = captures(&self.exec(&["-t", "-D", "DUMP_MODULES"])?, r"(.*)_module")?;
        Ok(modules.into_iter().map(|m| m.trim().to_string()).collect())
    }
}

// ============================================================
// Output parsing
// ============================================================

/// First capture group of every match of `pattern` in `output`
fn captures(output: &str, pattern: &str) -> Result<Vec<String>> {
    let re = Regex::new(pattern).map_err(|e| Error::Control(e.to_string()))?;
    Ok(re
        .captures_iter(output)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .collect())
}

fn parse_version(output: &str) -> Result<String> {
    captures(output, r"(?i)Apache/([0-9.]*)")?
        .into_iter()
        .next()
        .ok_or_else(|| Error::Control("could not detect apache version".to_string()))
}

fn parse_defines(output: &str) -> Result<HashMap<String, String>> {
    let mut variables = HashMap::new();

    for item in captures(output, r"Define: ([^ \n]*)")? {
        if item == "DUMP_RUN_CFG" {
            continue;
        }
        if item.matches('=').count() > 1 {
            return Err(Error::Control(format!(
                "error parsing apache runtime variable '{}'",
                item
            )));
        }
        match item.split_once('=') {
            Some((name, value)) => variables.insert(name.to_string(), value.to_string()),
            None => variables.insert(item, String::new()),
        };
    }

    Ok(variables)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        let output = "Server version: Apache/2.4.41 (Ubuntu)\nServer built:   2023-03-08T17:32:54\n";
        assert_eq!(parse_version(output).unwrap(), "2.4.41");
        assert!(parse_version("nginx version: nginx/1.18.0").is_err());
    }

    #[test]
    fn test_parse_defines() {
        let output = "ServerRoot: \"/etc/apache2\"\nDefine: DUMP_RUN_CFG\nDefine: APACHE_LOG_DIR=/var/log/apache2\nDefine: ENABLE_USR_LIB_CGI_BIN\n";
        let defines = parse_defines(output).unwrap();
        assert_eq!(defines.len(), 2);
        assert_eq!(defines["APACHE_LOG_DIR"], "/var/log/apache2");
        assert_eq!(defines["ENABLE_USR_LIB_CGI_BIN"], "");

        assert!(parse_defines("Define: A=b=c\n").is_err());
    }

    #[test]
    fn test_parse_includes_and_modules() {
        let includes = "Included configuration files:\n  (*) /etc/apache2/apache2.conf\n    (146) /etc/apache2/mods-enabled/ssl.load\n";
        assert_eq!(
            captures(includes, r"\(.*\) (.*)").unwrap(),
            vec!["/etc/apache2/apache2.conf", "/etc/apache2/mods-enabled/ssl.load"]
        );

        let modules = "Loaded Modules:\n core_module (static)\n ssl_module (shared)\n";
        let names: Vec<String> = captures(modules, r"(.*)_module")
            .unwrap()
            .into_iter()
            .map(|m| m.trim().to_string())
            .collect();
        assert_eq!(names, vec!["core", "ssl"]);
    }

    #[test]
    fn test_missing_binary() {
        let ctl = ApacheCtl::new("/nonexistent/apache2ctl");
        assert!(matches!(ctl.version(), Err(Error::Control(_))));
    }
}
