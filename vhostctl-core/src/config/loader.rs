//! Options loader

use crate::config::Options;
use crate::error::{Error, Result};
use std::path::Path;

/// Options loader for the supported file formats
pub struct OptionsLoader;

impl OptionsLoader {
    /// Load options from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Options> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read options file {}: {}", path.display(), e)))?;

        let ext = path.extension().and_then(|e| e.to_str()).unwrap_or("");

        match ext {
            "json" => Self::from_json(&content),
            "toml" => Self::from_toml(&content),
            _ => Err(Error::Config(format!("Unknown options format: {}", ext))),
        }
    }

    /// Parse JSON options
    pub fn from_json(content: &str) -> Result<Options> {
        serde_json::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid JSON: {}", e)))
    }

    /// Parse TOML options
    pub fn from_toml(content: &str) -> Result<Options> {
        toml::from_str(content)
            .map_err(|e| Error::Config(format!("Invalid TOML: {}", e)))
    }
}
