//! Vhostctl Apache
//!
//! Virtual host discovery and TLS enablement on top of an httpd
//! configuration tree.
//!
//! # Example
//!
//! ```rust,ignore
//! use vhostctl_apache::{ApacheCtl, ApacheSite, CertificateRequest, Configurator};
//! use vhostctl_core::config::Options;
//! use vhostctl_tree::FileTreeStore;
//!
//! let mut configurator = Configurator::new(
//!     FileTreeStore::new(),
//!     ApacheCtl::default(),
//!     ApacheSite::default(),
//!     Options::default(),
//! )?;
//!
//! configurator.deploy_certificate(&CertificateRequest {
//!     server_name: "example.com",
//!     cert: None,
//!     key: "/etc/ssl/private/example.com.key",
//!     chain: None,
//!     fullchain: Some("/etc/ssl/certs/example.com.fullchain.pem"),
//! })?;
//! configurator.save()?;
//! configurator.commit()?;
//! ```

pub mod address;
pub mod configurator;
pub mod ctl;
pub mod fnmatch;
pub mod parser;
pub mod reverter;
pub mod site;
pub mod version;
pub mod vhost;

pub use address::Address;
pub use configurator::{CertificateRequest, Configurator};
pub use ctl::{ApacheCtl, ControlProcess};
pub use parser::ConfigParser;
pub use reverter::Reverter;
pub use site::{ApacheSite, SiteUtility};
pub use version::ServerVersion;
pub use vhost::{VhostId, VirtualHost};

use vhostctl_core::{Error, Result};
use vhostctl_tree::StoreResult;

/// Attach the interrupted operation to a tree store error
pub(crate) trait StoreContext<T> {
    fn context(self, what: &str) -> Result<T>;

    fn with_context<F: FnOnce() -> String>(self, what: F) -> Result<T>;
}

impl<T> StoreContext<T> for StoreResult<T> {
    fn context(self, what: &str) -> Result<T> {
        self.map_err(|e| Error::store(what, e))
    }

    fn with_context<F: FnOnce() -> String>(self, what: F) -> Result<T> {
        self.map_err(|e| Error::store(what(), e))
    }
}

#[cfg(test)]
pub(crate) mod testing;
