//! Error types for vhostctl

use thiserror::Error;

/// Result type for vhostctl operations
pub type Result<T> = std::result::Result<T, Error>;

/// Boxed source error from a collaborator (tree store, child process)
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for vhostctl
#[derive(Error, Debug)]
pub enum Error {
    /// Unsupported server version or failed syntax test
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unresolvable variable or a required directive/value is missing
    #[error("Resolution error: {0}")]
    Resolution(String),

    /// A freshly cloned host could not be located in the tree
    #[error("Reconciliation error: {0}")]
    Reconciliation(String),

    /// Rollback could not be completed; the configuration may be inconsistent
    #[error("Rollback failed: {0}")]
    Rollback(String),

    /// Tree store error
    #[error("Tree store error while {context}: {source}")]
    Store {
        context: String,
        #[source]
        source: BoxError,
    },

    /// Control process error
    #[error("Control process error: {0}")]
    Control(String),

    /// Site enable/disable utility error
    #[error("Site utility error: {0}")]
    Site(String),

    /// Operation deliberately not supported
    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    /// Options error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Wrap a collaborator error with the operation it interrupted
    pub fn store(context: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Store {
            context: context.into(),
            source: source.into(),
        }
    }

    /// Whether this error came out of a failed rollback
    pub fn is_rollback(&self) -> bool {
        matches!(self, Error::Rollback(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_context() {
        let err = Error::store("reading 'Listen' arguments", "no such node");
        assert_eq!(
            err.to_string(),
            "Tree store error while reading 'Listen' arguments: no such node"
        );
        assert!(!err.is_rollback());
    }

    #[test]
    fn test_rollback_is_distinct() {
        let err = Error::Rollback("could not restore /etc/apache2/ports.conf".to_string());
        assert!(err.is_rollback());
        assert!(err.to_string().starts_with("Rollback failed"));
    }
}
