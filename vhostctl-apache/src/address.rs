//! Virtual host addresses
//!
//! An [`Address`] is one `host[:port]` argument of a `<VirtualHost>` block.
//! IPv6 hosts keep their brackets but compare by their expanded form.

use serde::Serialize;
use std::fmt;
use std::hash::{Hash, Hasher};

/// A `host:port` binding
#[derive(Debug, Clone, Serialize)]
pub struct Address {
    pub host: String,
    /// May be empty or `*`
    pub port: String,
    pub is_ipv6: bool,
}

impl Address {
    /// Parse a `<VirtualHost>` argument.
    ///
    /// Bracketed IPv6 literals are recognised first and keep their brackets
    /// in `host`. Anything else is split at the last `:`.
    pub fn parse(raw: &str) -> Self {
        if raw.starts_with('[') {
            if let Some(close) = raw.rfind(']') {
                let port = raw[close + 1..].strip_prefix(':').unwrap_or("");
                return Self {
                    host: raw[..=close].to_string(),
                    port: port.to_string(),
                    is_ipv6: true,
                };
            }
        }

        match raw.rsplit_once(':') {
            Some((host, port)) => Self {
                host: host.to_string(),
                port: port.to_string(),
                is_ipv6: false,
            },
            None => Self {
                host: raw.to_string(),
                port: String::new(),
                is_ipv6: false,
            },
        }
    }

    pub fn is_wildcard_port(&self) -> bool {
        self.port.is_empty() || self.port == "*"
    }

    /// Same host, different port
    pub fn with_port(&self, port: &str) -> Self {
        Self {
            port: port.to_string(),
            ..self.clone()
        }
    }

    /// Host used for comparisons.
    ///
    /// IPv6 hosts lose their brackets, get `::` expanded to eight hextets and
    /// leading zeros trimmed. Other hosts are returned unchanged.
    pub fn normalized_host(&self) -> String {
        if !self.is_ipv6 {
            return self.host.clone();
        }

        let bare = self.host.trim_start_matches('[').trim_end_matches(']');
        let hextets: Vec<&str> = match bare.split_once("::") {
            Some((left, right)) => {
                let left: Vec<&str> = left.split(':').filter(|s| !s.is_empty()).collect();
                let right: Vec<&str> = right.split(':').filter(|s| !s.is_empty()).collect();
                let zeros = 8usize.saturating_sub(left.len() + right.len());
                left.into_iter()
                    .chain(std::iter::repeat_n("0", zeros))
                    .chain(right)
                    .collect()
            }
            None => bare.split(':').collect(),
        };

        hextets
            .iter()
            .map(|h| {
                let trimmed = h.trim_start_matches('0');
                if trimmed.is_empty() {
                    "0".to_string()
                } else {
                    trimmed.to_ascii_lowercase()
                }
            })
            .collect::<Vec<_>>()
            .join(":")
    }

    /// Stable map key, `normalized_host:port`
    pub fn hash_key(&self) -> String {
        format!("{}:{}", self.normalized_host(), self.port)
    }
}

impl PartialEq for Address {
    fn eq(&self, other: &Self) -> bool {
        self.port == other.port && self.normalized_host() == other.normalized_host()
    }
}

impl Eq for Address {}

impl Hash for Address {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hash_key().hash(state);
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.port.is_empty() {
            write!(f, "{}", self.host)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}
