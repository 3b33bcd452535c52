//! httpd version numbers

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use vhostctl_core::Error;

/// Oldest httpd the configurator works with
pub const MIN_SUPPORTED: &str = "2.4.0";

/// First httpd release accepting a full chain in `SSLCertificateFile`
pub const FULLCHAIN_SINCE: &str = "2.4.8";

/// Dotted version, compared component-wise with missing parts as zero
#[derive(Debug, Clone)]
pub struct ServerVersion {
    raw: String,
    parts: Vec<u64>,
}

impl ServerVersion {
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Whether this version is `min` or newer
    pub fn at_least(&self, min: &str) -> Result<bool, Error> {
        let min: ServerVersion = min.parse()?;
        Ok(*self >= min)
    }
}

impl FromStr for ServerVersion {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = s.trim();
        let parts = raw
            .split('.')
            .map(|p| p.parse::<u64>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| Error::Validation(format!("invalid version '{}'", raw)))?;

        Ok(Self {
            raw: raw.to_string(),
            parts,
        })
    }
}

impl PartialEq for ServerVersion {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for ServerVersion {}

impl PartialOrd for ServerVersion {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ServerVersion {
    fn cmp(&self, other: &Self) -> Ordering {
        let len = self.parts.len().max(other.parts.len());
        for i in 0..len {
            let a = self.parts.get(i).copied().unwrap_or(0);
            let b = other.parts.get(i).copied().unwrap_or(0);
            match a.cmp(&b) {
                Ordering::Equal => continue,
                ord => return ord,
            }
        }
        Ordering::Equal
    }
}

impl fmt::Display for ServerVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn v(s: &str) -> ServerVersion {
        s.parse().unwrap()
    }

    #[test]
    fn test_compare() {
        assert!(v("2.4.41") > v("2.4.8"));
        assert!(v("2.4.7") < v("2.4.8"));
        assert_eq!(v("2.4"), v("2.4.0"));
        assert!(v("2.2.34") < v(MIN_SUPPORTED));
    }

    #[test]
    fn test_at_least() {
        assert!(v("2.4.8").at_least(FULLCHAIN_SINCE).unwrap());
        assert!(!v("2.4.7").at_least(FULLCHAIN_SINCE).unwrap());
    }

    #[test]
    fn test_invalid() {
        assert!("2.4.x".parse::<ServerVersion>().is_err());
        assert!("".parse::<ServerVersion>().is_err());
    }
}
