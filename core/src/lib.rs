//! Core utilities and shared types for the abspider engine.

pub mod pacer;

use url::Url;

pub const fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Scan target identifier, normalized to an absolute HTTP(S) URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Target(String);

#[derive(Debug, thiserror::Error)]
pub enum TargetError {
    #[error("empty target")]
    Empty,
    #[error("unsupported scheme: {0}")]
    UnsupportedScheme(String),
    #[error("invalid target url: {0}")]
    Invalid(String),
}

impl Target {
    /// Parse a host or URL. Bare hosts default to https.
    pub fn parse(s: &str) -> Result<Self, TargetError> {
        let t = s.trim();
        if t.is_empty() {
            return Err(TargetError::Empty);
        }
        let candidate = if t.contains("://") { t.to_string() } else { format!("https://{}", t) };
        let url = Url::parse(&candidate).map_err(|e| TargetError::Invalid(e.to_string()))?;
        match url.scheme() {
            "http" | "https" => Ok(Target(url.to_string())),
            other => Err(TargetError::UnsupportedScheme(other.to_string())),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Target {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_is_set() {
        assert!(!version().is_empty());
    }

    #[test]
    fn bare_host_gets_https() {
        let t = Target::parse("example.com").unwrap();
        assert_eq!(t.as_str(), "https://example.com/");
    }

    #[test]
    fn explicit_scheme_kept() {
        let t = Target::parse("http://example.com:8080").unwrap();
        assert_eq!(t.as_str(), "http://example.com:8080/");
    }

    #[test]
    fn reject_empty_and_odd_schemes() {
        assert!(Target::parse("   ").is_err());
        assert!(Target::parse("ftp://example.com").is_err());
    }
}
