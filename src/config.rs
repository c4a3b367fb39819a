//! Connection settings shared by every call made through a [`crate::Client`].

use crate::{Error, Result};
use std::fmt;

/// Default Mailgun API base (US region).
pub const DEFAULT_API_BASE: &str = "https://api.mailgun.net/v3";

const ENV_DOMAIN: &str = "MG_DOMAIN";
const ENV_API_KEY: &str = "MG_API_KEY";
const ENV_API_BASE: &str = "MG_URL";

/// Domain, credentials and endpoint for a Mailgun account.
///
/// The API key is used both as the HTTP basic-auth password and as the HMAC
/// key for webhook signatures. It is redacted from the `Debug` output.
#[derive(Clone, PartialEq, Eq)]
pub struct Config {
    domain: String,
    api_key: String,
    api_base: String,
}

impl Config {
    /// Create a configuration for `domain` using the default API base.
    pub fn new(domain: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            domain: domain.into(),
            api_key: api_key.into(),
            api_base: DEFAULT_API_BASE.to_string(),
        }
    }

    /// Read `MG_DOMAIN`, `MG_API_KEY` and the optional `MG_URL` from the environment.
    ///
    /// # Errors
    /// Returns [`Error::MissingConfig`] when a required variable is unset or empty.
    pub fn from_env() -> Result<Self> {
        let domain = read_env(ENV_DOMAIN).ok_or(Error::MissingConfig(ENV_DOMAIN))?;
        let api_key = read_env(ENV_API_KEY).ok_or(Error::MissingConfig(ENV_API_KEY))?;
        let mut config = Self::new(domain, api_key);
        if let Some(base) = read_env(ENV_API_BASE) {
            config = config.with_api_base(base);
        }
        Ok(config)
    }

    /// Override the API base, e.g. the EU region or a local mock server.
    ///
    /// A trailing slash is stripped.
    pub fn with_api_base(mut self, api_base: impl Into<String>) -> Self {
        let base: String = api_base.into();
        self.api_base = base.trim_end_matches('/').to_string();
        self
    }

    /// Routing domain used in request paths.
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Secret API key.
    pub fn api_key(&self) -> &str {
        &self.api_key
    }

    /// API base URL without a trailing slash.
    pub fn api_base(&self) -> &str {
        &self.api_base
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("domain", &self.domain)
            .field("api_key", &"<redacted>")
            .field("api_base", &self.api_base)
            .finish()
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_uses_default_base() {
        let config = Config::new("example.com", "key-123");
        assert_eq!(config.domain(), "example.com");
        assert_eq!(config.api_key(), "key-123");
        assert_eq!(config.api_base(), DEFAULT_API_BASE);
    }

    #[test]
    fn api_base_trailing_slash_is_trimmed() {
        let config = Config::new("example.com", "key").with_api_base("http://localhost:8080/v3/");
        assert_eq!(config.api_base(), "http://localhost:8080/v3");
    }

    #[test]
    fn debug_hides_api_key() {
        let config = Config::new("example.com", "super-secret");
        let debug = format!("{config:?}");
        assert!(!debug.contains("super-secret"));
        assert!(debug.contains("<redacted>"));
    }
}
