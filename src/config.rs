//! Configuration
//!
//! Plain settings structs with defaults. The binary layers CLI flags and
//! environment variables on top of these.

use std::time::Duration;

use crate::error::{Error, Result};

/// Default expiry for repopulated entries (5 minutes)
pub const DEFAULT_TTL_SECONDS: u64 = 300;

/// Batch loader configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoaderConfig {
    /// Expiry applied to every entry written back after a backing fetch
    pub ttl_seconds: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: DEFAULT_TTL_SECONDS,
        }
    }
}

impl LoaderConfig {
    pub fn with_ttl(ttl_seconds: u64) -> Self {
        Self { ttl_seconds }
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }

    /// Reject settings the store would refuse (`SET .. EX 0` is invalid).
    pub fn validate(&self) -> Result<()> {
        if self.ttl_seconds == 0 {
            return Err(Error::Config("ttl_seconds must be greater than zero".into()));
        }
        Ok(())
    }
}

/// Primary and reader endpoint addresses
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointConfig {
    pub primary: String,
    pub reader: String,
}

impl EndpointConfig {
    pub fn new(primary: impl Into<String>, reader: impl Into<String>) -> Self {
        Self {
            primary: primary.into(),
            reader: reader.into(),
        }
    }

    /// Host part of a `host[:port]` address.
    pub fn parse_host(address: &str) -> Result<&str> {
        let host = address.split(':').next().unwrap_or_default().trim();
        if host.is_empty() {
            return Err(Error::Config(format!("invalid endpoint address: '{}'", address)));
        }
        Ok(host)
    }

    /// Whether both roles point at the same host.
    pub fn is_shared(&self) -> bool {
        matches!(
            (Self::parse_host(&self.primary), Self::parse_host(&self.reader)),
            (Ok(p), Ok(r)) if p == r
        )
    }
}
