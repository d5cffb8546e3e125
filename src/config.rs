//! Runtime configuration
//!
//! All settings come from the command line; there is no configuration
//! file. The struct exists so the server and the tests can be wired up
//! with explicit, overridable values.

use std::net::SocketAddr;
use std::time::Duration;

/// Default listening port
pub const DEFAULT_PORT: u16 = 1080;

/// Default DNS query timeout
pub const DEFAULT_DNS_TIMEOUT: Duration = Duration::from_secs(8);

/// Proxy runtime settings.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// TCP port the proxy listens on
    pub port: u16,
    /// Upstream nameserver override; the system resolver configuration is
    /// used when `None`
    pub resolver: Option<SocketAddr>,
    /// How long a DNS query may stay unanswered before the session is told
    /// the host is unreachable
    pub dns_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        ProxyConfig {
            port: DEFAULT_PORT,
            resolver: None,
            dns_timeout: DEFAULT_DNS_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    /// Configuration listening on `port` with every other setting at its
    /// default.
    pub fn new(port: u16) -> Self {
        ProxyConfig {
            port,
            ..Default::default()
        }
    }
}
