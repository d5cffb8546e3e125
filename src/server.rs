//! Listener bootstrap and accept loop
//!
//! Binds the listening TCP socket and the resolver's UDP socket, discovers
//! the upstream nameserver, and accepts clients forever. Each accepted
//! connection becomes one [`Session`](crate::session::Session) task;
//! per-session failures are logged and contained, and only listener-level
//! failures escape to the caller.

use crate::config::ProxyConfig;
use crate::resolver::{Resolver, ResolverHandle};
use crate::session::Session;
use anyhow::{Context, Result};
use std::net::{Ipv4Addr, SocketAddr};
use tokio::net::{TcpListener, UdpSocket};
use tracing::{debug, info, warn};
use trust_dns_resolver::config::Protocol;
use trust_dns_resolver::system_conf::read_system_conf;

/// The bound proxy: listening socket plus the shared resolver handle.
pub struct ProxyServer {
    listener: TcpListener,
    resolver: ResolverHandle,
}

impl ProxyServer {
    /// Bind the listening socket, open the resolver's UDP socket on an
    /// ephemeral port, and determine the upstream nameserver.
    ///
    /// Any failure here is fatal; there is nothing to serve without a
    /// listener and a resolver.
    pub async fn bind(config: &ProxyConfig) -> Result<Self> {
        let listener = TcpListener::bind((Ipv4Addr::UNSPECIFIED, config.port))
            .await
            .with_context(|| format!("failed to bind listening socket on port {}", config.port))?;

        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0))
            .await
            .context("failed to bind resolver UDP socket")?;

        let upstream = match config.resolver {
            Some(addr) => addr,
            None => system_nameserver()?,
        };

        info!(
            listen = %listener.local_addr()?,
            nameserver = %upstream,
            "proxy ready"
        );

        let resolver = Resolver::spawn(socket, upstream, config.dns_timeout);

        Ok(ProxyServer { listener, resolver })
    }

    /// Local address of the listening socket.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept clients until the listener fails.
    pub async fn run(self) -> Result<()> {
        loop {
            let (stream, peer) = self.listener.accept().await.context("accept failed")?;
            debug!(%peer, "client connected");

            let session = Session::new(stream, peer, self.resolver.clone());
            tokio::spawn(async move {
                if let Err(e) = session.run().await {
                    warn!(%peer, "session ended: {:#}", e);
                }
            });
        }
    }
}

/// First UDP nameserver from the host resolver configuration
/// (`/etc/resolv.conf` on POSIX systems).
fn system_nameserver() -> Result<SocketAddr> {
    let (config, _opts) =
        read_system_conf().context("failed to read system resolver configuration")?;

    config
        .name_servers()
        .iter()
        .find(|ns| ns.protocol == Protocol::Udp)
        .map(|ns| ns.socket_addr)
        .ok_or_else(|| anyhow::anyhow!("no UDP nameserver in system resolver configuration"))
}
