//! # socksd - a SOCKS5 CONNECT proxy
//!
//! socksd is a small forward proxy speaking the SOCKS5 protocol (RFC 1928).
//! It accepts TCP clients, negotiates the "no authentication" method,
//! handles CONNECT requests for IPv4 and domain-name targets, and relays
//! bytes between the client and the target until both sides are done.
//!
//! Domain names are resolved asynchronously: a single UDP socket carries
//! A-record queries to the host's configured nameserver, and in-flight
//! lookups are tracked by their 16-bit transaction ID so that many sessions
//! can resolve concurrently without blocking each other.
//!
//! ## Features
//!
//! - **CONNECT only**: BIND and UDP ASSOCIATE are answered with
//!   "command not supported"
//! - **No authentication**: clients must offer method `0x00`
//! - **Asynchronous DNS**: one UDP socket, ID-tracked queries, 8 s timeout
//! - **Half-close aware relay**: a client `shutdown(WR)` is forwarded to the
//!   target and the opposite direction keeps draining, so no bytes are lost
//!
//! ## Architecture
//!
//! ```text
//! SOCKS5 client -> socksd -> target host
//!                     |
//!                     +--UDP--> system nameserver (A lookups)
//! ```
//!
//! The whole proxy is cooperatively scheduled on a current-thread runtime:
//! the accept loop, every session, and the resolver are tasks multiplexed
//! over non-blocking sockets.

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod relay;
pub mod resolver;
pub mod server;
pub mod session;
pub mod socks;

// Re-export commonly used items
pub use config::ProxyConfig;
pub use error::{ResolveError, Socks5Error};
pub use server::ProxyServer;

/// Version of the socksd crate
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
