//! Error types for socksd
//!
//! Domain errors are typed so that the session can map each failure onto
//! the SOCKS reply code the client should see. Transport-level I/O errors
//! stay `std::io::Error` and close the session without a reply.

use crate::socks::consts::*;
use std::io;
use thiserror::Error;

/// SOCKS5 protocol violations detected while reading client frames
#[derive(Error, Debug)]
pub enum Socks5Error {
    /// Client spoke something other than SOCKS5
    #[error("unsupported SOCKS version: {0:#04x}")]
    UnsupportedVersion(u8),

    /// No offered authentication method is acceptable
    #[error("no acceptable authentication method")]
    NoAcceptableMethod,

    /// Request carried a command other than CONNECT
    #[error("command not supported: {0:#04x}")]
    CommandNotSupported(u8),

    /// Request carried an address type other than IPv4 or domain
    #[error("address type not supported: {0:#04x}")]
    AddressTypeNotSupported(u8),

    /// Domain field was empty or not valid UTF-8
    #[error("invalid domain name: {0}")]
    InvalidDomain(String),
}

impl Socks5Error {
    /// Reply code sent to the client for this violation, where the client
    /// channel is still usable.
    pub fn reply_code(&self) -> u8 {
        match self {
            Socks5Error::UnsupportedVersion(_) | Socks5Error::CommandNotSupported(_) => {
                SOCKS5_REPLY_COMMAND_NOT_SUPPORTED
            }
            Socks5Error::AddressTypeNotSupported(_) => SOCKS5_REPLY_ADDRESS_TYPE_NOT_SUPPORTED,
            // The method-selection reply (0xFF) has already been written by
            // the time this variant surfaces; the code here is never sent.
            Socks5Error::NoAcceptableMethod => SOCKS5_REPLY_COMMAND_NOT_SUPPORTED,
            Socks5Error::InvalidDomain(_) => SOCKS5_REPLY_HOST_UNREACHABLE,
        }
    }
}

/// Failures while resolving a domain name through the UDP resolver
#[derive(Error, Debug)]
pub enum ResolveError {
    /// No response arrived before the query timeout
    #[error("query timed out")]
    Timeout,

    /// The response carried no A records
    #[error("response carried no A records")]
    EmptyAnswer,

    /// The tracker already holds the maximum number of in-flight queries
    #[error("too many queries in flight")]
    TrackerFull,

    /// The hostname could not be encoded as a DNS name
    #[error("invalid query name: {0}")]
    InvalidName(String),

    /// A DNS message could not be encoded or decoded
    #[error("malformed DNS message: {0}")]
    Proto(String),

    /// The resolver task has shut down
    #[error("resolver is gone")]
    ResolverGone,

    /// I/O failure on the resolver socket
    #[error("resolver I/O error: {0}")]
    Io(#[from] io::Error),
}
