//! SOCKS5 protocol engine
//!
//! Implements the client-facing protocol of the proxy: method-selection
//! negotiation, CONNECT request parsing, and reply encoding. The session
//! drives these against its client stream; nothing here owns a socket.

pub mod consts;
mod handshake;
mod reply;
mod request;
mod types;

pub use handshake::negotiate;
pub use reply::{encode_reply, send_reply};
pub use request::read_request;
pub use types::TargetAddr;
