//! SOCKS5 reply encoder
//!
//! Replies are a fixed 10-byte frame; the bound-address fields are zero
//! for every non-success code.

use crate::socks::consts::*;
use anyhow::Result;
use std::net::SocketAddr;
use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Encode a reply frame.
///
/// # Reply Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | REP |  RSV  | ATYP | BND.ADDR | BND.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' | 0x01 |    4     |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// ATYP is always IPv4. A success reply carries the local endpoint of the
/// remote socket; anything else (errors, an IPv6 local bind on a dual-stack
/// host) leaves the BND fields zero-filled.
pub fn encode_reply(reply_code: u8, bind_addr: Option<SocketAddr>) -> [u8; SOCKS5_REPLY_LEN] {
    let mut frame = [0u8; SOCKS5_REPLY_LEN];
    frame[0] = SOCKS5_VERSION;
    frame[1] = reply_code;
    frame[2] = SOCKS5_RESERVED;
    frame[3] = SOCKS5_ADDR_TYPE_IPV4;

    if let Some(SocketAddr::V4(addr)) = bind_addr {
        frame[4..8].copy_from_slice(&addr.ip().octets());
        frame[8..10].copy_from_slice(&addr.port().to_be_bytes());
    }

    frame
}

/// Encode and send a reply to the client.
pub async fn send_reply<S>(
    stream: &mut S,
    reply_code: u8,
    bind_addr: Option<SocketAddr>,
) -> Result<()>
where
    S: AsyncWrite + Unpin,
{
    let frame = encode_reply(reply_code, bind_addr);
    stream.write_all(&frame).await?;
    stream.flush().await?;
    Ok(())
}
