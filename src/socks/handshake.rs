//! SOCKS5 method-selection negotiation
//!
//! Handles the opening greeting of every connection.

use crate::error::Socks5Error;
use crate::socks::consts::*;
use anyhow::{bail, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Negotiate the authentication method with a freshly connected client.
///
/// # Greeting Format
///
/// ```text
/// +----+----------+----------+
/// |VER | NMETHODS | METHODS  |
/// +----+----------+----------+
/// | 1  |    1     | 1 to 255 |
/// +----+----------+----------+
/// ```
///
/// Only "no authentication required" (`0x00`) is supported. If the client
/// offers it, the proxy answers `05 00` and the connection moves on to the
/// request phase. Otherwise the proxy answers `05 FF` and the connection
/// must be closed.
pub async fn negotiate<S>(stream: &mut S) -> Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let num_methods = header[1] as usize;

    if version != SOCKS5_VERSION {
        bail!(Socks5Error::UnsupportedVersion(version));
    }

    let mut methods = vec![0u8; num_methods];
    stream.read_exact(&mut methods).await?;

    if !methods.contains(&SOCKS5_AUTH_METHOD_NONE) {
        stream
            .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NOT_ACCEPTABLE])
            .await?;
        stream.flush().await?;
        bail!(Socks5Error::NoAcceptableMethod);
    }

    stream
        .write_all(&[SOCKS5_VERSION, SOCKS5_AUTH_METHOD_NONE])
        .await?;
    stream.flush().await?;

    Ok(())
}
