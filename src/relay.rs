//! Bidirectional byte relay
//!
//! Once a session reaches the relay phase, two symmetric pumps copy bytes
//! client→remote and remote→client. Each direction owns a fixed 64 KiB
//! buffer and never reads more until the previous chunk has been written
//! out in full, so a slow receiver throttles the sender end-to-end without
//! unbounded buffering.

use std::io;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Capacity of each per-direction copy buffer
pub const RELAY_BUFFER_LEN: usize = 64 * 1024;

/// Copy bytes in both directions until each side has reached EOF.
///
/// EOF on one side is propagated to the other as a write-side shutdown
/// (TCP half-close) once every byte read before the EOF has been written;
/// the opposite direction keeps flowing until it ends the same way. The
/// first I/O error tears the whole relay down.
///
/// Returns the (client→remote, remote→client) byte counts.
pub async fn relay<C, R>(client: C, remote: R) -> io::Result<(u64, u64)>
where
    C: AsyncRead + AsyncWrite + Unpin,
    R: AsyncRead + AsyncWrite + Unpin,
{
    let (mut client_rd, mut client_wr) = tokio::io::split(client);
    let (mut remote_rd, mut remote_wr) = tokio::io::split(remote);

    tokio::try_join!(
        pump(&mut client_rd, &mut remote_wr),
        pump(&mut remote_rd, &mut client_wr),
    )
}

/// Pump one direction until EOF, then half-close the destination.
async fn pump<R, W>(src: &mut R, dst: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut buffer = vec![0u8; RELAY_BUFFER_LEN];
    let mut copied = 0u64;

    loop {
        let n = src.read(&mut buffer).await?;
        if n == 0 {
            break;
        }
        dst.write_all(&buffer[..n]).await?;
        copied += n as u64;
    }

    dst.shutdown().await?;
    Ok(copied)
}
