//! SOCKS5 CONNECT request parser

use crate::error::Socks5Error;
use crate::socks::consts::*;
use crate::socks::types::TargetAddr;
use anyhow::{bail, Result};
use std::net::Ipv4Addr;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read and validate a SOCKS5 request, returning the connect target.
///
/// # Request Format
///
/// ```text
/// +----+-----+-------+------+----------+----------+
/// |VER | CMD |  RSV  | ATYP | DST.ADDR | DST.PORT |
/// +----+-----+-------+------+----------+----------+
/// | 1  |  1  | X'00' |  1   | Variable |    2     |
/// +----+-----+-------+------+----------+----------+
/// ```
///
/// Only `CMD = 0x01` (CONNECT) is accepted, with `ATYP = 0x01` (IPv4,
/// 4 octets) or `ATYP = 0x03` (domain, 1-byte length + bytes). The port is
/// big-endian. Violations surface as [`Socks5Error`] values carrying the
/// reply code the client should receive.
pub async fn read_request<S>(stream: &mut S) -> Result<TargetAddr>
where
    S: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    stream.read_exact(&mut header).await?;

    let version = header[0];
    let command = header[1];
    let _reserved = header[2];
    let addr_type = header[3];

    if version != SOCKS5_VERSION {
        bail!(Socks5Error::UnsupportedVersion(version));
    }
    if command != SOCKS5_CMD_TCP_CONNECT {
        bail!(Socks5Error::CommandNotSupported(command));
    }

    match addr_type {
        SOCKS5_ADDR_TYPE_IPV4 => {
            let mut addr = [0u8; 4];
            stream.read_exact(&mut addr).await?;
            let port = read_port(stream).await?;
            Ok(TargetAddr::Ipv4(Ipv4Addr::from(addr), port))
        }

        SOCKS5_ADDR_TYPE_DOMAIN => {
            let mut len_buf = [0u8; 1];
            stream.read_exact(&mut len_buf).await?;
            let domain_len = len_buf[0] as usize;

            if domain_len == 0 || domain_len > MAX_DOMAIN_LEN {
                bail!(Socks5Error::InvalidDomain(format!(
                    "invalid domain length: {}",
                    domain_len
                )));
            }

            let mut domain_buf = vec![0u8; domain_len];
            stream.read_exact(&mut domain_buf).await?;
            let port = read_port(stream).await?;

            let domain = match String::from_utf8(domain_buf) {
                Ok(domain) => domain,
                Err(_) => bail!(Socks5Error::InvalidDomain("not valid UTF-8".into())),
            };

            Ok(TargetAddr::Domain(domain, port))
        }

        SOCKS5_ADDR_TYPE_IPV6 => {
            bail!(Socks5Error::AddressTypeNotSupported(SOCKS5_ADDR_TYPE_IPV6))
        }

        other => bail!(Socks5Error::AddressTypeNotSupported(other)),
    }
}

async fn read_port<S>(stream: &mut S) -> std::io::Result<u16>
where
    S: AsyncRead + Unpin,
{
    let mut port_buf = [0u8; 2];
    stream.read_exact(&mut port_buf).await?;
    Ok(u16::from_be_bytes(port_buf))
}
