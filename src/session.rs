//! Per-connection SOCKS5 session
//!
//! Every accepted client is owned by exactly one session task, which walks
//! the connection through method selection, request parsing, address
//! resolution, the remote connect, and finally the relay phase. Protocol
//! violations and I/O failures never escape the task: the client gets the
//! proper reply code when its channel is still usable, and the session
//! closes.

use crate::error::{ResolveError, Socks5Error};
use crate::relay;
use crate::resolver::ResolverHandle;
use crate::socks::consts::*;
use crate::socks::{self, TargetAddr};
use anyhow::{Context, Result};
use std::fmt;
use std::net::{Ipv4Addr, SocketAddr};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tracing::{debug, info, trace};

/// Lifecycle phase of a session. A live session is in exactly one phase;
/// `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Waiting for the method-selection greeting
    Greeting,
    /// Waiting for the CONNECT request
    Request,
    /// A DNS query for the target domain is in flight
    Resolving,
    /// The remote connect has been issued and not yet completed
    Connecting,
    /// Bytes are being copied in both directions
    Relaying,
    /// Terminal: sockets released, no further events
    Closed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Greeting => "greeting",
            SessionState::Request => "request",
            SessionState::Resolving => "resolving",
            SessionState::Connecting => "connecting",
            SessionState::Relaying => "relaying",
            SessionState::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// One proxied client connection.
pub struct Session<S> {
    stream: S,
    peer: SocketAddr,
    resolver: ResolverHandle,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Wrap an accepted client stream into a session in the greeting phase.
    pub fn new(stream: S, peer: SocketAddr, resolver: ResolverHandle) -> Self {
        Session {
            stream,
            peer,
            resolver,
            state: SessionState::Greeting,
        }
    }

    fn enter(&mut self, state: SessionState) {
        trace!(peer = %self.peer, from = %self.state, to = %state, "state change");
        self.state = state;
    }

    /// Drive the session to completion.
    ///
    /// The returned error is purely informational for the accept loop's
    /// log line; by the time `run` returns, the client has already received
    /// whatever reply its failure called for and both sockets are gone.
    pub async fn run(mut self) -> Result<()> {
        if let Err(e) = socks::negotiate(&mut self.stream).await {
            self.enter(SessionState::Closed);
            return Err(e).context("method selection failed");
        }
        self.enter(SessionState::Request);

        let target = match socks::read_request(&mut self.stream).await {
            Ok(target) => target,
            Err(e) => {
                // Protocol violations get a reply; I/O errors just close
                if let Some(violation) = e.downcast_ref::<Socks5Error>() {
                    let _ =
                        socks::send_reply(&mut self.stream, violation.reply_code(), None).await;
                }
                self.enter(SessionState::Closed);
                return Err(e).context("request rejected");
            }
        };

        info!(peer = %self.peer, target = %target, "connect request");

        let port = target.port();
        let addr = match self.resolve_target(&target).await {
            Ok(addr) => addr,
            Err(e) => {
                let _ = socks::send_reply(&mut self.stream, SOCKS5_REPLY_HOST_UNREACHABLE, None)
                    .await;
                self.enter(SessionState::Closed);
                return Err(e).context(format!("could not resolve {}", target));
            }
        };

        self.enter(SessionState::Connecting);
        let remote = match TcpStream::connect((addr, port)).await {
            Ok(remote) => remote,
            Err(e) => {
                let _ = socks::send_reply(&mut self.stream, SOCKS5_REPLY_HOST_UNREACHABLE, None)
                    .await;
                self.enter(SessionState::Closed);
                return Err(e).context(format!("connect to {}:{} failed", addr, port));
            }
        };

        let bound = remote.local_addr().ok();
        socks::send_reply(&mut self.stream, SOCKS5_REPLY_SUCCEEDED, bound)
            .await
            .context("success reply lost")?;

        self.enter(SessionState::Relaying);
        let Session { stream, peer, .. } = self;
        match relay::relay(stream, remote).await {
            Ok((c2r, r2c)) => {
                debug!(%peer, c2r, r2c, "session finished");
                Ok(())
            }
            Err(e) => {
                debug!(%peer, error = %e, "relay aborted");
                // Already past the reply phase: nothing to tell the client
                Ok(())
            }
        }
    }

    /// Turn the request target into a connectable address, resolving
    /// domain names through the shared resolver.
    async fn resolve_target(&mut self, target: &TargetAddr) -> Result<Ipv4Addr, ResolveError> {
        match target {
            TargetAddr::Ipv4(addr, _) => Ok(*addr),
            TargetAddr::Domain(host, _) => {
                self.enter(SessionState::Resolving);
                self.resolver.resolve(host).await
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::Resolver;
    use std::time::Duration;
    use tokio::io::{duplex, AsyncReadExt, AsyncWriteExt, DuplexStream};
    use tokio::net::{TcpListener, UdpSocket};
    use trust_dns_proto::op::{Message, MessageType, OpCode};
    use trust_dns_proto::rr::rdata::A;
    use trust_dns_proto::rr::{RData, Record};

    const TEST_PEER: &str = "127.0.0.1:9999";

    /// Resolver whose nameserver answers every A query with `answer`, or
    /// never answers at all when `answer` is `None`.
    async fn test_resolver(answer: Option<Ipv4Addr>, timeout: Duration) -> ResolverHandle {
        let stub = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let upstream = stub.local_addr().unwrap();
        tokio::spawn(async move {
            let mut buf = [0u8; 1024];
            while let Ok((len, from)) = stub.recv_from(&mut buf).await {
                let answer = match answer {
                    Some(answer) => answer,
                    None => continue,
                };
                let query = Message::from_vec(&buf[..len]).unwrap();
                let mut response = Message::new();
                response
                    .set_id(query.id())
                    .set_message_type(MessageType::Response)
                    .set_op_code(OpCode::Query);
                let name = query.queries()[0].name().clone();
                response.add_answer(Record::from_rdata(name, 60, RData::A(A(answer))));
                let _ = stub.send_to(&response.to_vec().unwrap(), from).await;
            }
        });

        let socket = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        Resolver::spawn(socket, upstream, timeout)
    }

    /// Local upstream that reads one request line and answers with `banner`,
    /// then half-closes.
    async fn upstream_server(banner: &'static [u8]) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 256];
            let _ = stream.read(&mut buf).await.unwrap();
            stream.write_all(banner).await.unwrap();
            stream.shutdown().await.unwrap();
            // Drain whatever else the client sends until it closes
            let mut rest = Vec::new();
            let _ = stream.read_to_end(&mut rest).await;
        });
        addr
    }

    fn start_session(
        server_end: DuplexStream,
        resolver: ResolverHandle,
    ) -> tokio::task::JoinHandle<Result<()>> {
        let session = Session::new(server_end, TEST_PEER.parse().unwrap(), resolver);
        tokio::spawn(session.run())
    }

    async fn greet(client: &mut DuplexStream) {
        client.write_all(&[0x05, 0x01, 0x00]).await.unwrap();
        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x00]);
    }

    #[tokio::test]
    async fn test_ipv4_connect_happy_path() {
        let upstream = upstream_server(b"HTTP/1.0 200 OK\r\n\r\n").await;
        let resolver = test_resolver(None, Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(64 * 1024);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&upstream.port().to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..4], &[0x05, 0x00, 0x00, 0x01]);
        // Success replies carry a real bound endpoint
        assert_ne!(&reply[8..10], &[0, 0]);

        client.write_all(b"GET / HTTP/1.0\r\n\r\n").await.unwrap();
        client.shutdown().await.unwrap();

        let mut body = Vec::new();
        client.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"HTTP/1.0 200 OK\r\n\r\n");

        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_domain_connect_resolves_and_relays() {
        let upstream = upstream_server(b"hello from upstream").await;
        let resolver =
            test_resolver(Some(Ipv4Addr::new(127, 0, 0, 1)), Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(64 * 1024);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        let mut request = vec![0x05, 0x01, 0x00, 0x03, 9];
        request.extend_from_slice(b"localhost");
        request.extend_from_slice(&upstream.port().to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(&reply[..2], &[0x05, 0x00]);

        client.write_all(b"ping").await.unwrap();
        client.shutdown().await.unwrap();

        let mut body = Vec::new();
        client.read_to_end(&mut body).await.unwrap();
        assert_eq!(body, b"hello from upstream");

        session.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn test_ipv6_address_type_rejected() {
        let resolver = test_resolver(None, Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(4096);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        let mut request = vec![0x05, 0x01, 0x00, 0x04];
        request.extend_from_slice(&[0u8; 16]);
        request.extend_from_slice(&443u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x08, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);

        // Session is gone: no more bytes, just EOF
        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert!(session.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_bind_command_rejected() {
        let resolver = test_resolver(None, Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(4096);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        let mut request = vec![0x05, 0x02, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&80u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x07);

        assert!(session.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_no_acceptable_method() {
        let resolver = test_resolver(None, Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(4096);
        let session = start_session(server_end, resolver);

        // Only GSSAPI offered
        client.write_all(&[0x05, 0x01, 0x01]).await.unwrap();

        let mut reply = [0u8; 2];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0xFF]);

        let mut rest = Vec::new();
        client.read_to_end(&mut rest).await.unwrap();
        assert!(rest.is_empty());

        assert!(session.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_dns_timeout_reports_host_unreachable() {
        // Nameserver never answers; the query expires on the sweep
        let resolver = test_resolver(None, Duration::from_millis(150)).await;
        let (mut client, server_end) = duplex(4096);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        let started = std::time::Instant::now();
        let mut request = vec![0x05, 0x01, 0x00, 0x03, 12];
        request.extend_from_slice(b"dead.example");
        request.extend_from_slice(&80u16.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply, [0x05, 0x04, 0x00, 0x01, 0, 0, 0, 0, 0, 0]);
        assert!(started.elapsed() < Duration::from_secs(5));

        assert!(session.await.unwrap().is_err());
    }

    #[tokio::test]
    async fn test_connect_refused_reports_host_unreachable() {
        let resolver = test_resolver(None, Duration::from_secs(8)).await;
        let (mut client, server_end) = duplex(4096);
        let session = start_session(server_end, resolver);

        greet(&mut client).await;

        // Bind a listener and drop it so the port is (very likely) dead
        let dead_port = {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            listener.local_addr().unwrap().port()
        };

        let mut request = vec![0x05, 0x01, 0x00, 0x01, 127, 0, 0, 1];
        request.extend_from_slice(&dead_port.to_be_bytes());
        client.write_all(&request).await.unwrap();

        let mut reply = [0u8; 10];
        client.read_exact(&mut reply).await.unwrap();
        assert_eq!(reply[1], 0x04);

        assert!(session.await.unwrap().is_err());
    }

    #[test]
    fn test_session_state_display() {
        assert_eq!(SessionState::Greeting.to_string(), "greeting");
        assert_eq!(SessionState::Resolving.to_string(), "resolving");
        assert_eq!(SessionState::Closed.to_string(), "closed");
    }
}
