//! Asynchronous UDP DNS resolver
//!
//! One UDP socket serves every in-flight lookup. The resolver runs as a
//! dedicated task: sessions submit lookups through a channel and await the
//! answer on a oneshot. Outstanding queries are tracked by their 16-bit
//! transaction ID; incoming datagrams are matched against the tracker, and
//! queries that never get an answer are expired by a periodic sweep.
//!
//! Datagrams that fail to parse or carry an unknown ID are dropped
//! silently; the owning session keeps waiting until its query times out.

mod codec;

pub use codec::{decode_response, encode_query, DnsAnswer};

use crate::error::ResolveError;
use rand::Rng;
use std::collections::HashMap;
use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{interval, Instant};
use tracing::{debug, trace, warn};

/// Upper bound on in-flight queries: every usable transaction ID (zero is
/// reserved for allocation purposes). Reaching it fails new lookups instead
/// of spinning on ID allocation.
pub const MAX_PENDING_QUERIES: usize = u16::MAX as usize;

/// How often expired queries are swept
const SWEEP_INTERVAL: Duration = Duration::from_secs(1);

/// Receive buffer for response datagrams
const RECV_BUFFER_LEN: usize = 4 * 1024;

/// Depth of the lookup submission channel
const LOOKUP_CHANNEL_DEPTH: usize = 256;

type LookupResult = Result<Ipv4Addr, ResolveError>;

struct Lookup {
    host: String,
    reply: oneshot::Sender<LookupResult>,
}

struct PendingQuery {
    reply: oneshot::Sender<LookupResult>,
    submitted_at: Instant,
}

/// Cloneable handle for submitting lookups to the resolver task.
#[derive(Clone)]
pub struct ResolverHandle {
    tx: mpsc::Sender<Lookup>,
}

impl ResolverHandle {
    /// Resolve `host` to its first A record.
    ///
    /// Completes when a response arrives or when the resolver expires the
    /// query; it never waits longer than the configured query timeout plus
    /// one sweep interval.
    pub async fn resolve(&self, host: &str) -> LookupResult {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(Lookup {
                host: host.to_owned(),
                reply,
            })
            .await
            .map_err(|_| ResolveError::ResolverGone)?;
        rx.await.map_err(|_| ResolveError::ResolverGone)?
    }
}

/// The resolver task: socket, upstream nameserver, and the query tracker.
pub struct Resolver {
    socket: UdpSocket,
    upstream: SocketAddr,
    timeout: Duration,
    pending: HashMap<u16, PendingQuery>,
    rx: mpsc::Receiver<Lookup>,
}

impl Resolver {
    /// Spawn the resolver over an already-bound UDP socket and return the
    /// handle sessions use to submit lookups.
    pub fn spawn(socket: UdpSocket, upstream: SocketAddr, timeout: Duration) -> ResolverHandle {
        let (tx, rx) = mpsc::channel(LOOKUP_CHANNEL_DEPTH);
        let resolver = Resolver {
            socket,
            upstream,
            timeout,
            pending: HashMap::new(),
            rx,
        };
        tokio::spawn(resolver.run());
        ResolverHandle { tx }
    }

    async fn run(mut self) {
        let mut sweep = interval(SWEEP_INTERVAL);
        let mut datagram = [0u8; RECV_BUFFER_LEN];

        loop {
            tokio::select! {
                _ = sweep.tick() => {
                    self.sweep_expired();
                }
                lookup = self.rx.recv() => {
                    match lookup {
                        Some(lookup) => self.submit(lookup).await,
                        // Every handle dropped: nothing can submit anymore
                        None => break,
                    }
                }
                received = self.socket.recv_from(&mut datagram) => {
                    match received {
                        Ok((len, _from)) => self.dispatch(&datagram[..len]),
                        Err(e) => warn!("resolver socket error: {}", e),
                    }
                }
            }
        }

        debug!("resolver task stopped");
    }

    /// Encode and send one query, then track it under a fresh ID.
    async fn submit(&mut self, lookup: Lookup) {
        if self.pending.len() >= MAX_PENDING_QUERIES {
            let _ = lookup.reply.send(Err(ResolveError::TrackerFull));
            return;
        }

        let id = self.allocate_id();
        let wire = match codec::encode_query(id, &lookup.host) {
            Ok(wire) => wire,
            Err(e) => {
                let _ = lookup.reply.send(Err(e));
                return;
            }
        };

        if let Err(e) = self.socket.send_to(&wire, self.upstream).await {
            let _ = lookup.reply.send(Err(e.into()));
            return;
        }

        trace!(id, host = %lookup.host, "query sent");
        self.pending.insert(
            id,
            PendingQuery {
                reply: lookup.reply,
                submitted_at: Instant::now(),
            },
        );
    }

    /// Pick a random non-zero ID not currently in flight. Retrying is cheap
    /// while the tracker is well below its cap, and the cap check in
    /// [`Resolver::submit`] keeps this loop from ever running hot.
    fn allocate_id(&self) -> u16 {
        let mut rng = rand::thread_rng();
        loop {
            let id = rng.gen_range(1..=u16::MAX);
            if !self.pending.contains_key(&id) {
                return id;
            }
        }
    }

    /// Match a response datagram against the tracker and wake the session.
    fn dispatch(&mut self, datagram: &[u8]) {
        let answer = match codec::decode_response(datagram) {
            Ok(answer) => answer,
            Err(e) => {
                trace!("dropping malformed datagram: {}", e);
                return;
            }
        };

        let pending = match self.pending.remove(&answer.id) {
            Some(pending) => pending,
            None => {
                trace!(id = answer.id, "dropping datagram for unknown query");
                return;
            }
        };

        let result = answer.addr.ok_or(ResolveError::EmptyAnswer);
        let _ = pending.reply.send(result);
    }

    /// Expire every query older than the timeout.
    fn sweep_expired(&mut self) {
        let now = Instant::now();
        let expired: Vec<u16> = self
            .pending
            .iter()
            .filter(|(_, query)| now.duration_since(query.submitted_at) > self.timeout)
            .map(|(id, _)| *id)
            .collect();

        for id in expired {
            if let Some(query) = self.pending.remove(&id) {
                debug!(id, "query timed out");
                let _ = query.reply.send(Err(ResolveError::Timeout));
            }
        }
    }
}
