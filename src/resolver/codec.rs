//! DNS wire encoding for A-record lookups
//!
//! Builds outgoing queries and extracts the first A answer from responses.
//! Only the pieces of the DNS protocol the proxy needs are exposed.

use crate::error::ResolveError;
use std::net::Ipv4Addr;
use trust_dns_proto::op::{Message, MessageType, OpCode, Query};
use trust_dns_proto::rr::{Name, RData, RecordType};

/// Decoded response: the transaction ID and the first A answer, if any.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsAnswer {
    /// Transaction ID echoed from the query
    pub id: u16,
    /// First A record in the answer section; `None` when the section has no
    /// A records (empty answers, NXDOMAIN, CNAME chains with no address)
    pub addr: Option<Ipv4Addr>,
}

/// Encode a recursive A/IN query for `host` under the given transaction ID.
///
/// The name is canonicalised with a trailing dot so relative resolution
/// never applies.
pub fn encode_query(id: u16, host: &str) -> Result<Vec<u8>, ResolveError> {
    let fqdn = if host.ends_with('.') {
        host.to_owned()
    } else {
        format!("{}.", host)
    };
    let name =
        Name::from_utf8(&fqdn).map_err(|e| ResolveError::InvalidName(e.to_string()))?;

    let mut message = Message::new();
    message
        .set_id(id)
        .set_message_type(MessageType::Query)
        .set_op_code(OpCode::Query)
        .set_recursion_desired(true)
        .add_query(Query::query(name, RecordType::A));

    message
        .to_vec()
        .map_err(|e| ResolveError::Proto(e.to_string()))
}

/// Decode a response datagram.
///
/// Walks the answer section in order and keeps the first A record; other
/// record types (CNAMEs in particular) are skipped.
pub fn decode_response(datagram: &[u8]) -> Result<DnsAnswer, ResolveError> {
    let message =
        Message::from_vec(datagram).map_err(|e| ResolveError::Proto(e.to_string()))?;

    let addr = message.answers().iter().find_map(|record| match record.data() {
        Some(RData::A(a)) => Some(a.0),
        _ => None,
    });

    Ok(DnsAnswer {
        id: message.id(),
        addr,
    })
}
