//! A collector connection and the per-Observation-Domain template scopes
//! nested under it (spec §3: "ODID scope — child of Session").
//!
//! Grounded on `scoped_parser.rs`'s `IpfixSourceKey`/`V9SourceKey` per-source
//! keying, generalized from "one whole parser per source" to "one
//! `TemplateStore` per (session, ODID)".

use std::collections::HashMap;
use std::net::SocketAddr;

use crate::template::TemplateStore;
use crate::template_events::TemplateProtocol;

/// Transport a session arrived over. Drives whether template withdrawal is
/// honored (spec §9 Open Question 2) — UDP cannot truly remove a template,
/// TCP/TLS/SCTP can (SCTP is treated identically to TCP, Open Question 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Protocol {
    Udp,
    Tcp,
    Tls,
    Sctp,
}

impl Protocol {
    /// Whether this transport supports message reassembly spanning reads
    /// (stream transports) versus one read == one datagram (UDP).
    pub fn is_stream(&self) -> bool {
        !matches!(self, Protocol::Udp)
    }
}

/// One observation domain's worth of state under a session: its template
/// store plus sequence-number bookkeeping for the forthcoming converted
/// IPFIX stream (spec §4.3).
pub struct OdidScope {
    pub observation_domain_id: u32,
    pub templates: TemplateStore,
    /// Cumulative count of records emitted for this ODID, used to
    /// renumber the converted IPFIX message's sequence number (spec §4.3).
    pub emitted_record_count: u64,
}

impl OdidScope {
    pub fn new(observation_domain_id: u32, protocol: Protocol, template_protocol: TemplateProtocol) -> Self {
        Self {
            observation_domain_id,
            templates: TemplateStore::new(protocol, template_protocol),
            emitted_record_count: 0,
        }
    }
}

/// A single collector connection: its transport, peer address, and the
/// observation domains it has sent data for.
pub struct Session {
    pub peer_addr: SocketAddr,
    pub protocol: Protocol,
    pub template_protocol: TemplateProtocol,
    odid_scopes: HashMap<u32, OdidScope>,
}

impl Session {
    pub fn new(peer_addr: SocketAddr, protocol: Protocol, template_protocol: TemplateProtocol) -> Self {
        Self {
            peer_addr,
            protocol,
            template_protocol,
            odid_scopes: HashMap::new(),
        }
    }

    /// Returns the scope for `observation_domain_id`, creating it on first
    /// use.
    pub fn odid_scope(&mut self, observation_domain_id: u32) -> &mut OdidScope {
        let protocol = self.protocol;
        let template_protocol = self.template_protocol;
        self.odid_scopes
            .entry(observation_domain_id)
            .or_insert_with(|| OdidScope::new(observation_domain_id, protocol, template_protocol))
    }

    pub fn odid_count(&self) -> usize {
        self.odid_scopes.len()
    }

    /// Every ODID scope this session currently holds, for periodic
    /// housekeeping (template garbage collection) that touches all of them
    /// rather than one at a time.
    pub fn odid_scopes_mut(&mut self) -> impl Iterator<Item = &mut OdidScope> {
        self.odid_scopes.values_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr() -> SocketAddr {
        "10.0.0.1:2055".parse().unwrap()
    }

    #[test]
    fn odid_scopes_are_created_lazily_and_kept_distinct() {
        let mut session = Session::new(addr(), Protocol::Udp, TemplateProtocol::V9);
        assert_eq!(session.odid_count(), 0);

        session.odid_scope(1).emitted_record_count = 5;
        session.odid_scope(2).emitted_record_count = 9;

        assert_eq!(session.odid_count(), 2);
        assert_eq!(session.odid_scope(1).emitted_record_count, 5);
        assert_eq!(session.odid_scope(2).emitted_record_count, 9);
    }

    #[test]
    fn udp_is_not_a_stream_transport() {
        assert!(!Protocol::Udp.is_stream());
        assert!(Protocol::Tcp.is_stream());
        assert!(Protocol::Tls.is_stream());
        assert!(Protocol::Sctp.is_stream());
    }
}
