//! Application-layer probe templates.
//!
//! A template knows what to send to a service and how to read the answer.
//! The socket work itself lives with the probe engine in `gatescan-core`.

use std::net::Ipv4Addr;

use gatescan_common::network::port::{Protocol, ServiceSpec};
use gatescan_common::record::ProbePayload;

pub mod banner;
pub mod dns;
pub mod http;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProtocolTemplate {
    /// `GET /` over TCP.
    HttpGet { path: String },
    /// An `A` query over UDP.
    DnsQuery { qname: String },
    /// Connect and read whatever the server says first (ssh, ftp, mysql, smtp...).
    TcpBanner,
    /// Send an empty datagram and accept any answer.
    UdpEcho,
}

impl ProtocolTemplate {
    /// Picks the probe matching a service, by name first and transport second.
    pub fn for_service(service: &ServiceSpec) -> Self {
        match (service.name.as_str(), service.port.protocol) {
            ("http", Protocol::Tcp) => ProtocolTemplate::HttpGet {
                path: "/".to_string(),
            },
            ("dns", Protocol::Udp) => ProtocolTemplate::DnsQuery {
                qname: dns::PROBE_QNAME.to_string(),
            },
            (_, Protocol::Tcp) => ProtocolTemplate::TcpBanner,
            (_, Protocol::Udp) => ProtocolTemplate::UdpEcho,
        }
    }

    /// Bytes to send after connecting. `None` means wait for the server to talk first.
    pub fn request(&self, ip: Ipv4Addr, transaction_id: u16) -> anyhow::Result<Option<Vec<u8>>> {
        match self {
            ProtocolTemplate::HttpGet { path } => Ok(Some(http::create_get_request(ip, path))),
            ProtocolTemplate::DnsQuery { qname } => {
                Ok(Some(dns::create_a_packet(qname, transaction_id)?))
            }
            ProtocolTemplate::TcpBanner => Ok(None),
            ProtocolTemplate::UdpEcho => Ok(Some(Vec::new())),
        }
    }

    /// Turns raw bytes into a structured reply, or `None` when they are not one.
    pub fn parse(&self, raw: &[u8], transaction_id: u16) -> Option<ProbePayload> {
        match self {
            ProtocolTemplate::HttpGet { .. } => http::parse_response(raw),
            ProtocolTemplate::DnsQuery { .. } => dns::parse_reply(raw, transaction_id),
            ProtocolTemplate::TcpBanner => banner::parse_banner(raw),
            ProtocolTemplate::UdpEcho => (!raw.is_empty()).then(|| ProbePayload::Raw {
                bytes: raw.to_vec(),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ProtocolTemplate::HttpGet { .. } => "http-get",
            ProtocolTemplate::DnsQuery { .. } => "dns-query",
            ProtocolTemplate::TcpBanner => "tcp-banner",
            ProtocolTemplate::UdpEcho => "udp-echo",
        }
    }
}

/// Random DNS transaction id.
pub fn transaction_id() -> u16 {
    rand::random()
}
