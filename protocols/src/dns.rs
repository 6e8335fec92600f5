use anyhow::Context;
use dns_parser::Packet;
use pnet::packet::dns::{DnsClass, DnsQuery, DnsTypes, MutableDnsPacket, Opcode, Retcode};

use gatescan_common::record::ProbePayload;

pub const DNS_HDR_LEN: usize = 12;

/// Name asked for in service probes. Any answer, even NXDOMAIN, proves a live resolver.
pub const PROBE_QNAME: &str = "www.example.com";

pub fn create_a_packet(name: &str, id: u16) -> anyhow::Result<Vec<u8>> {
    let query: DnsQuery = create_a_query(name);
    let q_fixed_len: usize = 4;
    let qlen: usize = query.qname.len() + q_fixed_len;
    let total: usize = DNS_HDR_LEN + qlen;
    let mut buffer: Vec<u8> = vec![0u8; total];

    {
        let mut dns: MutableDnsPacket =
            MutableDnsPacket::new(&mut buffer).context("creating dns header")?;
        dns.set_id(id);
        dns.set_is_response(0);
        dns.set_opcode(Opcode::StandardQuery);
        dns.set_is_authoriative(0);
        dns.set_is_truncated(0);
        dns.set_is_recursion_desirable(1);
        dns.set_is_recursion_available(0);
        dns.set_zero_reserved(0);
        dns.set_is_non_authenticated_data(0);
        dns.set_rcode(Retcode::NoError);
        dns.set_query_count(1);
        dns.set_response_count(0);
        dns.set_authority_rr_count(0);
        dns.set_additional_rr_count(0);
    }

    // The pnet builder cannot serialize queries, so they are written by hand
    let mut cursor: usize = DNS_HDR_LEN;

    buffer[cursor..cursor + query.qname.len()].copy_from_slice(&query.qname);
    cursor += query.qname.len();

    buffer[cursor..cursor + 2].copy_from_slice(&query.qtype.0.to_be_bytes());
    cursor += 2;

    buffer[cursor..cursor + 2].copy_from_slice(&query.qclass.0.to_be_bytes());

    Ok(buffer)
}

/// Summarizes a reply. Only replies carrying the expected transaction id count.
pub fn parse_reply(payload: &[u8], expected_id: u16) -> Option<ProbePayload> {
    let packet = Packet::parse(payload).ok()?;
    if packet.header.id != expected_id || packet.header.query {
        return None;
    }
    let rcode: u8 = packet.header.response_code.into();
    Some(ProbePayload::Dns {
        rcode,
        answers: packet.answers.len(),
    })
}

fn create_a_query(name: &str) -> DnsQuery {
    DnsQuery {
        qname: encode_dns_name(name),
        qtype: DnsTypes::A,
        qclass: DnsClass(1),
        payload: Vec::new(),
    }
}

fn encode_dns_name(name: &str) -> Vec<u8> {
    let mut encoded: Vec<u8> = Vec::new();
    for label in name.split('.') {
        if label.is_empty() {
            continue;
        }
        encoded.push(label.len() as u8);
        encoded.extend_from_slice(label.as_bytes());
    }
    encoded.push(0);
    encoded
}
