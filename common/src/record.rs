//! Probe response records and the response set built from them.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::hosts::HostSet;
use crate::network::port::PortSpec;

/// What came back from an application-layer probe.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProbePayload {
    Http {
        status: u16,
        server: Option<String>,
        length: usize,
    },
    Banner {
        text: String,
    },
    Dns {
        rcode: u8,
        answers: usize,
    },
    Raw {
        bytes: Vec<u8>,
    },
}

/// One structured reply, immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProbeResponseRecord {
    pub ip: Ipv4Addr,
    pub port: PortSpec,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub payload: ProbePayload,
}

impl ProbeResponseRecord {
    pub fn new(ip: Ipv4Addr, port: PortSpec, service: impl Into<String>, payload: ProbePayload) -> Self {
        Self {
            ip,
            port,
            service: service.into(),
            timestamp: Utc::now(),
            payload,
        }
    }
}

/// Records grouped by owning host. Retraction removes every record of a host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResponseSet {
    records: BTreeMap<Ipv4Addr, Vec<ProbeResponseRecord>>,
}

impl ResponseSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, record: ProbeResponseRecord) {
        self.records.entry(record.ip).or_default().push(record);
    }

    /// Drops every record owned by `ip`, returning them.
    pub fn retract(&mut self, ip: &Ipv4Addr) -> Vec<ProbeResponseRecord> {
        self.records.remove(ip).unwrap_or_default()
    }

    pub fn contains_host(&self, ip: &Ipv4Addr) -> bool {
        self.records.contains_key(ip)
    }

    pub fn hosts(&self) -> HostSet {
        self.records.keys().copied().collect()
    }

    /// Number of hosts with at least one record.
    pub fn host_count(&self) -> usize {
        self.records.len()
    }

    pub fn record_count(&self) -> usize {
        self.records.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &ProbeResponseRecord> {
        self.records.values().flatten()
    }

    pub fn records_for(&self, ip: &Ipv4Addr) -> &[ProbeResponseRecord] {
        self.records.get(ip).map(Vec::as_slice).unwrap_or(&[])
    }
}
