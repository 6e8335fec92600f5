//! The outbound **abstraction** over external scanning collaborators.
//!
//! The pipeline only ever talks to [`ScanEngine`] and [`ProbeEngine`]. Concrete
//! engines (the [`zmap`] and [`masscan`] process wrappers, the [`socket`]
//! prober) are picked once at startup by [`resolve`] and never inspected again.
//!
//! **Architectural Note:**
//! Phases must depend on these traits only. Branching on the concrete engine
//! anywhere in the core would make runs depend on which binary happens to be
//! installed.

use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use gatescan_common::hosts::HostSet;
use gatescan_common::network::port::PortSpec;
use gatescan_common::network::range::IpCollection;
use gatescan_common::record::ProbePayload;
use gatescan_protocols::ProtocolTemplate;
use tokio::sync::mpsc;

use crate::error::EngineError;

mod command;
pub mod masscan;
pub mod resolve;
pub mod socket;
pub mod zmap;

/// What a scan job sweeps.
#[derive(Debug, Clone)]
pub enum ScanTargets {
    /// An address space given as ranges, possibly the whole internet.
    Space(IpCollection),
    /// An explicit list of hosts, typically a shrinking frontier.
    Hosts(HostSet),
}

impl ScanTargets {
    pub fn describe(&self) -> String {
        match self {
            ScanTargets::Space(collection) => format!("{} addresses", collection.len()),
            ScanTargets::Hosts(hosts) => format!("{} hosts", hosts.len()),
        }
    }
}

/// One round's worth of work for a scan engine.
#[derive(Debug, Clone)]
pub struct ScanJob {
    pub targets: ScanTargets,
    /// Destination port (and transport) under test.
    pub port: PortSpec,
    /// Outbound source port every probe must carry.
    pub source_port: u16,
    /// Packets per second.
    pub rate: u64,
    /// Time budget for the whole job. Process engines kill the scanner once it runs out.
    pub timeout: Duration,
    /// Short label used by engines that write intermediate files.
    pub tag: String,
}

/// What a scan job found.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanOutput {
    pub responders: HostSet,
    /// The engine ran out of time; `responders` is what it reported before that.
    pub truncated: bool,
}

impl From<HostSet> for ScanOutput {
    fn from(responders: HostSet) -> Self {
        Self {
            responders,
            truncated: false,
        }
    }
}

#[async_trait]
pub trait ScanEngine: Send + Sync {
    fn name(&self) -> &str;

    /// Verifies the engine can be invoked at all. Called once, before any phase.
    async fn ensure_available(&self) -> Result<(), EngineError>;

    /// Returns the addresses that answered. Non-responders are simply absent.
    async fn scan(&self, job: ScanJob) -> Result<ScanOutput, EngineError>;
}

/// One round's worth of work for a probe engine.
#[derive(Debug, Clone)]
pub struct ProbeJob {
    pub targets: HostSet,
    pub port: PortSpec,
    pub template: ProtocolTemplate,
    /// Source port to bind, `None` for an ephemeral port.
    pub source_port: Option<u16>,
    /// Budget per host.
    pub timeout: Duration,
    pub concurrency: usize,
}

/// A single structured answer from one host.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeReply {
    pub ip: Ipv4Addr,
    pub payload: ProbePayload,
}

#[async_trait]
pub trait ProbeEngine: Send + Sync {
    fn name(&self) -> &str;

    async fn ensure_available(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Starts probing and streams one reply per responding host. The channel
    /// closes once every target has been tried.
    async fn probe(&self, job: ProbeJob) -> Result<mpsc::Receiver<ProbeReply>, EngineError>;
}

/// Settings shared by the process-backed scan engines.
#[derive(Debug, Clone, Default)]
pub struct EngineSettings {
    pub iface: Option<String>,
    pub exclude_file: Option<PathBuf>,
    /// Where intermediate target and result files go.
    pub work_dir: PathBuf,
}
