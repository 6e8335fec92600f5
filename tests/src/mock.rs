//! In-memory engines for driving the pipeline without touching the network.

use std::collections::{BTreeMap, VecDeque};
use std::net::Ipv4Addr;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use gatescan_common::hosts::HostSet;
use gatescan_common::record::ProbePayload;
use gatescan_core::engine::{
    ProbeEngine, ProbeJob, ProbeReply, ScanEngine, ScanJob, ScanOutput, ScanTargets,
};
use gatescan_core::{EngineError, StopSignal};
use tokio::sync::mpsc;

/// How one simulated host treats incoming probes.
#[derive(Debug, Clone, Copy, Default)]
pub struct HostBehavior {
    /// Answers on the service port when the probe comes from the designated port.
    pub gated: bool,
    /// Answers on the service port from any source port.
    pub open: bool,
    /// Number of high-port probes silently dropped before it starts answering.
    pub drops: u32,
    /// Speaks the application protocol once connected.
    pub speaks: bool,
}

impl HostBehavior {
    pub fn affected() -> Self {
        Self {
            gated: true,
            speaks: true,
            ..Self::default()
        }
    }

    pub fn open_to_all() -> Self {
        Self {
            gated: true,
            open: true,
            speaks: true,
            ..Self::default()
        }
    }

    pub fn lossy_open(drops: u32) -> Self {
        Self {
            drops,
            ..Self::open_to_all()
        }
    }

    pub fn silent_gated() -> Self {
        Self {
            gated: true,
            ..Self::default()
        }
    }
}

/// A tiny network behind a source-port-filtering firewall.
pub struct SimulatedNetwork {
    designated: u16,
    hosts: Mutex<BTreeMap<Ipv4Addr, (HostBehavior, u32)>>,
    pub scan_jobs: Mutex<Vec<(usize, u16)>>,
    pub probe_jobs: Mutex<Vec<(usize, Option<u16>)>>,
}

impl SimulatedNetwork {
    pub fn new(designated: u16, hosts: &[(Ipv4Addr, HostBehavior)]) -> Self {
        Self {
            designated,
            hosts: Mutex::new(hosts.iter().map(|(ip, b)| (*ip, (*b, 0))).collect()),
            scan_jobs: Mutex::new(Vec::new()),
            probe_jobs: Mutex::new(Vec::new()),
        }
    }

    fn answers(&self, ip: &Ipv4Addr, source_port: Option<u16>) -> bool {
        let mut hosts = self.hosts.lock().unwrap();
        let Some((behavior, dropped)) = hosts.get_mut(ip) else {
            return false;
        };
        if source_port == Some(self.designated) {
            return behavior.gated;
        }
        if !behavior.open {
            return false;
        }
        if *dropped < behavior.drops {
            *dropped += 1;
            return false;
        }
        true
    }

    fn in_space(&self, targets: &ScanTargets) -> Vec<Ipv4Addr> {
        let hosts = self.hosts.lock().unwrap();
        match targets {
            ScanTargets::Space(space) => hosts.keys().filter(|ip| space.contains(*ip)).copied().collect(),
            ScanTargets::Hosts(list) => list.sorted(),
        }
    }
}

#[async_trait]
impl ScanEngine for SimulatedNetwork {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn ensure_available(&self) -> Result<(), EngineError> {
        Ok(())
    }

    async fn scan(&self, job: ScanJob) -> Result<ScanOutput, EngineError> {
        let targets = self.in_space(&job.targets);
        self.scan_jobs.lock().unwrap().push((targets.len(), job.source_port));
        let responders: HostSet = targets
            .into_iter()
            .filter(|ip| self.answers(ip, Some(job.source_port)))
            .collect();
        Ok(responders.into())
    }
}

#[async_trait]
impl ProbeEngine for SimulatedNetwork {
    fn name(&self) -> &str {
        "simulated"
    }

    async fn probe(&self, job: ProbeJob) -> Result<mpsc::Receiver<ProbeReply>, EngineError> {
        self.probe_jobs.lock().unwrap().push((job.targets.len(), job.source_port));
        let speakers: Vec<Ipv4Addr> = {
            let hosts = self.hosts.lock().unwrap();
            job.targets
                .sorted()
                .into_iter()
                .filter(|ip| hosts.get(ip).is_some_and(|(b, _)| b.speaks))
                .collect()
        };
        let replies: Vec<ProbeReply> = speakers
            .into_iter()
            .filter(|ip| self.answers(ip, job.source_port))
            .map(|ip| ProbeReply {
                ip,
                payload: ProbePayload::Banner {
                    text: format!("SSH-2.0-sim-{ip}"),
                },
            })
            .collect();

        let (tx, rx) = mpsc::channel(replies.len().max(1));
        tokio::spawn(async move {
            for reply in replies {
                let _ = tx.send(reply).await;
            }
        });
        Ok(rx)
    }
}

/// What a scripted engine does on one call.
#[derive(Debug)]
pub enum Step {
    Answer(Vec<Ipv4Addr>),
    /// Sleeps before answering, to trip the round timeout.
    Stall(Duration),
    Fail(&'static str),
    /// Answers, then raises the stop signal.
    AnswerAndStop(Vec<Ipv4Addr>, StopSignal),
}

/// Plays back a fixed sequence of steps, one per call. Runs dry into empty answers.
pub struct Scripted {
    steps: Mutex<VecDeque<Step>>,
    available: bool,
    pub calls: Mutex<Vec<(HostSet, Option<u16>)>>,
}

impl Scripted {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            available: true,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn unavailable() -> Self {
        Self {
            available: false,
            ..Self::new(Vec::new())
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    async fn next(&self, targets: HostSet, source_port: Option<u16>) -> Result<HostSet, EngineError> {
        self.calls.lock().unwrap().push((targets, source_port));
        let step = self.steps.lock().unwrap().pop_front();
        match step {
            None => Ok(HostSet::new()),
            Some(Step::Answer(ips)) => Ok(ips.into_iter().collect()),
            Some(Step::Stall(delay)) => {
                tokio::time::sleep(delay).await;
                Ok(HostSet::new())
            }
            Some(Step::Fail(reason)) => Err(EngineError::failed("scripted", reason)),
            Some(Step::AnswerAndStop(ips, stop)) => {
                stop.stop();
                Ok(ips.into_iter().collect())
            }
        }
    }
}

#[async_trait]
impl ScanEngine for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn ensure_available(&self) -> Result<(), EngineError> {
        if self.available {
            Ok(())
        } else {
            Err(EngineError::unavailable("scripted", "binary missing"))
        }
    }

    async fn scan(&self, job: ScanJob) -> Result<ScanOutput, EngineError> {
        let targets = match job.targets {
            ScanTargets::Hosts(hosts) => hosts,
            ScanTargets::Space(_) => HostSet::new(),
        };
        self.next(targets, Some(job.source_port)).await.map(ScanOutput::from)
    }
}

#[async_trait]
impl ProbeEngine for Scripted {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn probe(&self, job: ProbeJob) -> Result<mpsc::Receiver<ProbeReply>, EngineError> {
        let ips = self.next(job.targets, job.source_port).await?;
        let (tx, rx) = mpsc::channel(ips.len().max(1));
        for ip in ips.sorted() {
            let _ = tx
                .send(ProbeReply {
                    ip,
                    payload: ProbePayload::Raw { bytes: vec![1] },
                })
                .await;
        }
        Ok(rx)
    }
}
