//! masscan process wrapper.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use gatescan_common::hosts::HostSet;
use gatescan_common::network::port::{PortSpec, Protocol};
use tracing::info;

use super::command::{self, Exit};
use super::{EngineSettings, ScanEngine, ScanJob, ScanOutput, ScanTargets};
use crate::error::EngineError;

const ENGINE: &str = "masscan";
const MAX_WAIT_SECS: u64 = 10;

pub struct MasscanEngine {
    binary: PathBuf,
    settings: EngineSettings,
    job_counter: AtomicU64,
}

impl MasscanEngine {
    pub fn new(binary: PathBuf, settings: EngineSettings) -> Self {
        Self {
            binary,
            settings,
            job_counter: AtomicU64::new(0),
        }
    }

    fn build_args(&self, job: &ScanJob, output: &Path, include: Option<&Path>) -> Vec<String> {
        let mut args: Vec<String> = Vec::new();

        match (&job.targets, include) {
            (_, Some(include)) => {
                args.push("--includefile".to_string());
                args.push(include.display().to_string());
            }
            (ScanTargets::Space(collection), None) => {
                args.extend(collection.to_range_strings());
            }
            (ScanTargets::Hosts(_), None) => {}
        }

        args.extend([
            "-p".to_string(),
            port_arg(job.port),
            "--rate".to_string(),
            job.rate.to_string(),
            "--source-port".to_string(),
            job.source_port.to_string(),
            "--wait".to_string(),
            (job.timeout.as_secs() / 4).clamp(1, MAX_WAIT_SECS).to_string(),
            "-oL".to_string(),
            output.display().to_string(),
        ]);

        if let Some(iface) = &self.settings.iface {
            args.push("-e".to_string());
            args.push(iface.clone());
        }
        match &self.settings.exclude_file {
            Some(exclude) => {
                args.push("--excludefile".to_string());
                args.push(exclude.display().to_string());
            }
            // masscan refuses a full sweep without at least one exclusion
            None => {
                args.push("--exclude".to_string());
                args.push("255.255.255.255".to_string());
            }
        }

        args
    }
}

fn port_arg(port: PortSpec) -> String {
    match port.protocol {
        Protocol::Tcp => port.number.to_string(),
        Protocol::Udp => format!("U:{}", port.number),
    }
}

#[async_trait]
impl ScanEngine for MasscanEngine {
    fn name(&self) -> &str {
        ENGINE
    }

    async fn ensure_available(&self) -> Result<(), EngineError> {
        if command::is_executable(&self.binary) {
            Ok(())
        } else {
            Err(EngineError::unavailable(
                ENGINE,
                format!("{} is not an executable file", self.binary.display()),
            ))
        }
    }

    async fn scan(&self, job: ScanJob) -> Result<ScanOutput, EngineError> {
        let id = self.job_counter.fetch_add(1, Ordering::Relaxed);
        tokio::fs::create_dir_all(&self.settings.work_dir).await?;
        let stem = format!("masscan_{id:03}_{}", job.tag);
        let output = self.settings.work_dir.join(format!("{stem}.list"));

        let include = match &job.targets {
            ScanTargets::Hosts(hosts) => {
                if hosts.is_empty() {
                    return Ok(ScanOutput::default());
                }
                let path = self.settings.work_dir.join(format!("{stem}.targets"));
                command::write_host_list(&path, hosts).await?;
                Some(path)
            }
            ScanTargets::Space(_) => None,
        };

        info!(
            "masscan sweep of {} on {} from source port {}",
            job.targets.describe(),
            job.port,
            job.source_port
        );
        let args = self.build_args(&job, &output, include.as_deref());
        // masscan has no runtime cap of its own, so a long sweep is cut at the
        // budget and keeps whatever it listed so far
        let exit = command::run(ENGINE, &self.binary, &args, job.timeout).await?;

        let text = command::read_output(&output, exit).await?;
        Ok(ScanOutput {
            responders: parse_output(&text, job.port),
            truncated: exit == Exit::OutOfTime,
        })
    }
}

/// Reads `-oL` output: `open <proto> <port> <ip> <timestamp>` per line.
pub fn parse_output(text: &str, port: PortSpec) -> HostSet {
    let proto = port.protocol.to_string();
    text.lines()
        .filter_map(|line| {
            let fields: Vec<&str> = line.split_whitespace().collect();
            match fields.as_slice() {
                ["open", p, number, ip, ..] if *p == proto && number.parse() == Ok(port.number) => {
                    ip.parse::<Ipv4Addr>().ok()
                }
                _ => None,
            }
        })
        .collect()
}
