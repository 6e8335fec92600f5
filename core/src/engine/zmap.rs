//! zmap process wrapper.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use gatescan_common::hosts::HostSet;
use gatescan_common::network::port::Protocol;
use tracing::info;

use super::command::{self, Exit};
use super::{EngineSettings, ScanEngine, ScanJob, ScanOutput, ScanTargets};
use crate::error::EngineError;

const ENGINE: &str = "zmap";
const MAX_COOLDOWN_SECS: u64 = 8;
/// Headroom for process start and writing results.
const STARTUP_MARGIN_SECS: u64 = 2;

pub struct ZmapEngine {
    binary: PathBuf,
    settings: EngineSettings,
    job_counter: AtomicU64,
}

impl ZmapEngine {
    pub fn new(binary: PathBuf, settings: EngineSettings) -> Self {
        Self {
            binary,
            settings,
            job_counter: AtomicU64::new(0),
        }
    }

    fn build_args(&self, job: &ScanJob, output: &Path, allowlist: Option<&Path>) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "-p".to_string(),
            job.port.number.to_string(),
            "-o".to_string(),
            output.display().to_string(),
            "-r".to_string(),
            job.rate.to_string(),
            "--source-port".to_string(),
            job.source_port.to_string(),
            "--verbosity=2".to_string(),
        ];

        // zmap must exit on its own before the job budget kills it
        let budget = job.timeout.as_secs().max(1);
        let cooldown = (budget / 4).clamp(1, MAX_COOLDOWN_SECS);
        let max_runtime = budget.saturating_sub(cooldown + STARTUP_MARGIN_SECS).max(1);
        args.push("-c".to_string());
        args.push(cooldown.to_string());
        args.push("-t".to_string());
        args.push(max_runtime.to_string());

        if job.port.protocol == Protocol::Udp {
            args.push("-M".to_string());
            args.push("udp".to_string());
        }
        if let Some(iface) = &self.settings.iface {
            args.push("-i".to_string());
            args.push(iface.clone());
        }
        if let Some(exclude) = &self.settings.exclude_file {
            args.push("-b".to_string());
            args.push(exclude.display().to_string());
        }

        match (&job.targets, allowlist) {
            (_, Some(allowlist)) => {
                args.push("-w".to_string());
                args.push(allowlist.display().to_string());
            }
            (ScanTargets::Space(collection), None) => {
                args.extend(collection.to_cidr_strings());
            }
            (ScanTargets::Hosts(_), None) => {}
        }

        args
    }
}

#[async_trait]
impl ScanEngine for ZmapEngine {
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
        let stem = format!("zmap_{id:03}_{}", job.tag);
        let output = self.settings.work_dir.join(format!("{stem}.csv"));

        let allowlist = match &job.targets {
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
            "zmap sweep of {} on {} from source port {}",
            job.targets.describe(),
            job.port,
            job.source_port
        );
        let args = self.build_args(&job, &output, allowlist.as_deref());
        let exit = command::run(ENGINE, &self.binary, &args, job.timeout).await?;

        let text = command::read_output(&output, exit).await?;
        Ok(ScanOutput {
            responders: parse_output(&text),
            truncated: exit == Exit::OutOfTime,
        })
    }
}

/// zmap writes CSV with `saddr` first; headers and junk lines are skipped.
pub fn parse_output(text: &str) -> HostSet {
    text.lines()
        .filter_map(|line| line.split(',').next())
        .filter_map(|field| field.trim().parse::<Ipv4Addr>().ok())
        .collect()
}
