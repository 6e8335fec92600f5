pub mod check;
pub mod run;

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use gatescan_common::config::{HighPortPolicy, RunConfig, ScannerKind};
use gatescan_common::network::port::{PortSpec, ServiceSpec};
use gatescan_common::network::target::Target;

#[derive(Parser)]
#[command(name = "gatescan")]
#[command(about = "Finds services reachable only from whitelisted source ports.")]
#[command(version)]
pub struct CommandLine {
    #[command(subcommand)]
    pub command: Commands,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Less terminal output (-q drops headers, -qq only prints the summary)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Do not print the banner
    #[arg(long, global = true)]
    pub no_banner: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the three-phase differential scan
    #[command(alias = "r")]
    Run(RunArgs),
    /// Show which scan engine would be used
    #[command(alias = "c")]
    Check {
        #[arg(long, default_value = "auto")]
        scanner: ScannerKind,
    },
}

#[derive(Args, Debug, Default)]
pub struct RunArgs {
    /// TOML run configuration; flags below override it
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Designated source port, e.g. tcp/80 or udp/53 (repeatable)
    #[arg(short = 'd', long = "designated")]
    pub designated: Vec<PortSpec>,

    /// Target service, e.g. ssh:tcp/22 or tcp/3306 (repeatable)
    #[arg(short = 's', long = "service")]
    pub services: Vec<ServiceSpec>,

    /// Address space for the designated-port sweep (host, range, CIDR, list or "internet")
    #[arg(short, long)]
    pub target: Option<Target>,

    /// Stop a phase once a round's response rate falls below this fraction
    #[arg(long)]
    pub threshold: Option<f64>,

    #[arg(long)]
    pub max_iterations: Option<usize>,

    /// Seed for high source port selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// High source port range, e.g. 20000-65535
    #[arg(long, value_parser = parse_port_range)]
    pub high_ports: Option<(u16, u16)>,

    #[arg(long)]
    pub high_port_policy: Option<HighPortPolicy>,

    /// Packets per second
    #[arg(short, long)]
    pub rate: Option<u64>,

    #[arg(long)]
    pub scanner: Option<ScannerKind>,

    /// Network interface handed to the scanner
    #[arg(short, long)]
    pub iface: Option<String>,

    #[arg(long)]
    pub exclude_file: Option<PathBuf>,

    /// Seconds per scan round
    #[arg(long)]
    pub round_timeout: Option<u64>,

    /// Milliseconds per application-layer probe
    #[arg(long)]
    pub probe_timeout: Option<u64>,

    #[arg(long)]
    pub probe_concurrency: Option<usize>,

    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    /// Layers the flags over `base`.
    pub fn apply(&self, mut base: RunConfig) -> RunConfig {
        if !self.designated.is_empty() {
            base.designated_ports = self.designated.clone();
        }
        if !self.services.is_empty() {
            base.services = self.services.clone();
        }
        if let Some(target) = &self.target {
            base.target = target.clone();
        }
        if let Some((start, end)) = self.high_ports {
            base.high_port_start = start;
            base.high_port_end = end;
        }
        if let Some(path) = &self.exclude_file {
            base.exclude_file = Some(path.clone());
        }
        if let Some(iface) = &self.iface {
            base.iface = Some(iface.clone());
        }
        if let Some(output) = &self.output {
            base.output_dir = output.clone();
        }

        base.threshold = self.threshold.unwrap_or(base.threshold);
        base.max_iterations = self.max_iterations.unwrap_or(base.max_iterations);
        base.seed = self.seed.unwrap_or(base.seed);
        base.high_port_policy = self.high_port_policy.unwrap_or(base.high_port_policy);
        base.rate = self.rate.unwrap_or(base.rate);
        base.scanner = self.scanner.unwrap_or(base.scanner);
        base.round_timeout_secs = self.round_timeout.unwrap_or(base.round_timeout_secs);
        base.probe_timeout_ms = self.probe_timeout.unwrap_or(base.probe_timeout_ms);
        base.probe_concurrency = self.probe_concurrency.unwrap_or(base.probe_concurrency);
        base
    }
}

fn parse_port_range(s: &str) -> Result<(u16, u16), String> {
    let (start, end) = s
        .split_once('-')
        .ok_or_else(|| format!("expected START-END, got '{s}'"))?;
    let start: u16 = start.trim().parse().map_err(|e| format!("bad start port: {e}"))?;
    let end: u16 = end.trim().parse().map_err(|e| format!("bad end port: {e}"))?;
    Ok((start, end))
}

impl CommandLine {
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
