//! Run configuration, read-only to the pipeline.
//!
//! Defaults mirror the classic setup: designated ports TCP 80 and UDP 53 tested
//! against ssh, ftp, mysql and http.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::network::port::{PortSpec, ServiceSpec, TargetPortSpec};
use crate::network::target::Target;

pub const DEFAULT_THRESHOLD: f64 = 0.01;
pub const DEFAULT_MAX_ITERATIONS: usize = 10;
pub const DEFAULT_SEED: u64 = 1337;
pub const DEFAULT_HIGH_PORTS: (u16, u16) = (20_000, 65_535);

/// Terminal behaviour of the CLI.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// Hides the banner line.
    pub no_banner: bool,
    /// 0 prints everything, 1 drops headers, 2 only prints the summary.
    pub quiet: u8,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path:?}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration value for {key}: {message}")]
    Invalid { key: &'static str, message: String },
}

/// Which scan engine the run should use. `Auto` is resolved once, at startup.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScannerKind {
    #[default]
    Auto,
    Zmap,
    Masscan,
}

impl fmt::Display for ScannerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScannerKind::Auto => write!(f, "auto"),
            ScannerKind::Zmap => write!(f, "zmap"),
            ScannerKind::Masscan => write!(f, "masscan"),
        }
    }
}

impl FromStr for ScannerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(ScannerKind::Auto),
            "zmap" => Ok(ScannerKind::Zmap),
            "masscan" => Ok(ScannerKind::Masscan),
            other => Err(format!("unknown scanner '{other}' (expected auto, zmap or masscan)")),
        }
    }
}

/// How fresh high source ports are drawn across rounds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HighPortPolicy {
    /// Uniform over the range, never repeating a port within a run.
    #[default]
    UniformWithoutReplacement,
    /// Uniform over the range, repeats allowed.
    UniformWithReplacement,
}

impl FromStr for HighPortPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "without-replacement" | "uniform-without-replacement" => {
                Ok(HighPortPolicy::UniformWithoutReplacement)
            }
            "with-replacement" | "uniform-with-replacement" => {
                Ok(HighPortPolicy::UniformWithReplacement)
            }
            other => Err(format!("unknown high port policy '{other}'")),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Source ports the firewall is suspected to whitelist.
    pub designated_ports: Vec<PortSpec>,
    /// Internal services whose reachability is tested.
    pub services: Vec<ServiceSpec>,
    /// Address space swept by the designated-port round.
    pub target: Target,
    /// A phase stops once a round's response rate drops below this fraction.
    pub threshold: f64,
    /// Hard cap on rounds per phase.
    pub max_iterations: usize,
    pub seed: u64,
    /// Inclusive bounds for random high source ports.
    pub high_port_start: u16,
    pub high_port_end: u16,
    pub high_port_policy: HighPortPolicy,
    /// Packets per second handed to the scan engine.
    pub rate: u64,
    pub round_timeout_secs: u64,
    pub probe_timeout_ms: u64,
    pub probe_concurrency: usize,
    pub scanner: ScannerKind,
    pub iface: Option<String>,
    pub exclude_file: Option<PathBuf>,
    pub output_dir: PathBuf,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            designated_ports: vec![PortSpec::tcp(80), PortSpec::udp(53)],
            services: vec![
                ServiceSpec::new("ssh", PortSpec::tcp(22)),
                ServiceSpec::new("ftp", PortSpec::tcp(21)),
                ServiceSpec::new("mysql", PortSpec::tcp(3306)),
                ServiceSpec::new("http", PortSpec::tcp(80)),
            ],
            target: Target::Internet,
            threshold: DEFAULT_THRESHOLD,
            max_iterations: DEFAULT_MAX_ITERATIONS,
            seed: DEFAULT_SEED,
            high_port_start: DEFAULT_HIGH_PORTS.0,
            high_port_end: DEFAULT_HIGH_PORTS.1,
            high_port_policy: HighPortPolicy::default(),
            rate: 10_000,
            round_timeout_secs: 30,
            probe_timeout_ms: 3_000,
            probe_concurrency: 256,
            scanner: ScannerKind::Auto,
            iface: None,
            exclude_file: None,
            output_dir: PathBuf::from("outputs"),
        }
    }
}

impl RunConfig {
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    pub fn round_timeout(&self) -> Duration {
        Duration::from_secs(self.round_timeout_secs)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    /// Every designated port paired with every service, in configuration order.
    pub fn pairs(&self) -> Vec<TargetPortSpec> {
        self.designated_ports
            .iter()
            .flat_map(|designated| {
                self.services
                    .iter()
                    .map(move |service| TargetPortSpec::new(*designated, service.clone()))
            })
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.threshold > 0.0 && self.threshold <= 1.0) {
            return Err(invalid("threshold", format!("{} is outside (0, 1]", self.threshold)));
        }
        if self.max_iterations == 0 {
            return Err(invalid("max_iterations", "must be at least 1".to_string()));
        }
        if self.high_port_start == 0 || self.high_port_start > self.high_port_end {
            return Err(invalid(
                "high_port_start",
                format!("empty range {}..={}", self.high_port_start, self.high_port_end),
            ));
        }
        if self.designated_ports.is_empty() {
            return Err(invalid("designated_ports", "no designated port configured".to_string()));
        }
        if self.services.is_empty() {
            return Err(invalid("services", "no target service configured".to_string()));
        }
        if self.probe_concurrency == 0 {
            return Err(invalid("probe_concurrency", "must be at least 1".to_string()));
        }
        for pair in self.pairs() {
            let excluded = [pair.designated.number, pair.service.port.number]
                .iter()
                .filter(|port| (self.high_port_start..=self.high_port_end).contains(*port))
                .count();
            let span = usize::from(self.high_port_end - self.high_port_start) + 1;
            if span <= excluded {
                return Err(invalid(
                    "high_port_end",
                    format!("no usable high port left for {pair}"),
                ));
            }
        }
        Ok(())
    }
}

fn invalid(key: &'static str, message: String) -> ConfigError {
    ConfigError::Invalid { key, message }
}
