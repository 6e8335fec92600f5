//! # Target Space Model
//!
//! Defines the address space the designated-port round sweeps.
//!
//! A target space can be:
//! * The whole IPv4 internet (`internet`, `all` or `0.0.0.0/0`).
//! * A single IPv4 address.
//! * An IPv4 range (e.g. `192.168.1.1-100`).
//! * A CIDR block (e.g. `192.168.1.0/24`).
//! * A comma separated mix of the above.

use std::fmt;
use std::net::Ipv4Addr;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::network::range::{self, IpCollection, Ipv4Range};

/// Represents a distinct portion of the address space to sweep.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Target {
    /// The entire IPv4 address space.
    Internet,
    /// A single specific host.
    Host { target_addr: Ipv4Addr },
    /// A range of IPv4 addresses.
    Range { ipv4_range: Ipv4Range },
    /// Holds a list of different targets
    Multi { targets: Vec<Target> },
}

impl Default for Target {
    fn default() -> Self {
        Target::Internet
    }
}

impl FromStr for Target {
    type Err = String;

    /// Parses a string into a `Target`.
    ///
    /// Supported formats:
    /// * **Keywords**: "internet", "all" (case-insensitive).
    /// * **Host**: Single IPv4 address (e.g., "192.168.1.5").
    /// * **Range**: "Start-End" (e.g., "192.168.1.1-50", "192.168.1.1-192.168.1.50").
    /// * **CIDR**: "Network/Prefix" (e.g., "192.168.1.0/24").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let lower = s.to_ascii_lowercase();

        if let Some(target) = parse_keyword(&lower) {
            return Ok(target);
        }

        if s.contains(',') {
            return parse_commas(s);
        }

        if let Some(target) = parse_host(s) {
            return Ok(target);
        }

        if let Some(target) = parse_ip_range(s)? {
            return Ok(target);
        }

        if let Some(target) = parse_cidr_range(s)? {
            return Ok(target);
        }

        Err(format!("invalid target: {s}"))
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::Internet => write!(f, "internet"),
            Target::Host { target_addr } => write!(f, "{target_addr}"),
            Target::Range { ipv4_range } => write!(f, "{ipv4_range}"),
            Target::Multi { targets } => {
                let parts: Vec<String> = targets.iter().map(Target::to_string).collect();
                write!(f, "{}", parts.join(","))
            }
        }
    }
}

impl Serialize for Target {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Target {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Target::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

impl Target {
    pub fn is_internet(&self) -> bool {
        match self {
            Target::Internet => true,
            Target::Multi { targets } => targets.iter().any(Target::is_internet),
            _ => false,
        }
    }
}

fn resolve_target(target: &Target, collection: &mut IpCollection) {
    match target {
        Target::Internet => collection.add_range(Ipv4Range::everything()),
        Target::Host { target_addr } => collection.add_single(*target_addr),
        Target::Range { ipv4_range } => collection.add_range(*ipv4_range),
        Target::Multi { targets } => {
            for target in targets {
                resolve_target(target, collection);
            }
        }
    }
}

/// Converts a target into an IP collection without expanding ranges.
pub fn to_collection(target: &Target) -> IpCollection {
    let mut collection = IpCollection::new();
    resolve_target(target, &mut collection);
    collection
}

/// Parses a comma-separated list of targets (e.g., "192.168.1.5, 10.0.0.1-50").
pub fn parse_commas(s: &str) -> Result<Target, String> {
    let mut targets = Vec::new();

    for part in s.split(',') {
        let part = part.trim();
        if part.is_empty() {
            continue;
        }

        let target = Target::from_str(part)
            .map_err(|e| format!("Failed to parse target '{part}': {e}"))?;

        targets.push(target);
    }

    if targets.is_empty() {
        return Err(format!("no targets in '{s}'"));
    }

    Ok(Target::Multi { targets })
}

fn parse_keyword(s_lower: &str) -> Option<Target> {
    match s_lower {
        "internet" | "all" | "0.0.0.0/0" => Some(Target::Internet),
        _ => None,
    }
}

fn parse_host(s: &str) -> Option<Target> {
    s.parse::<Ipv4Addr>()
        .ok()
        .map(|target_addr| Target::Host { target_addr })
}

/// Parses a range string like "1.1.1.1-2.2.2.2" or "1.1.1.1-50".
fn parse_ip_range(s: &str) -> Result<Option<Target>, String> {
    let Some((start_str, end_str)) = s.split_once('-') else {
        return Ok(None);
    };

    let start_addr = start_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid start IP in range '{start_str}': {e}"))?;

    let end_addr = parse_range_end_addr(end_str, &start_addr, s)?;
    if u32::from(end_addr) < u32::from(start_addr) {
        return Err(format!("Range end precedes start: {s}"));
    }

    let ipv4_range = Ipv4Range::new(start_addr, end_addr);
    Ok(Some(Target::Range { ipv4_range }))
}

/// Handles abbreviated forms like "192.168.1.1-50" (implies 192.168.1.50)
/// and full forms like "192.168.1.1-192.168.1.255".
fn parse_range_end_addr(
    end_str: &str,
    start_addr: &Ipv4Addr,
    original_s: &str,
) -> Result<Ipv4Addr, String> {
    if let Ok(full_addr) = end_str.parse::<Ipv4Addr>() {
        return Ok(full_addr);
    }

    let mut end_octets = start_addr.octets();
    let partial_octets: Vec<u8> = end_str
        .split('.')
        .map(|octet_str| octet_str.parse::<u8>())
        .collect::<Result<Vec<u8>, _>>()
        .map_err(|e| format!("Invalid end range '{end_str}': {e}"))?;

    if partial_octets.is_empty() {
        return Err(format!("End range cannot be empty: {original_s}"));
    }
    if partial_octets.len() > 4 {
        return Err(format!("End range has too many octets: {end_str}"));
    }

    let start_index = 4 - partial_octets.len();
    end_octets[start_index..].copy_from_slice(&partial_octets);

    Ok(Ipv4Addr::from(end_octets))
}

/// Parses CIDR notation like "192.168.1.0/24".
fn parse_cidr_range(s: &str) -> Result<Option<Target>, String> {
    let Some((ip_str, prefix_str)) = s.split_once('/') else {
        return Ok(None);
    };

    let ipv4_addr = ip_str
        .parse::<Ipv4Addr>()
        .map_err(|e| format!("Invalid IP in CIDR '{ip_str}': {e}"))?;

    let prefix = prefix_str
        .parse::<u8>()
        .map_err(|e| format!("Invalid prefix in CIDR '{prefix_str}': {e}"))?;

    if prefix == 0 {
        return Ok(Some(Target::Internet));
    }

    let ipv4_range = range::cidr_range(ipv4_addr, prefix).map_err(|e| e.to_string())?;

    Ok(Some(Target::Range { ipv4_range }))
}
