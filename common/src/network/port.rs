//! Port, service and designated/target pair models.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Protocol {
    Tcp,
    Udp,
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Protocol::Tcp => write!(f, "tcp"),
            Protocol::Udp => write!(f, "udp"),
        }
    }
}

impl FromStr for Protocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "tcp" => Ok(Protocol::Tcp),
            "udp" => Ok(Protocol::Udp),
            other => Err(format!("unknown protocol '{other}'")),
        }
    }
}

/// A transport endpoint written as `tcp/80` or `udp/53`. A bare number means TCP.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PortSpec {
    pub protocol: Protocol,
    pub number: u16,
}

impl PortSpec {
    pub const fn tcp(number: u16) -> Self {
        Self {
            protocol: Protocol::Tcp,
            number,
        }
    }

    pub const fn udp(number: u16) -> Self {
        Self {
            protocol: Protocol::Udp,
            number,
        }
    }
}

impl fmt::Display for PortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.protocol, self.number)
    }
}

impl FromStr for PortSpec {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let (protocol, number) = match s.split_once('/') {
            Some((proto, number)) => (proto.parse::<Protocol>()?, number),
            None => (Protocol::Tcp, s),
        };
        let number = number
            .parse::<u16>()
            .map_err(|e| format!("invalid port '{number}': {e}"))?;
        if number == 0 {
            return Err("port 0 is not a valid port".to_string());
        }
        Ok(Self { protocol, number })
    }
}

impl Serialize for PortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for PortSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PortSpec::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// A named internal service under test, written as `ssh:tcp/22`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceSpec {
    pub name: String,
    pub port: PortSpec,
}

impl ServiceSpec {
    pub fn new(name: impl Into<String>, port: PortSpec) -> Self {
        Self {
            name: name.into(),
            port,
        }
    }
}

impl fmt::Display for ServiceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.name, self.port)
    }
}

impl FromStr for ServiceSpec {
    type Err = String;

    /// Accepts `name:proto/port`, `proto/port` or a bare port. Without a name,
    /// well-known ports get their usual service name.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        match s.split_once(':') {
            Some((name, port)) if !name.is_empty() => {
                Ok(Self::new(name.to_ascii_lowercase(), port.parse::<PortSpec>()?))
            }
            Some(_) => Err(format!("service name missing in '{s}'")),
            None => {
                let port = s.parse::<PortSpec>()?;
                Ok(Self::new(well_known_name(port), port))
            }
        }
    }
}

impl Serialize for ServiceSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for ServiceSpec {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        ServiceSpec::from_str(&raw).map_err(serde::de::Error::custom)
    }
}

pub fn well_known_name(port: PortSpec) -> String {
    let name = match (port.protocol, port.number) {
        (Protocol::Tcp, 21) => "ftp",
        (Protocol::Tcp, 22) => "ssh",
        (Protocol::Tcp, 23) => "telnet",
        (Protocol::Tcp, 25) => "smtp",
        (Protocol::Tcp, 80) | (Protocol::Tcp, 8080) => "http",
        (Protocol::Tcp, 3306) => "mysql",
        (Protocol::Tcp, 3389) => "rdp",
        (Protocol::Tcp, 5432) => "postgres",
        (Protocol::Tcp, 6379) => "redis",
        (_, 53) => "dns",
        (Protocol::Udp, 123) => "ntp",
        (Protocol::Udp, 161) => "snmp",
        _ => return format!("{}{}", port.protocol, port.number),
    };
    name.to_string()
}

/// One designated source port paired with one service under test. Fixed for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TargetPortSpec {
    pub designated: PortSpec,
    pub service: ServiceSpec,
}

impl TargetPortSpec {
    pub fn new(designated: PortSpec, service: ServiceSpec) -> Self {
        Self {
            designated,
            service,
        }
    }

    /// Filesystem friendly label, e.g. `ssh22_from_tcp80`.
    pub fn label(&self) -> String {
        format!(
            "{}{}_from_{}{}",
            self.service.name, self.service.port.number, self.designated.protocol, self.designated.number
        )
    }
}

impl fmt::Display for TargetPortSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} from source {}", self.service, self.designated)
    }
}
