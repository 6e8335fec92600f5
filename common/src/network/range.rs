use std::fmt;
use std::net::Ipv4Addr;

use pnet::ipnetwork::Ipv4Network;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Ipv4Range {
    pub start_addr: Ipv4Addr,
    pub end_addr: Ipv4Addr,
}

impl Ipv4Range {
    pub fn new(start_addr: Ipv4Addr, end_addr: Ipv4Addr) -> Self {
        Self {
            start_addr,
            end_addr,
        }
    }

    /// The whole IPv4 address space, `0.0.0.0-255.255.255.255`.
    pub fn everything() -> Self {
        Self::new(Ipv4Addr::UNSPECIFIED, Ipv4Addr::BROADCAST)
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        let addr: u32 = (*addr).into();
        u32::from(self.start_addr) <= addr && addr <= u32::from(self.end_addr)
    }

    /// Number of addresses covered, `0` for an inverted range.
    pub fn len(&self) -> u64 {
        let start: u32 = self.start_addr.into();
        let end: u32 = self.end_addr.into();
        if end < start {
            return 0;
        }
        u64::from(end - start) + 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Splits the range into the minimal list of CIDR blocks covering it exactly.
    ///
    /// zmap only understands CIDR notation, masscan takes `start-end` directly.
    pub fn to_cidrs(&self) -> Vec<Ipv4Network> {
        let mut blocks: Vec<Ipv4Network> = Vec::new();
        if self.is_empty() {
            return blocks;
        }

        let mut cursor: u64 = u64::from(u32::from(self.start_addr));
        let end: u64 = u64::from(u32::from(self.end_addr));

        while cursor <= end {
            let align: u32 = if cursor == 0 { 32 } else { cursor.trailing_zeros().min(32) };
            let mut size_bits: u32 = align;
            while size_bits > 0 && cursor + (1u64 << size_bits) - 1 > end {
                size_bits -= 1;
            }
            let prefix: u8 = (32 - size_bits) as u8;
            if let Ok(net) = Ipv4Network::new(Ipv4Addr::from(cursor as u32), prefix) {
                blocks.push(net);
            }
            cursor += 1u64 << size_bits;
        }

        blocks
    }
}

impl fmt::Display for Ipv4Range {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start_addr, self.end_addr)
    }
}

pub fn cidr_range(ip: Ipv4Addr, prefix: u8) -> anyhow::Result<Ipv4Range> {
    let network = Ipv4Network::new(ip, prefix)?;
    let start = network.network();
    let end = network.broadcast();

    Ok(Ipv4Range::new(start, end))
}

/// A mixed bag of single addresses and ranges, kept apart so the full
/// address space never has to be expanded in memory.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IpCollection {
    pub singles: Vec<Ipv4Addr>,
    pub ranges: Vec<Ipv4Range>,
}

impl IpCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_single(&mut self, addr: Ipv4Addr) {
        if !self.singles.contains(&addr) {
            self.singles.push(addr);
        }
    }

    pub fn add_range(&mut self, range: Ipv4Range) {
        self.ranges.push(range);
    }

    pub fn len(&self) -> u64 {
        self.singles.len() as u64 + self.ranges.iter().map(Ipv4Range::len).sum::<u64>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, addr: &Ipv4Addr) -> bool {
        self.singles.contains(addr) || self.ranges.iter().any(|r| r.contains(addr))
    }

    /// Every block as CIDR text, singles rendered as `/32`.
    pub fn to_cidr_strings(&self) -> Vec<String> {
        let singles = self.singles.iter().map(|ip| format!("{ip}/32"));
        let ranges = self
            .ranges
            .iter()
            .flat_map(Ipv4Range::to_cidrs)
            .map(|net| net.to_string());
        singles.chain(ranges).collect()
    }

    /// Every block as masscan-style text: bare addresses and `start-end` ranges.
    pub fn to_range_strings(&self) -> Vec<String> {
        let singles = self.singles.iter().map(Ipv4Addr::to_string);
        let ranges = self.ranges.iter().map(Ipv4Range::to_string);
        singles.chain(ranges).collect()
    }
}
