//! # Host Set Store
//!
//! Role-tagged collections of host identities (IPv4 addresses).
//!
//! A single identity may carry several roles at once: a host that answered the
//! designated-port sweep and later a high-port probe is both `Initial` and
//! `Irrelevant`. Within one role an identity appears at most once.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::net::Ipv4Addr;

use serde::Serialize;

/// The role a host identity plays in a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HostRole {
    Initial,
    Irrelevant,
    Candidate,
    Responded,
    Verified,
}

impl HostRole {
    pub const ALL: [HostRole; 5] = [
        HostRole::Initial,
        HostRole::Irrelevant,
        HostRole::Candidate,
        HostRole::Responded,
        HostRole::Verified,
    ];
}

impl fmt::Display for HostRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HostRole::Initial => "initial",
            HostRole::Irrelevant => "irrelevant",
            HostRole::Candidate => "candidate",
            HostRole::Responded => "responded",
            HostRole::Verified => "verified",
        };
        write!(f, "{name}")
    }
}

/// A duplicate-free set of host identities.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostSet {
    hosts: HashSet<Ipv4Addr>,
}

impl HostSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.hosts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hosts.is_empty()
    }

    pub fn contains(&self, ip: &Ipv4Addr) -> bool {
        self.hosts.contains(ip)
    }

    /// Returns `true` when the identity was not already present.
    pub fn insert(&mut self, ip: Ipv4Addr) -> bool {
        self.hosts.insert(ip)
    }

    pub fn remove(&mut self, ip: &Ipv4Addr) -> bool {
        self.hosts.remove(ip)
    }

    /// Adds every identity in `other`, returning how many were new.
    pub fn extend_from(&mut self, other: &HostSet) -> usize {
        other.iter().filter(|ip| self.hosts.insert(**ip)).count()
    }

    /// Removes every identity in `other`, returning how many were present.
    pub fn subtract(&mut self, other: &HostSet) -> usize {
        other.iter().filter(|ip| self.hosts.remove(ip)).count()
    }

    pub fn difference(&self, other: &HostSet) -> HostSet {
        self.hosts
            .iter()
            .filter(|ip| !other.contains(ip))
            .copied()
            .collect()
    }

    pub fn intersection(&self, other: &HostSet) -> HostSet {
        self.hosts
            .iter()
            .filter(|ip| other.contains(ip))
            .copied()
            .collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ipv4Addr> {
        self.hosts.iter()
    }

    /// Identities in ascending address order, for stable output.
    pub fn sorted(&self) -> Vec<Ipv4Addr> {
        let mut hosts: Vec<Ipv4Addr> = self.hosts.iter().copied().collect();
        hosts.sort_unstable();
        hosts
    }
}

impl FromIterator<Ipv4Addr> for HostSet {
    fn from_iter<T: IntoIterator<Item = Ipv4Addr>>(iter: T) -> Self {
        Self {
            hosts: iter.into_iter().collect(),
        }
    }
}

impl Extend<Ipv4Addr> for HostSet {
    fn extend<T: IntoIterator<Item = Ipv4Addr>>(&mut self, iter: T) {
        self.hosts.extend(iter);
    }
}

impl IntoIterator for HostSet {
    type Item = Ipv4Addr;
    type IntoIter = std::collections::hash_set::IntoIter<Ipv4Addr>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.into_iter()
    }
}

impl<'a> IntoIterator for &'a HostSet {
    type Item = &'a Ipv4Addr;
    type IntoIter = std::collections::hash_set::Iter<'a, Ipv4Addr>;

    fn into_iter(self) -> Self::IntoIter {
        self.hosts.iter()
    }
}

/// Every role set of one pipeline run.
#[derive(Debug, Clone, Default)]
pub struct HostSetStore {
    sets: HashMap<HostRole, HostSet>,
}

impl HostSetStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn size(&self, role: HostRole) -> usize {
        self.sets.get(&role).map_or(0, HostSet::len)
    }

    /// Idempotent: identities already tagged with `role` are left alone.
    /// Returns how many identities were newly tagged.
    pub fn add<I>(&mut self, role: HostRole, ids: I) -> usize
    where
        I: IntoIterator<Item = Ipv4Addr>,
    {
        let set = self.sets.entry(role).or_default();
        ids.into_iter().filter(|ip| set.insert(*ip)).count()
    }

    /// Returns how many identities lost the tag.
    pub fn remove<'a, I>(&mut self, role: HostRole, ids: I) -> usize
    where
        I: IntoIterator<Item = &'a Ipv4Addr>,
    {
        match self.sets.get_mut(&role) {
            Some(set) => ids.into_iter().filter(|ip| set.remove(ip)).count(),
            None => 0,
        }
    }

    /// Identities tagged `a` but not `b`.
    pub fn diff(&self, a: HostRole, b: HostRole) -> HostSet {
        match (self.sets.get(&a), self.sets.get(&b)) {
            (Some(left), Some(right)) => left.difference(right),
            (Some(left), None) => left.clone(),
            (None, _) => HostSet::new(),
        }
    }

    pub fn contains(&self, role: HostRole, ip: &Ipv4Addr) -> bool {
        self.sets.get(&role).is_some_and(|set| set.contains(ip))
    }

    pub fn get(&self, role: HostRole) -> HostSet {
        self.sets.get(&role).cloned().unwrap_or_default()
    }

    /// Replaces the whole role set.
    pub fn replace(&mut self, role: HostRole, set: HostSet) {
        self.sets.insert(role, set);
    }

    /// Every role currently attached to `ip`, in declaration order.
    pub fn roles_of(&self, ip: &Ipv4Addr) -> Vec<HostRole> {
        HostRole::ALL
            .into_iter()
            .filter(|role| self.contains(*role, ip))
            .collect()
    }

    /// Every identity that carries at least one role.
    pub fn identities(&self) -> HostSet {
        let mut all = HostSet::new();
        for set in self.sets.values() {
            all.extend_from(set);
        }
        all
    }
}
