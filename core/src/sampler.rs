//! Random high source ports for the irrelevance rounds.
//!
//! Draws are reproducible: the same seed, range and exclusions always give the
//! same sequence of ports.

use std::ops::RangeInclusive;

use gatescan_common::config::HighPortPolicy;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::Rng;

use crate::error::RoundError;

#[derive(Debug)]
pub struct HighPortSampler {
    rng: StdRng,
    range: RangeInclusive<u16>,
    policy: HighPortPolicy,
    /// Ports still drawable. Shrinks on every draw without replacement.
    pool: Vec<u16>,
}

impl HighPortSampler {
    pub fn new(
        seed: u64,
        range: RangeInclusive<u16>,
        excluded: &[u16],
        policy: HighPortPolicy,
    ) -> Self {
        let pool: Vec<u16> = range.clone().filter(|port| !excluded.contains(port)).collect();
        Self {
            rng: StdRng::seed_from_u64(seed),
            range,
            policy,
            pool,
        }
    }

    /// Ports that can still be drawn.
    pub fn remaining(&self) -> usize {
        self.pool.len()
    }

    /// Next source port, or `None` once the range is used up.
    pub fn next_port(&mut self) -> Option<u16> {
        if self.pool.is_empty() {
            return None;
        }
        let index = self.rng.random_range(0..self.pool.len());
        match self.policy {
            HighPortPolicy::UniformWithoutReplacement => Some(self.pool.swap_remove(index)),
            HighPortPolicy::UniformWithReplacement => Some(self.pool[index]),
        }
    }

    pub fn draw(&mut self) -> Result<u16, RoundError> {
        self.next_port().ok_or(RoundError::PortsExhausted {
            start: *self.range.start(),
            end: *self.range.end(),
        })
    }
}
