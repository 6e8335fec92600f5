//! The iterate-until-quiet loop shared by all three phases.
//!
//! A phase supplies a [`RoundFn`]; the controller owns the active frontier,
//! hands it to each round, removes whatever answered and decides when to stop.
//! The frontier only ever shrinks: the round never sees it mutably, and the
//! controller applies a round's responders (clamped to the frontier) before
//! the next round can start.

use std::fmt;

use async_trait::async_trait;
use gatescan_common::hosts::HostSet;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::RoundError;
use crate::signal::StopSignal;

/// Probed versus responded for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub struct RoundStats {
    pub probed: u64,
    pub responded: u64,
}

impl RoundStats {
    pub fn new(probed: u64, responded: u64) -> Self {
        Self { probed, responded }
    }

    /// Always in `[0, 1]`; nothing probed is a rate of zero.
    pub fn response_rate(&self) -> f64 {
        if self.probed == 0 {
            return 0.0;
        }
        (self.responded.min(self.probed)) as f64 / self.probed as f64
    }
}

/// What a round function reports back.
#[derive(Debug, Clone, Default)]
pub struct RoundOutcome {
    pub responders: HostSet,
    /// Source port the round used, if it drew one.
    pub source_port: Option<u16>,
    /// The engine ran out of time; `responders` holds whatever arrived before.
    pub timed_out: bool,
}

#[async_trait]
pub trait RoundFn: Send {
    /// Probes `frontier` once. Must not have side effects on phase state:
    /// those belong in [`RoundFn::commit`].
    async fn run_round(&mut self, iteration: usize, frontier: &HostSet) -> Result<RoundOutcome, RoundError>;

    /// Applies the hosts resolved by a finished round. `resolved` is always a
    /// subset of the frontier the round was given.
    fn commit(&mut self, iteration: usize, outcome: &RoundOutcome, resolved: &HostSet);
}

/// One line of a phase's statistics log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoundRecord {
    pub iteration: usize,
    pub source_port: Option<u16>,
    #[serde(flatten)]
    pub stats: RoundStats,
    pub rate: f64,
    pub timed_out: bool,
    /// Frontier size once this round's responders were removed.
    pub frontier_after: u64,
}

impl RoundRecord {
    /// The round ran out of time with hosts still unresolved. When it is the
    /// last round, the phase did not converge on its own.
    pub fn cut_short(&self) -> bool {
        self.timed_out && self.frontier_after > 0
    }
}

/// Why a phase stopped iterating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum Termination {
    /// A round's response rate fell below the threshold.
    Converged,
    /// Every host in the frontier was resolved.
    Exhausted,
    /// The phase had nothing to work on.
    EmptyInput,
    /// The iteration cap was hit while rounds were still productive.
    IterationCap,
    /// Stopped between rounds on request.
    Cancelled,
    /// A round failed; what was applied before it stands.
    Aborted { reason: String },
}

impl Termination {
    /// The phase output is usable but not a converged result.
    pub fn incomplete(&self) -> bool {
        matches!(
            self,
            Termination::IterationCap | Termination::Cancelled | Termination::Aborted { .. }
        )
    }

    /// Later phases must not run on this output.
    pub fn halts_pipeline(&self) -> bool {
        matches!(self, Termination::Cancelled | Termination::Aborted { .. })
    }
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Termination::Converged => write!(f, "converged"),
            Termination::Exhausted => write!(f, "frontier exhausted"),
            Termination::EmptyInput => write!(f, "empty input"),
            Termination::IterationCap => write!(f, "iteration cap reached"),
            Termination::Cancelled => write!(f, "cancelled"),
            Termination::Aborted { reason } => write!(f, "aborted: {reason}"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Convergence {
    pub rounds: Vec<RoundRecord>,
    pub termination: Termination,
    /// Hosts never resolved by any round.
    pub frontier: HostSet,
}

#[derive(Debug, Clone)]
pub struct ConvergenceController {
    threshold: f64,
    max_iterations: usize,
    stop: StopSignal,
}

impl ConvergenceController {
    pub fn new(threshold: f64, max_iterations: usize, stop: StopSignal) -> Self {
        Self {
            threshold,
            max_iterations,
            stop,
        }
    }

    pub fn stop_signal(&self) -> &StopSignal {
        &self.stop
    }

    pub async fn drive<R>(&self, mut frontier: HostSet, round: &mut R) -> Convergence
    where
        R: RoundFn + ?Sized,
    {
        let mut rounds: Vec<RoundRecord> = Vec::new();

        let termination = loop {
            if frontier.is_empty() {
                break if rounds.is_empty() {
                    Termination::EmptyInput
                } else {
                    Termination::Exhausted
                };
            }
            if self.stop.is_stopped() {
                break Termination::Cancelled;
            }
            if rounds.len() >= self.max_iterations {
                break Termination::IterationCap;
            }

            let iteration = rounds.len() + 1;
            let outcome = match round.run_round(iteration, &frontier).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    warn!(iteration, "round failed: {e}");
                    break Termination::Aborted {
                        reason: e.to_string(),
                    };
                }
            };

            let resolved = outcome.responders.intersection(&frontier);
            let stats = RoundStats::new(frontier.len() as u64, resolved.len() as u64);
            frontier.subtract(&resolved);
            round.commit(iteration, &outcome, &resolved);

            let rate = stats.response_rate();
            info!(
                iteration,
                probed = stats.probed,
                responded = stats.responded,
                rate,
                source_port = outcome.source_port,
                "round {iteration}: {}/{} responded ({:.2}%)",
                stats.responded,
                stats.probed,
                rate * 100.0
            );
            rounds.push(RoundRecord {
                iteration,
                source_port: outcome.source_port,
                stats,
                rate,
                timed_out: outcome.timed_out,
                frontier_after: frontier.len() as u64,
            });

            if rate < self.threshold {
                break Termination::Converged;
            }
        };

        Convergence {
            rounds,
            termination,
            frontier,
        }
    }
}
