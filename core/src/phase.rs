//! The three phases of a differential scan.
//!
//! Each phase maps its input set and the run configuration to an output set
//! and a statistics log ([`PhaseReport`]). Phase state lives in the
//! [`gatescan_common::hosts::HostSetStore`] (and, from Phase 2 on, the
//! [`gatescan_common::record::ResponseSet`]) handed down by the pipeline.

use std::fmt;
use std::time::Duration;

use gatescan_common::hosts::HostSet;
use serde::Serialize;
use tokio::time::timeout;
use tracing::warn;

use crate::convergence::{Convergence, RoundOutcome, RoundRecord, Termination};
use crate::engine::{ScanEngine, ScanJob};
use crate::error::RoundError;

pub mod discovery;
pub mod probing;
pub mod verification;

/// How long a scan engine may overrun its job budget before the round is
/// given up on. Process engines stop themselves at the budget.
const SCAN_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Discovery,
    Probing,
    Verification,
}

impl Phase {
    pub fn number(&self) -> u8 {
        match self {
            Phase::Discovery => 1,
            Phase::Probing => 2,
            Phase::Verification => 3,
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Discovery => "affected host discovery",
            Phase::Probing => "service probing",
            Phase::Verification => "false-positive verification",
        };
        write!(f, "phase {}: {name}", self.number())
    }
}

/// Per-phase statistics: set sizes, rounds and how the loop ended.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PhaseReport {
    pub phase: Phase,
    pub input_size: u64,
    pub output_size: u64,
    pub rounds: Vec<RoundRecord>,
    pub termination: Termination,
    pub incomplete: bool,
}

impl PhaseReport {
    pub fn new(phase: Phase, input_size: usize, rounds: Vec<RoundRecord>, termination: Termination) -> Self {
        Self {
            phase,
            input_size: input_size as u64,
            output_size: 0,
            incomplete: termination.incomplete() || rounds.last().is_some_and(RoundRecord::cut_short),
            rounds,
            termination,
        }
    }

    pub(crate) fn from_convergence(phase: Phase, input_size: usize, convergence: Convergence) -> Self {
        Self::new(phase, input_size, convergence.rounds, convergence.termination)
    }

    /// Marks the phase as truncated by a round that ran out of time.
    pub(crate) fn cut_short(mut self) -> Self {
        self.incomplete = true;
        self
    }

    pub fn with_output(mut self, output_size: usize) -> Self {
        self.output_size = output_size as u64;
        self
    }

    pub fn iterations(&self) -> usize {
        self.rounds.len()
    }

    pub fn halts_pipeline(&self) -> bool {
        self.termination.halts_pipeline()
    }
}

/// Runs one scan job under the round budget. Running out of time is not an
/// error: the round counts whatever was found before the deadline.
pub(crate) async fn timed_scan(
    engine: &dyn ScanEngine,
    job: ScanJob,
    budget: Duration,
) -> Result<RoundOutcome, RoundError> {
    let source_port = Some(job.source_port);

    match timeout(budget + SCAN_GRACE, engine.scan(job)).await {
        Ok(Ok(output)) => {
            if output.truncated {
                warn!(
                    "{} ran out of its {budget:?} budget, keeping {} responders",
                    engine.name(),
                    output.responders.len()
                );
            }
            Ok(RoundOutcome {
                responders: output.responders,
                source_port,
                timed_out: output.truncated,
            })
        }
        Ok(Err(e)) if e.is_timeout() => {
            warn!("{} round timed out: {e}", engine.name());
            Ok(RoundOutcome {
                responders: HostSet::new(),
                source_port,
                timed_out: true,
            })
        }
        Ok(Err(e)) => Err(e.into()),
        Err(_) => {
            warn!(
                "{} did not return within {:?}, counting no responders",
                engine.name(),
                budget + SCAN_GRACE
            );
            Ok(RoundOutcome {
                responders: HostSet::new(),
                source_port,
                timed_out: true,
            })
        }
    }
}
