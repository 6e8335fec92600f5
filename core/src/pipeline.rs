//! Runs the three phases for every designated port and service pair.
//!
//! Phase outputs are handed forward explicitly: nothing survives from one pair
//! to the next, and within a pair only the store, the response set and the
//! high-port sampler travel between phases.

use std::sync::Arc;

use gatescan_common::config::RunConfig;
use gatescan_common::hosts::{HostRole, HostSet, HostSetStore};
use gatescan_common::network::port::TargetPortSpec;
use gatescan_common::network::range::IpCollection;
use gatescan_common::network::target;
use gatescan_common::record::ResponseSet;
use gatescan_common::success;
use serde::Serialize;
use tracing::{Instrument, info, info_span, warn};

use crate::convergence::{ConvergenceController, Termination};
use crate::engine::{ProbeEngine, ScanEngine};
use crate::error::PipelineError;
use crate::phase::{self, Phase, PhaseReport};
use crate::sampler::HighPortSampler;
use crate::signal::StopSignal;

/// Statistics of one pair, as written to the run summary.
#[derive(Debug, Clone, Serialize)]
pub struct PairReport {
    pub label: String,
    pub pair: TargetPortSpec,
    pub phases: Vec<PhaseReport>,
    /// Every phase ran and none of them stopped early.
    pub complete: bool,
    pub candidates: u64,
    pub responded: u64,
    pub verified: u64,
}

impl PairReport {
    pub fn phase(&self, phase: Phase) -> Option<&PhaseReport> {
        self.phases.iter().find(|report| report.phase == phase)
    }
}

/// Everything one pair produced.
#[derive(Debug, Clone)]
pub struct PairRun {
    pub pair: TargetPortSpec,
    pub store: HostSetStore,
    /// Phase 2 output, frozen before verification retracts anything.
    pub responses: ResponseSet,
    /// Phase 3 output. Empty when verification did not run.
    pub verified: ResponseSet,
    pub report: PairReport,
}

#[derive(Debug, Clone, Default)]
pub struct RunReport {
    pub pairs: Vec<PairRun>,
    pub cancelled: bool,
}

impl RunReport {
    /// Union of every pair's Phase 1 candidates.
    pub fn all_candidates(&self) -> HostSet {
        let mut all = HostSet::new();
        for run in &self.pairs {
            all.extend_from(&run.store.get(HostRole::Candidate));
        }
        all
    }

    pub fn complete(&self) -> bool {
        !self.cancelled && self.pairs.iter().all(|run| run.report.complete)
    }
}

pub struct Pipeline {
    config: RunConfig,
    scanner: Arc<dyn ScanEngine>,
    prober: Arc<dyn ProbeEngine>,
    stop: StopSignal,
}

impl Pipeline {
    pub fn new(
        config: RunConfig,
        scanner: Arc<dyn ScanEngine>,
        prober: Arc<dyn ProbeEngine>,
        stop: StopSignal,
    ) -> Self {
        Self {
            config,
            scanner,
            prober,
            stop,
        }
    }

    /// Fails fast, before anything is scanned, on a bad configuration or an
    /// engine that cannot run.
    pub async fn preflight(&self) -> Result<(), PipelineError> {
        self.config.validate()?;
        self.scanner
            .ensure_available()
            .await
            .map_err(PipelineError::EngineUnavailable)?;
        self.prober
            .ensure_available()
            .await
            .map_err(PipelineError::EngineUnavailable)?;
        info!(
            "scan engine {}, probe engine {}",
            self.scanner.name(),
            self.prober.name()
        );
        Ok(())
    }

    pub async fn run(&self) -> Result<RunReport, PipelineError> {
        self.preflight().await?;

        let space = target::to_collection(&self.config.target);
        let mut report = RunReport::default();

        for pair in self.config.pairs() {
            if self.stop.is_stopped() {
                warn!("stopping before {pair}");
                report.cancelled = true;
                break;
            }
            let run = self.run_pair(&pair, &space).await;
            if run
                .report
                .phases
                .iter()
                .any(|phase| phase.termination == Termination::Cancelled)
            {
                report.cancelled = true;
            }
            report.pairs.push(run);
        }

        Ok(report)
    }

    /// Runs Phase 1 to 3 for one pair. A phase that was cancelled or aborted
    /// keeps its partial output and the later phases are skipped.
    pub async fn run_pair(&self, pair: &TargetPortSpec, space: &IpCollection) -> PairRun {
        let config = &self.config;
        let label = pair.label();
        let controller =
            ConvergenceController::new(config.threshold, config.max_iterations, self.stop.clone());
        let mut sampler = HighPortSampler::new(
            config.seed,
            config.high_port_start..=config.high_port_end,
            &[pair.designated.number, pair.service.port.number],
            config.high_port_policy,
        );
        let mut store = HostSetStore::new();
        let mut responses = ResponseSet::new();
        let mut phases: Vec<PhaseReport> = Vec::with_capacity(3);

        info!("testing {pair}");

        let discovery = phase::discovery::discover(
            self.scanner.as_ref(),
            pair,
            space,
            config,
            &controller,
            &mut sampler,
            &mut store,
        )
        .instrument(info_span!("phase", phase = 1, pair = %label))
        .await;
        let mut halted = discovery.halts_pipeline();
        phases.push(discovery);

        if !halted {
            let probing = phase::probing::probe_services(
                self.prober.as_ref(),
                pair,
                config,
                &controller,
                &mut store,
                &mut responses,
            )
            .instrument(info_span!("phase", phase = 2, pair = %label))
            .await;
            halted = probing.halts_pipeline();
            phases.push(probing);
        }

        let frozen = responses.clone();
        let verified = if !halted {
            let verification = phase::verification::verify(
                self.scanner.as_ref(),
                pair,
                config,
                &controller,
                &mut sampler,
                &mut store,
                &mut responses,
            )
            .instrument(info_span!("phase", phase = 3, pair = %label))
            .await;
            phases.push(verification);
            responses
        } else {
            warn!("{label}: later phases skipped, output is partial");
            ResponseSet::new()
        };

        let complete = phases.len() == 3 && phases.iter().all(|phase| !phase.incomplete);
        let report = PairReport {
            label: label.clone(),
            pair: pair.clone(),
            candidates: store.size(HostRole::Candidate) as u64,
            responded: frozen.host_count() as u64,
            verified: store.size(HostRole::Verified) as u64,
            phases,
            complete,
        };

        if report.verified > 0 {
            success!("{label}: {} verified affected hosts", report.verified);
        } else {
            info!("{label}: no verified affected hosts");
        }

        PairRun {
            pair: pair.clone(),
            store,
            responses: frozen,
            verified,
            report,
        }
    }
}
