//! Phase 1: which hosts answer the designated source port but not a random one.

use async_trait::async_trait;
use gatescan_common::config::RunConfig;
use gatescan_common::hosts::{HostRole, HostSet, HostSetStore};
use gatescan_common::network::port::{PortSpec, TargetPortSpec};
use gatescan_common::network::range::IpCollection;
use tracing::{debug, info, warn};

use super::{Phase, PhaseReport, timed_scan};
use crate::convergence::{
    ConvergenceController, RoundFn, RoundOutcome, RoundRecord, RoundStats, Termination,
};
use crate::engine::{ScanEngine, ScanJob, ScanTargets};
use crate::error::RoundError;
use crate::sampler::HighPortSampler;

/// High-port round: anything that answers a random source port is not gated
/// on the designated one.
struct HighPortRound<'a> {
    engine: &'a dyn ScanEngine,
    sampler: &'a mut HighPortSampler,
    store: &'a mut HostSetStore,
    port: PortSpec,
    config: &'a RunConfig,
    tag: String,
}

#[async_trait]
impl RoundFn for HighPortRound<'_> {
    async fn run_round(&mut self, iteration: usize, frontier: &HostSet) -> Result<RoundOutcome, RoundError> {
        let source_port = self.sampler.draw()?;
        debug!(source_port, left = self.sampler.remaining(), "drew a high source port");
        let job = ScanJob {
            targets: ScanTargets::Hosts(frontier.clone()),
            port: self.port,
            source_port,
            rate: self.config.rate,
            timeout: self.config.round_timeout(),
            tag: format!("{}_hp{iteration}", self.tag),
        };
        timed_scan(self.engine, job, self.config.round_timeout()).await
    }

    fn commit(&mut self, _: usize, _: &RoundOutcome, resolved: &HostSet) {
        self.store.add(HostRole::Irrelevant, resolved.iter().copied());
    }
}

/// Sweeps `space` from the designated port to seed Initial, then prunes it
/// with high-port rounds until they go quiet. Leaves `Candidate` in the store.
pub async fn discover(
    engine: &dyn ScanEngine,
    pair: &TargetPortSpec,
    space: &IpCollection,
    config: &RunConfig,
    controller: &ConvergenceController,
    sampler: &mut HighPortSampler,
    store: &mut HostSetStore,
) -> PhaseReport {
    let phase = Phase::Discovery;
    let tag = format!("p1_{}", pair.label());
    let space_size = usize::try_from(space.len()).unwrap_or(usize::MAX);

    if controller.stop_signal().is_stopped() {
        return PhaseReport::new(phase, space_size, Vec::new(), Termination::Cancelled);
    }

    let seed_job = ScanJob {
        targets: ScanTargets::Space(space.clone()),
        port: pair.service.port,
        source_port: pair.designated.number,
        rate: config.rate,
        timeout: config.round_timeout(),
        tag: format!("{tag}_designated"),
    };
    info!(
        "sweeping {} on {} from designated source port {}",
        seed_job.targets.describe(),
        pair.service.port,
        pair.designated
    );

    let seeded = match timed_scan(engine, seed_job, config.round_timeout()).await {
        Ok(outcome) => outcome,
        Err(e) => {
            warn!("designated-port round failed: {e}");
            let termination = Termination::Aborted {
                reason: e.to_string(),
            };
            return PhaseReport::new(phase, space_size, Vec::new(), termination);
        }
    };

    store.add(HostRole::Initial, seeded.responders.iter().copied());
    let initial = store.get(HostRole::Initial);
    let stats = RoundStats::new(space.len(), initial.len() as u64);
    let seed_record = RoundRecord {
        iteration: 0,
        source_port: seeded.source_port,
        stats,
        rate: stats.response_rate(),
        timed_out: seeded.timed_out,
        frontier_after: initial.len() as u64,
    };
    info!(
        iteration = 0,
        probed = stats.probed,
        responded = stats.responded,
        "{} hosts answer from the designated port",
        initial.len()
    );

    let frontier = store.diff(HostRole::Initial, HostRole::Irrelevant);
    let mut round = HighPortRound {
        engine,
        sampler,
        store: &mut *store,
        port: pair.service.port,
        config,
        tag,
    };
    let convergence = controller.drive(frontier, &mut round).await;

    let mut rounds = Vec::with_capacity(convergence.rounds.len() + 1);
    rounds.push(seed_record);
    rounds.extend(convergence.rounds);

    let candidates = store.diff(HostRole::Initial, HostRole::Irrelevant);
    store.replace(HostRole::Candidate, candidates.clone());
    info!(
        "{} candidates ({} initial, {} irrelevant), {}",
        candidates.len(),
        store.size(HostRole::Initial),
        store.size(HostRole::Irrelevant),
        convergence.termination
    );

    let report = PhaseReport::new(phase, space_size, rounds, convergence.termination).with_output(candidates.len());
    if seeded.timed_out {
        warn!("designated-port sweep ran out of time, Initial is partial");
        report.cut_short()
    } else {
        report
    }
}
