//! Phase 3: re-probe responders from a random high port and retract the ones
//! that answer anyway.

use async_trait::async_trait;
use gatescan_common::config::RunConfig;
use gatescan_common::hosts::{HostRole, HostSet, HostSetStore};
use gatescan_common::network::port::{PortSpec, TargetPortSpec};
use gatescan_common::record::ResponseSet;
use tracing::{debug, info};

use super::{Phase, PhaseReport, timed_scan};
use crate::convergence::{ConvergenceController, RoundFn, RoundOutcome};
use crate::engine::{ScanEngine, ScanJob, ScanTargets};
use crate::error::RoundError;
use crate::sampler::HighPortSampler;

struct RetractionRound<'a> {
    engine: &'a dyn ScanEngine,
    sampler: &'a mut HighPortSampler,
    store: &'a mut HostSetStore,
    responses: &'a mut ResponseSet,
    port: PortSpec,
    config: &'a RunConfig,
    tag: String,
}

#[async_trait]
impl RoundFn for RetractionRound<'_> {
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
        let mut retracted = 0;
        for ip in resolved {
            retracted += self.responses.retract(ip).len();
        }
        self.store.remove(HostRole::Responded, resolved);
        self.store.add(HostRole::Irrelevant, resolved.iter().copied());
        if retracted > 0 {
            info!("retracted {retracted} records from {} hosts", resolved.len());
        }
    }
}

/// Prunes `responses` down to hosts that stay silent from high source ports
/// and stores the survivors as `Verified`.
pub async fn verify(
    engine: &dyn ScanEngine,
    pair: &TargetPortSpec,
    config: &RunConfig,
    controller: &ConvergenceController,
    sampler: &mut HighPortSampler,
    store: &mut HostSetStore,
    responses: &mut ResponseSet,
) -> PhaseReport {
    let frontier = responses.hosts();
    let input_size = frontier.len();

    let mut round = RetractionRound {
        engine,
        sampler,
        store: &mut *store,
        responses: &mut *responses,
        port: pair.service.port,
        config,
        tag: format!("p3_{}", pair.label()),
    };
    let convergence = controller.drive(frontier, &mut round).await;

    let verified = responses.hosts();
    store.replace(HostRole::Verified, verified.clone());
    info!(
        "{} of {} responders verified, {}",
        verified.len(),
        input_size,
        convergence.termination
    );
    PhaseReport::from_convergence(Phase::Verification, input_size, convergence).with_output(verified.len())
}
