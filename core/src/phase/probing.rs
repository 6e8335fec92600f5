//! Phase 2: talk to each candidate's service from the designated source port.
//!
//! A structured reply is evidence the host is affected. Replies are buffered
//! while the stream drains and only become records once the round is over.

use async_trait::async_trait;
use gatescan_common::config::RunConfig;
use gatescan_common::hosts::{HostRole, HostSet, HostSetStore};
use gatescan_common::network::port::TargetPortSpec;
use gatescan_common::record::{ProbeResponseRecord, ResponseSet};
use gatescan_protocols::ProtocolTemplate;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use super::{Phase, PhaseReport};
use crate::convergence::{ConvergenceController, RoundFn, RoundOutcome};
use crate::engine::{ProbeEngine, ProbeJob, ProbeReply};
use crate::error::{EngineError, RoundError};

struct ServiceRound<'a> {
    engine: &'a dyn ProbeEngine,
    pair: &'a TargetPortSpec,
    template: ProtocolTemplate,
    config: &'a RunConfig,
    store: &'a mut HostSetStore,
    responses: &'a mut ResponseSet,
    pending: Vec<ProbeReply>,
}

#[async_trait]
impl RoundFn for ServiceRound<'_> {
    async fn run_round(&mut self, _: usize, frontier: &HostSet) -> Result<RoundOutcome, RoundError> {
        let source_port = self.pair.designated.number;
        let job = ProbeJob {
            targets: frontier.clone(),
            port: self.pair.service.port,
            template: self.template.clone(),
            source_port: Some(source_port),
            timeout: self.config.probe_timeout(),
            concurrency: self.config.probe_concurrency,
        };

        let engine = self.engine;
        let mut replies: Vec<ProbeReply> = Vec::new();
        let drained = timeout(self.config.round_timeout(), async {
            let mut rx = engine.probe(job).await?;
            while let Some(reply) = rx.recv().await {
                replies.push(reply);
            }
            Ok::<_, EngineError>(())
        })
        .await;

        let timed_out = match drained {
            Ok(Ok(())) => false,
            Ok(Err(e)) if e.is_timeout() => {
                warn!("{} round timed out: {e}", engine.name());
                true
            }
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                warn!(
                    "{} round exceeded {:?}, keeping {} replies received so far",
                    engine.name(),
                    self.config.round_timeout(),
                    replies.len()
                );
                true
            }
        };

        let responders: HostSet = replies.iter().map(|reply| reply.ip).collect();
        self.pending = replies;
        Ok(RoundOutcome {
            responders,
            source_port: Some(source_port),
            timed_out,
        })
    }

    fn commit(&mut self, _: usize, _: &RoundOutcome, resolved: &HostSet) {
        for reply in self.pending.drain(..) {
            if !resolved.contains(&reply.ip) {
                debug!("dropping reply from {} outside the frontier", reply.ip);
                continue;
            }
            self.responses.record(ProbeResponseRecord::new(
                reply.ip,
                self.pair.service.port,
                self.pair.service.name.clone(),
                reply.payload,
            ));
        }
        self.store.add(HostRole::Responded, resolved.iter().copied());
    }
}

/// Probes `Candidate - Responded` until a round brings (almost) nothing new.
pub async fn probe_services(
    engine: &dyn ProbeEngine,
    pair: &TargetPortSpec,
    config: &RunConfig,
    controller: &ConvergenceController,
    store: &mut HostSetStore,
    responses: &mut ResponseSet,
) -> PhaseReport {
    let template = ProtocolTemplate::for_service(&pair.service);
    let frontier = store.diff(HostRole::Candidate, HostRole::Responded);
    let input_size = store.size(HostRole::Candidate);
    info!(
        "probing {} candidates with {} on {} from source port {}",
        frontier.len(),
        template.name(),
        pair.service.port,
        pair.designated.number
    );

    let mut round = ServiceRound {
        engine,
        pair,
        template,
        config,
        store: &mut *store,
        responses: &mut *responses,
        pending: Vec::new(),
    };
    let convergence = controller.drive(frontier, &mut round).await;

    info!(
        "{} hosts answered ({} records), {}",
        responses.host_count(),
        responses.record_count(),
        convergence.termination
    );
    PhaseReport::from_convergence(Phase::Probing, input_size, convergence).with_output(responses.host_count())
}
