#![cfg(test)]
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use gatescan_common::config::{ConfigError, RunConfig};
use gatescan_common::hosts::{HostRole, HostSet};
use gatescan_common::network::port::{PortSpec, ServiceSpec};
use gatescan_common::network::target::Target;
use gatescan_core::convergence::Termination;
use gatescan_core::phase::Phase;
use gatescan_core::{EngineError, Pipeline, PipelineError, StopSignal};

use crate::mock::{Scripted, Step};

const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const C: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
const D: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);

fn set(ips: &[Ipv4Addr]) -> HostSet {
    ips.iter().copied().collect()
}

fn config() -> RunConfig {
    RunConfig {
        target: Target::from_str("10.0.0.0/24").unwrap(),
        designated_ports: vec![PortSpec::tcp(80)],
        services: vec![ServiceSpec::new("ssh", PortSpec::tcp(22))],
        ..RunConfig::default()
    }
}

#[tokio::test]
async fn missing_engine_fails_before_any_scan() {
    let scanner = Arc::new(Scripted::unavailable());
    let prober = Arc::new(Scripted::new(vec![]));
    let pipeline = Pipeline::new(config(), scanner.clone(), prober.clone(), StopSignal::new());

    let err = pipeline.run().await.unwrap_err();
    assert!(matches!(
        err,
        PipelineError::EngineUnavailable(EngineError::Unavailable { .. })
    ));
    assert_eq!(scanner.call_count(), 0);
    assert_eq!(prober.call_count(), 0);
}

#[tokio::test]
async fn invalid_threshold_is_rejected() {
    let scanner = Arc::new(Scripted::new(vec![Step::Answer(vec![A])]));
    let prober = Arc::new(Scripted::new(vec![]));
    let config = RunConfig {
        threshold: 0.0,
        ..config()
    };
    let pipeline = Pipeline::new(config, scanner.clone(), prober, StopSignal::new());

    match pipeline.run().await {
        Err(PipelineError::InvalidConfig(ConfigError::Invalid { key, .. })) => {
            assert_eq!(key, "threshold")
        }
        other => panic!("expected an invalid config, got {other:?}"),
    }
    assert_eq!(scanner.call_count(), 0);
}

#[tokio::test]
async fn stop_mid_phase_keeps_partial_output() {
    let stop = StopSignal::new();
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(vec![A, B, C, D]),
        Step::AnswerAndStop(vec![B], stop.clone()),
        Step::Answer(vec![D]),
    ]));
    let prober = Arc::new(Scripted::new(vec![]));
    let config = RunConfig {
        services: vec![
            ServiceSpec::new("ssh", PortSpec::tcp(22)),
            ServiceSpec::new("ftp", PortSpec::tcp(21)),
        ],
        ..config()
    };
    let pipeline = Pipeline::new(config, scanner.clone(), prober.clone(), stop);

    let report = pipeline.run().await.unwrap();

    assert!(report.cancelled);
    assert!(!report.complete());
    assert_eq!(report.pairs.len(), 1);
    let run = &report.pairs[0];
    assert_eq!(run.report.phases.len(), 1);
    assert_eq!(run.report.phases[0].termination, Termination::Cancelled);
    assert_eq!(run.store.get(HostRole::Candidate), set(&[A, C, D]));
    assert_eq!(scanner.call_count(), 2);
    assert_eq!(prober.call_count(), 0);
}

#[tokio::test]
async fn stop_before_start_runs_nothing() {
    let stop = StopSignal::new();
    stop.stop();
    let scanner = Arc::new(Scripted::new(vec![Step::Answer(vec![A])]));
    let prober = Arc::new(Scripted::new(vec![]));
    let pipeline = Pipeline::new(config(), scanner.clone(), prober, stop);

    let report = pipeline.run().await.unwrap();
    assert!(report.cancelled);
    assert!(report.pairs.is_empty());
    assert_eq!(scanner.call_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn stalled_round_counts_as_silent_and_incomplete() {
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(vec![A, B]),
        Step::Stall(Duration::from_secs(60)),
    ]));
    let prober = Arc::new(Scripted::new(vec![]));
    let config = RunConfig {
        round_timeout_secs: 1,
        ..config()
    };
    let pipeline = Pipeline::new(config, scanner, prober, StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];
    let phase1 = run.report.phase(Phase::Discovery).unwrap();

    assert_eq!(phase1.termination, Termination::Converged);
    assert!(phase1.rounds[1].timed_out);
    assert_eq!(phase1.rounds[1].stats.responded, 0);
    assert_eq!(run.store.get(HostRole::Candidate), set(&[A, B]));
    // a quiet round that only went quiet because it ran out of time
    assert!(phase1.incomplete);
    assert!(!phase1.halts_pipeline());
    assert_eq!(run.report.phases.len(), 3);
    assert!(!run.report.complete);
    assert!(!report.complete());
}

#[tokio::test]
async fn failed_probe_round_skips_verification() {
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(vec![A, B, C]),
        Step::Answer(vec![]),
    ]));
    let prober = Arc::new(Scripted::new(vec![Step::Fail("connection reset")]));
    let pipeline = Pipeline::new(config(), scanner.clone(), prober, StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];

    assert!(!report.cancelled);
    assert!(!run.report.complete);
    assert_eq!(run.report.phases.len(), 2);
    let phase2 = run.report.phase(Phase::Probing).unwrap();
    assert!(matches!(phase2.termination, Termination::Aborted { .. }));
    assert!(phase2.incomplete);
    assert_eq!(run.store.get(HostRole::Candidate), set(&[A, B, C]));
    assert!(run.verified.is_empty());
    // seed sweep and one high-port round, nothing from verification
    assert_eq!(scanner.call_count(), 2);
}

#[tokio::test]
async fn running_out_of_high_ports_aborts_discovery() {
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(vec![A, B, C, D]),
        Step::Answer(vec![A]),
        Step::Answer(vec![B]),
    ]));
    let prober = Arc::new(Scripted::new(vec![]));
    let config = RunConfig {
        high_port_start: 30_000,
        high_port_end: 30_001,
        ..config()
    };
    let pipeline = Pipeline::new(config, scanner.clone(), prober.clone(), StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];
    let phase1 = run.report.phase(Phase::Discovery).unwrap();

    match &phase1.termination {
        Termination::Aborted { reason } => assert!(reason.contains("30000..=30001"), "{reason}"),
        other => panic!("expected an aborted phase, got {other}"),
    }
    assert_eq!(run.store.get(HostRole::Candidate), set(&[C, D]));
    assert_eq!(run.report.phases.len(), 1);
    assert_eq!(prober.call_count(), 0);

    let ports: Vec<Option<u16>> = scanner.calls.lock().unwrap().iter().map(|(_, p)| *p).collect();
    assert_eq!(ports[0], Some(80));
    let mut high: Vec<u16> = ports[1..].iter().flatten().copied().collect();
    high.sort_unstable();
    assert_eq!(high, vec![30_000, 30_001]);
}
