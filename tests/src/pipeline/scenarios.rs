#![cfg(test)]
use std::net::Ipv4Addr;
use std::str::FromStr;
use std::sync::Arc;

use gatescan_common::config::RunConfig;
use gatescan_common::hosts::{HostRole, HostSet};
use gatescan_common::network::port::{PortSpec, ServiceSpec};
use gatescan_common::network::target::Target;
use gatescan_core::convergence::Termination;
use gatescan_core::phase::Phase;
use gatescan_core::{Pipeline, StopSignal};

use crate::mock::{HostBehavior, Scripted, SimulatedNetwork, Step};

const A: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 1);
const B: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 2);
const C: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 3);
const D: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 4);
const E: Ipv4Addr = Ipv4Addr::new(10, 0, 0, 5);

fn set(ips: &[Ipv4Addr]) -> HostSet {
    ips.iter().copied().collect()
}

fn ssh_from_http() -> RunConfig {
    RunConfig {
        designated_ports: vec![PortSpec::tcp(80)],
        services: vec![ServiceSpec::new("ssh", PortSpec::tcp(22))],
        target: Target::from_str("10.0.0.0/24").unwrap(),
        ..RunConfig::default()
    }
}

/// Initial={A,B,C,D}; high-port rounds {B,D} then {}; probing {A} then {};
/// A then answers from a high port and is retracted.
#[tokio::test]
async fn three_phase_walkthrough() {
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(vec![A, B, C, D]),
        Step::Answer(vec![B, D]),
        Step::Answer(vec![]),
        Step::Answer(vec![A]),
    ]));
    let prober = Arc::new(Scripted::new(vec![Step::Answer(vec![A]), Step::Answer(vec![])]));
    let pipeline = Pipeline::new(ssh_from_http(), scanner.clone(), prober.clone(), StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];

    assert_eq!(run.store.get(HostRole::Candidate), set(&[A, C]));
    assert_eq!(run.responses.hosts(), set(&[A]));
    assert!(run.verified.is_empty());
    assert_eq!(run.store.size(HostRole::Verified), 0);
    assert!(run.store.contains(HostRole::Irrelevant, &A));
    assert!(!run.store.contains(HostRole::Responded, &A));

    let phase1 = run.report.phase(Phase::Discovery).unwrap();
    assert_eq!(phase1.termination, Termination::Converged);
    assert_eq!(phase1.iterations(), 3);
    let phase2 = run.report.phase(Phase::Probing).unwrap();
    assert_eq!(phase2.iterations(), 2);
    assert_eq!(phase2.output_size, 1);
    let phase3 = run.report.phase(Phase::Verification).unwrap();
    assert_eq!(phase3.termination, Termination::Exhausted);
    assert!(run.report.complete);

    let probe_calls = prober.calls.lock().unwrap();
    assert!(probe_calls.iter().all(|(_, port)| *port == Some(80)));
    assert_eq!(probe_calls[1].0, set(&[C]));
}

#[tokio::test]
async fn candidates_do_not_depend_on_round_order() {
    let mut results = Vec::new();
    for order in [[B, D], [D, B]] {
        let scanner = Arc::new(Scripted::new(vec![
            Step::Answer(vec![A, B, C, D]),
            Step::Answer(vec![order[0]]),
            Step::Answer(vec![order[1]]),
        ]));
        let prober = Arc::new(Scripted::new(vec![]));
        let pipeline = Pipeline::new(ssh_from_http(), scanner, prober, StopSignal::new());
        let report = pipeline.run().await.unwrap();
        results.push(report.pairs[0].store.get(HostRole::Candidate));
    }
    assert_eq!(results[0], results[1]);
    assert_eq!(results[0], set(&[A, C]));
}

#[tokio::test]
async fn simulated_firewall_end_to_end() {
    let net = Arc::new(SimulatedNetwork::new(
        80,
        &[
            (A, HostBehavior::affected()),
            (B, HostBehavior::open_to_all()),
            (C, HostBehavior::lossy_open(1)),
            (D, HostBehavior::silent_gated()),
            (E, HostBehavior::lossy_open(2)),
            (Ipv4Addr::new(10, 0, 1, 9), HostBehavior::affected()),
        ],
    ));
    let pipeline = Pipeline::new(ssh_from_http(), net.clone(), net.clone(), StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];

    assert_eq!(run.store.get(HostRole::Initial), set(&[A, B, C, D, E]));
    assert_eq!(run.store.get(HostRole::Candidate), set(&[A, D]));
    assert_eq!(run.responses.hosts(), set(&[A]));
    assert_eq!(run.store.get(HostRole::Verified), set(&[A]));
    assert_eq!(run.verified.records_for(&A).len(), 1);
    assert!(run.report.complete);

    // the frontier never grows within a phase
    let phase1 = run.report.phase(Phase::Discovery).unwrap();
    assert_eq!(phase1.iterations(), 5);
    let sizes: Vec<u64> = phase1.rounds.iter().map(|r| r.frontier_after).collect();
    assert!(sizes.windows(2).all(|w| w[1] <= w[0]), "{sizes:?}");
    for report in &run.report.phases {
        for round in &report.rounds {
            assert!((0.0..=1.0).contains(&round.rate));
        }
    }

    let jobs = net.scan_jobs.lock().unwrap().clone();
    // the host outside the target space is never swept
    assert_eq!(jobs[0], (5, 80));
    let high: Vec<u16> = jobs[1..].iter().map(|(_, port)| *port).collect();
    assert!(high.iter().all(|port| *port >= 20000 && *port != 22));
    let mut unique = high.clone();
    unique.sort_unstable();
    unique.dedup();
    assert_eq!(unique.len(), high.len());
    let phase1_sizes: Vec<usize> = jobs[1..5].iter().map(|(n, _)| *n).collect();
    assert_eq!(phase1_sizes, vec![5, 4, 3, 2]);

    assert!(net
        .probe_jobs
        .lock()
        .unwrap()
        .iter()
        .all(|(_, port)| *port == Some(80)));
}

#[tokio::test]
async fn every_designated_port_is_paired_with_every_service() {
    let net = Arc::new(SimulatedNetwork::new(
        80,
        &[(A, HostBehavior::affected()), (B, HostBehavior::open_to_all())],
    ));
    let config = RunConfig {
        designated_ports: vec![PortSpec::tcp(80), PortSpec::udp(53)],
        ..ssh_from_http()
    };
    let pipeline = Pipeline::new(config, net.clone(), net.clone(), StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let labels: Vec<&str> = report.pairs.iter().map(|run| run.report.label.as_str()).collect();
    assert_eq!(labels, vec!["ssh22_from_tcp80", "ssh22_from_udp53"]);

    // from udp/53 only the open host answers, and a random port clears it again
    let udp = &report.pairs[1];
    assert_eq!(udp.store.get(HostRole::Initial), set(&[B]));
    assert_eq!(udp.report.phases[0].termination, Termination::Exhausted);
    assert_eq!(udp.store.size(HostRole::Candidate), 0);
    assert_eq!(udp.report.phases[1].termination, Termination::EmptyInput);
    assert!(udp.report.complete);
    assert_eq!(report.all_candidates(), set(&[A]));
    assert!(report.complete());
}

#[tokio::test]
async fn iteration_cap_is_reported_but_does_not_stop_the_run() {
    let initial: Vec<Ipv4Addr> = (1..=40).map(|o| Ipv4Addr::new(10, 0, 0, o)).collect();
    let scanner = Arc::new(Scripted::new(vec![
        Step::Answer(initial),
        Step::Answer(vec![Ipv4Addr::new(10, 0, 0, 1), Ipv4Addr::new(10, 0, 0, 2)]),
        Step::Answer(vec![Ipv4Addr::new(10, 0, 0, 3), Ipv4Addr::new(10, 0, 0, 4)]),
    ]));
    let prober = Arc::new(Scripted::new(vec![]));
    let config = RunConfig {
        max_iterations: 2,
        threshold: 0.01,
        ..ssh_from_http()
    };
    let pipeline = Pipeline::new(config, scanner, prober.clone(), StopSignal::new());

    let report = pipeline.run().await.unwrap();
    let run = &report.pairs[0];
    let phase1 = run.report.phase(Phase::Discovery).unwrap();

    assert_eq!(phase1.termination, Termination::IterationCap);
    assert!(phase1.incomplete);
    // seed round plus exactly two high-port rounds
    assert_eq!(phase1.iterations(), 3);
    assert_eq!(run.store.size(HostRole::Candidate), 36);
    assert_eq!(run.report.phases.len(), 3);
    assert!(!run.report.complete);
    assert_eq!(prober.call_count(), 1);
}
