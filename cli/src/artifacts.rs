//! Files written to the output directory once a run ends, complete or not.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::{DateTime, Utc};
use gatescan_common::hosts::{HostRole, HostSet};
use gatescan_common::record::ResponseSet;
use gatescan_core::{PairReport, PairRun, RunReport};
use serde::Serialize;

#[derive(Serialize)]
struct Summary<'a> {
    version: &'static str,
    scanner: &'a str,
    started_at: DateTime<Utc>,
    finished_at: DateTime<Utc>,
    complete: bool,
    cancelled: bool,
    candidates_all: usize,
    pairs: Vec<&'a PairReport>,
}

#[derive(Serialize)]
struct HostRow<'a> {
    pair: &'a str,
    ip: String,
    roles: String,
}

pub struct RunMeta<'a> {
    pub scanner: &'a str,
    pub started_at: DateTime<Utc>,
}

/// Writes every artifact and returns the paths, in write order.
pub fn write_all(dir: &Path, report: &RunReport, meta: &RunMeta<'_>) -> anyhow::Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir).with_context(|| format!("cannot create {}", dir.display()))?;
    let mut written = Vec::new();

    for run in &report.pairs {
        written.extend(write_pair(dir, run)?);
    }

    let all = dir.join("candidates_all.ips");
    write_ips(&all, &report.all_candidates())?;
    written.push(all);

    let hosts = dir.join("hosts.csv");
    write_hosts_csv(&hosts, report)?;
    written.push(hosts);

    let summary = dir.join("summary.json");
    write_summary(&summary, report, meta)?;
    written.push(summary);

    Ok(written)
}

pub fn write_pair(dir: &Path, run: &PairRun) -> anyhow::Result<Vec<PathBuf>> {
    let label = &run.report.label;
    let initial = run.store.get(HostRole::Initial);
    let candidates = run.store.get(HostRole::Candidate);
    let irrelevant = run.store.get(HostRole::Irrelevant);

    // Irrelevant keeps growing in phase 3, so each phase's share is cut out
    // against the candidate list.
    let files: [(String, HostSet); 4] = [
        (format!("phase1_{label}_initial.ips"), initial.clone()),
        (format!("phase1_{label}_irrelevant.ips"), initial.difference(&candidates)),
        (format!("phase1_{label}_candidates.ips"), candidates.clone()),
        (format!("phase3_{label}_irrelevant.ips"), irrelevant.intersection(&candidates)),
    ];

    let mut written = Vec::with_capacity(files.len() + 2);
    for (name, hosts) in files {
        let path = dir.join(name);
        write_ips(&path, &hosts)?;
        written.push(path);
    }

    let responses = dir.join(format!("phase2_{label}_responses.jsonl"));
    write_records(&responses, &run.responses)?;
    written.push(responses);

    let verified = dir.join(format!("phase3_{label}_verified.jsonl"));
    write_records(&verified, &run.verified)?;
    written.push(verified);

    Ok(written)
}

/// One address per line, sorted.
pub fn write_ips(path: &Path, hosts: &HostSet) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for ip in hosts.sorted() {
        writeln!(out, "{ip}")?;
    }
    out.flush()?;
    Ok(())
}

/// One JSON record per line.
pub fn write_records(path: &Path, responses: &ResponseSet) -> anyhow::Result<()> {
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    for record in responses.records() {
        serde_json::to_writer(&mut out, record)?;
        writeln!(out)?;
    }
    out.flush()?;
    Ok(())
}

fn write_hosts_csv(path: &Path, report: &RunReport) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_path(path).with_context(|| format!("cannot create {}", path.display()))?;
    for run in &report.pairs {
        for ip in run.store.identities().sorted() {
            let roles: Vec<String> = run
                .store
                .roles_of(&ip)
                .iter()
                .map(ToString::to_string)
                .collect();
            writer.serialize(HostRow {
                pair: &run.report.label,
                ip: ip.to_string(),
                roles: roles.join(";"),
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

fn write_summary(path: &Path, report: &RunReport, meta: &RunMeta<'_>) -> anyhow::Result<()> {
    let summary = Summary {
        version: env!("CARGO_PKG_VERSION"),
        scanner: meta.scanner,
        started_at: meta.started_at,
        finished_at: Utc::now(),
        complete: report.complete(),
        cancelled: report.cancelled,
        candidates_all: report.all_candidates().len(),
        pairs: report.pairs.iter().map(|run| &run.report).collect(),
    };
    let file = File::create(path).with_context(|| format!("cannot create {}", path.display()))?;
    let mut out = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut out, &summary)?;
    out.flush()?;
    Ok(())
}
