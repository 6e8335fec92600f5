use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use chrono::Utc;
use colored::*;
use gatescan_common::config::{Config, RunConfig};
use gatescan_core::engine::EngineSettings;
use gatescan_core::engine::resolve::resolve_scan_engine;
use gatescan_core::engine::socket::SocketProbeEngine;
use gatescan_core::{Pipeline, PipelineError, StopSignal};
use tracing::{error, info, warn};

use super::RunArgs;
use crate::artifacts::{self, RunMeta};
use crate::terminal::{colors, print};

fn load_config(args: &RunArgs) -> anyhow::Result<RunConfig> {
    let base = match &args.config {
        Some(path) => RunConfig::from_file(path)?,
        None => RunConfig::default(),
    };
    Ok(args.apply(base))
}

fn listen_for_ctrl_c(stop: StopSignal) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupt received, stopping after the current round");
            stop.stop();
        }
    });
}

pub async fn run(args: RunArgs, cfg: &Config) -> anyhow::Result<()> {
    let config = load_config(&args)?;

    if !is_root::is_root() {
        warn!("not running as root: raw scanning and binding designated ports below 1024 will likely fail");
    }

    print::header("configuration", cfg.quiet);
    print::aligned_line("target", &config.target);
    print::aligned_line("pairs", config.pairs().len());
    print::aligned_line("threshold", format!("{:.2}%", config.threshold * 100.0));
    print::aligned_line("max rounds", config.max_iterations);
    print::aligned_line("seed", config.seed);
    print::aligned_line("output", config.output_dir.display());

    let settings = EngineSettings {
        iface: config.iface.clone(),
        exclude_file: config.exclude_file.clone(),
        work_dir: config.output_dir.join("work"),
    };
    let scanner = resolve_scan_engine(config.scanner, settings).map_err(PipelineError::EngineUnavailable)?;
    let scanner_name = scanner.name().to_string();

    let stop = StopSignal::new();
    listen_for_ctrl_c(stop.clone());

    let output_dir = config.output_dir.clone();
    let pipeline = Pipeline::new(config, scanner, Arc::new(SocketProbeEngine::new()), stop);

    print::header("scanning", cfg.quiet);
    let started_at = Utc::now();
    let start_time = Instant::now();
    let report = match pipeline.run().await {
        Ok(report) => report,
        Err(e) => {
            error!("{e}");
            return Err(e).context("run aborted before scanning");
        }
    };

    print::run_summary(&report, cfg.quiet);

    let meta = RunMeta {
        scanner: &scanner_name,
        started_at,
    };
    let written = artifacts::write_all(&output_dir, &report, &meta)?;
    info!(
        "wrote {} files to {} in {:.1}s",
        written.len(),
        output_dir.display(),
        start_time.elapsed().as_secs_f64()
    );
    if report.cancelled {
        print::centerln(&format!("{}", "interrupted, artifacts are partial".color(colors::WARNING)));
    }
    print::end_of_program();
    Ok(())
}
