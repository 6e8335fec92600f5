//! Picks the scan engine once, at startup.

use std::path::PathBuf;
use std::sync::Arc;

use gatescan_common::config::ScannerKind;
use tracing::debug;

use super::command::find_in_path;
use super::masscan::MasscanEngine;
use super::zmap::ZmapEngine;
use super::{EngineSettings, ScanEngine};
use crate::error::EngineError;

/// Order in which `auto` looks for binaries.
const AUTO_PREFERENCE: [ScannerKind; 2] = [ScannerKind::Zmap, ScannerKind::Masscan];

fn binary_name(kind: ScannerKind) -> &'static str {
    match kind {
        ScannerKind::Zmap => "zmap",
        ScannerKind::Masscan => "masscan",
        ScannerKind::Auto => "zmap|masscan",
    }
}

fn build(kind: ScannerKind, binary: PathBuf, settings: EngineSettings) -> Arc<dyn ScanEngine> {
    match kind {
        ScannerKind::Masscan => Arc::new(MasscanEngine::new(binary, settings)),
        ScannerKind::Zmap | ScannerKind::Auto => Arc::new(ZmapEngine::new(binary, settings)),
    }
}

/// Finds the binary for `kind` on `PATH`. `Auto` takes the first installed
/// engine in preference order.
pub fn locate(kind: ScannerKind) -> Option<(ScannerKind, PathBuf)> {
    let candidates: &[ScannerKind] = match kind {
        ScannerKind::Auto => &AUTO_PREFERENCE,
        ScannerKind::Zmap => &[ScannerKind::Zmap],
        ScannerKind::Masscan => &[ScannerKind::Masscan],
    };

    candidates.iter().find_map(|candidate| {
        let found = find_in_path(binary_name(*candidate));
        debug!("looking for {}: {:?}", binary_name(*candidate), found);
        found.map(|path| (*candidate, path))
    })
}

pub fn resolve_scan_engine(
    kind: ScannerKind,
    settings: EngineSettings,
) -> Result<Arc<dyn ScanEngine>, EngineError> {
    let (resolved, binary) = locate(kind).ok_or_else(|| {
        EngineError::unavailable(
            binary_name(kind),
            "no scanner binary found on PATH".to_string(),
        )
    })?;
    debug!("using {resolved} at {}", binary.display());
    Ok(build(resolved, binary, settings))
}
