use colored::*;
use gatescan_common::config::{Config, ScannerKind};
use gatescan_core::engine::resolve;
use tracing::{error, warn};

use crate::terminal::{colors, print};

pub fn check(scanner: ScannerKind, cfg: &Config) -> anyhow::Result<()> {
    print::header("scan engine", cfg.quiet);
    print::aligned_line("requested", scanner);

    match resolve::locate(scanner) {
        Some((kind, path)) => {
            print::aligned_line("engine", kind.to_string().color(colors::PRIMARY));
            print::aligned_line("binary", path.display());
        }
        None => {
            error!("no usable scanner for '{scanner}' on PATH");
            anyhow::bail!("scan engine unavailable");
        }
    }

    if !is_root::is_root() {
        warn!("not running as root; scans will need elevated privileges");
    }
    Ok(())
}
