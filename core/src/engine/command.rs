use std::ffi::OsStr;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use gatescan_common::hosts::HostSet;
use tokio::process::Command;
use tokio::time::timeout;
use tracing::{debug, warn};

use crate::error::EngineError;

/// Looks `name` up on `PATH`, like `which`.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

pub fn is_executable(path: &Path) -> bool {
    let Ok(meta) = std::fs::metadata(path) else {
        return false;
    };
    if !meta.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        meta.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

/// How a scanner process ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exit {
    Finished,
    /// Still running when its time limit hit, and killed.
    OutOfTime,
}

/// Runs a scanner binary for at most `limit`. The child is killed when the
/// limit passes or the future is dropped, so no scanner outlives its round.
pub async fn run<I, S>(engine: &str, binary: &Path, args: I, limit: Duration) -> Result<Exit, EngineError>
where
    I: IntoIterator<Item = S>,
    S: AsRef<OsStr>,
{
    let mut cmd = Command::new(binary);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    debug!("$ {:?}", cmd.as_std());

    let child = cmd.spawn().map_err(|e| match e.kind() {
        ErrorKind::NotFound | ErrorKind::PermissionDenied => {
            EngineError::unavailable(engine, format!("cannot execute {}: {e}", binary.display()))
        }
        _ => EngineError::Io(e),
    })?;

    let output = match timeout(limit, child.wait_with_output()).await {
        Ok(output) => output?,
        Err(_) => {
            warn!("{engine} still running after {limit:?}, killed it");
            return Ok(Exit::OutOfTime);
        }
    };

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let tail: Vec<&str> = stderr.lines().rev().take(3).collect();
        let tail: Vec<&str> = tail.into_iter().rev().collect();
        return Err(EngineError::failed(
            engine,
            format!("exited with {}: {}", output.status, tail.join(" | ")),
        ));
    }

    Ok(Exit::Finished)
}

/// Writes one address per line, sorted.
pub async fn write_host_list(path: &Path, hosts: &HostSet) -> Result<(), EngineError> {
    let mut content = String::with_capacity(hosts.len() * 16);
    for ip in hosts.sorted() {
        content.push_str(&ip.to_string());
        content.push('\n');
    }
    tokio::fs::write(path, content).await?;
    Ok(())
}

/// Reads a scanner's result file. A missing file means nobody answered. After a
/// kill the last line may be cut off mid-write, so only complete lines are kept.
pub async fn read_output(path: &Path, exit: Exit) -> Result<String, EngineError> {
    let mut text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
        Err(e) => return Err(e.into()),
    };
    if exit == Exit::OutOfTime {
        let complete = text.rfind('\n').map_or(0, |i| i + 1);
        text.truncate(complete);
    }
    Ok(text)
}
