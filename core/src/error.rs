//! Error taxonomy of the pipeline.
//!
//! Only two conditions are fatal: an engine that cannot be invoked at all and
//! a configuration that does not validate. Everything else (round timeouts,
//! non-convergence, empty input, failed rounds) ends up as a
//! [`crate::convergence::Termination`] on the phase report.

use std::time::Duration;

use gatescan_common::config::ConfigError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{engine} is unavailable: {reason}")]
    Unavailable { engine: String, reason: String },

    #[error("round exceeded its {budget:?} budget")]
    RoundTimeout { budget: Duration },

    #[error("{engine} failed: {reason}")]
    Failed { engine: String, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    pub fn unavailable(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Unavailable {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    pub fn failed(engine: impl Into<String>, reason: impl Into<String>) -> Self {
        EngineError::Failed {
            engine: engine.into(),
            reason: reason.into(),
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, EngineError::RoundTimeout { .. })
    }
}

/// Why a single round could not produce a responder set.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("no unused high source port left in {start}..={end}")]
    PortsExhausted { start: u16, end: u16 },
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("engine unavailable, nothing was scanned: {0}")]
    EngineUnavailable(#[source] EngineError),

    #[error(transparent)]
    InvalidConfig(#[from] ConfigError),
}
