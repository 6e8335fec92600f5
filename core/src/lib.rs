//! # gatescan core
//!
//! Differential scanning: find hosts whose services answer only when the probe
//! comes from a whitelisted source port.
//!
//! * **[`convergence`]**: the round loop shared by every phase.
//! * **[`phase`]**: discovery, service probing and false-positive verification.
//! * **[`pipeline`]**: runs the phases for each designated port and service pair.
//! * **[`engine`]**: outbound traits for scanners and probers, plus their adapters.

pub mod convergence;
pub mod engine;
pub mod error;
pub mod phase;
pub mod pipeline;
pub mod sampler;
pub mod signal;

pub use error::{EngineError, PipelineError, RoundError};
pub use pipeline::{PairReport, PairRun, Pipeline, RunReport};
pub use signal::StopSignal;
