//! Shared models for gatescan: run configuration, port and target parsing,
//! the host set store and probe response records.

pub mod config;
pub mod hosts;
pub mod network;
pub mod record;

#[doc(hidden)]
pub use tracing;

/// Logs a positive outcome; the CLI formatter renders it with its own symbol.
#[macro_export]
macro_rules! success {
    ($($arg:tt)*) => {
        $crate::tracing::info!(target: "gatescan::success", $($arg)*)
    };
}
