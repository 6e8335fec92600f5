//! End-to-end pipeline scenarios driven by in-memory engines.

pub mod mock;

#[cfg(test)]
mod pipeline;
