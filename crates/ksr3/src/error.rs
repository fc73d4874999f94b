//! Error types for the kinetic partition engine.

use thiserror::Error;

/// Errors surfaced by the partition engine.
///
/// The engine never aborts the process: unimplemented branches and broken
/// invariants come back as values so callers can decide to abort or retry
/// with relaxed parameters.
#[derive(Debug, Error)]
pub enum KsrError {
    /// Input rejected before the simulation starts (empty polygon set,
    /// degenerate polygon, collapsed bounding box).
    #[error("invalid input: {details}")]
    InvalidInput {
        /// What was wrong with the input.
        details: String,
    },

    /// A code path that is declared but intentionally not implemented.
    #[error("not implemented: {details}")]
    NotImplemented {
        /// Which operation or branch is missing.
        details: &'static str,
    },

    /// Mesh or intersection-graph consistency broke. Reported with enough
    /// context to locate the offending plane or edge.
    #[error("invariant violation on support plane {plane}: {details}")]
    InvariantViolation {
        /// Index of the support plane where the violation was detected.
        plane: usize,
        /// Human-readable description of the failed invariant.
        details: String,
    },

    /// The simulation did not reach quiescence within the configured
    /// number of time windows.
    #[error("simulation did not converge within {windows} time windows")]
    IterationLimit {
        /// Number of windows that were run.
        windows: usize,
    },
}

/// Result alias used across the crate.
pub type KsrResult<T> = Result<T, KsrError>;
