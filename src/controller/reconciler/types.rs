//! # Types
//!
//! Outcomes and errors of a single sync.

use crate::controller::dispatch::DispatchError;
use crate::controller::key::KeyError;
use thiserror::Error;

/// Successful result of [`Reconciler::sync`](super::Reconciler::sync)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Every known target was applied
    Synced {
        /// Targets that changed the external object
        applied: usize,
        /// Targets the external object already satisfied
        unchanged: usize,
        /// Targets with a kind no handler is registered for
        skipped: usize,
    },
    /// The record no longer exists; nothing to do
    NotFound,
}

/// A target that could not be applied
#[derive(Debug, Error)]
#[error("target {index} ({kind}): {error}")]
pub struct TargetFailure {
    /// Position of the target in the record
    pub index: usize,
    pub kind: String,
    #[source]
    pub error: DispatchError,
}

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error("invalid key: {0}")]
    InvalidKey(#[from] KeyError),

    #[error("{} of {total} targets failed", .failures.len())]
    TargetsFailed {
        failures: Vec<TargetFailure>,
        total: usize,
    },
}

impl ReconcilerError {
    /// Whether requeueing the key can lead to a different result
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::InvalidKey(_) => false,
            Self::TargetsFailed { failures, .. } => failures.iter().any(|f| f.error.is_retryable()),
        }
    }
}
