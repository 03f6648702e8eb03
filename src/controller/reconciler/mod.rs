//! # Reconciler
//!
//! The sync handler: given a work-queue key, re-reads the current
//! [`Annotation`](crate::crd::Annotation) from the local cache and applies
//! each of its targets through the [`ActionDispatcher`].
//!
//! A sync is level-triggered and idempotent. It never acts on the payload of
//! the notification that enqueued the key, only on the latest cached record,
//! so running it again for the same key converges on the same external state.
//!
//! Failure policy:
//! - a malformed key is reported once and never retried
//! - a record missing from the cache was deleted; that is success
//! - a target with an unknown kind is skipped with a warning event, and its
//!   siblings are still applied
//! - every other target is attempted even if an earlier one failed; the
//!   failures are returned together and the whole record is retried

mod sync;
mod types;

pub use sync::Reconciler;
pub use types::{ReconcilerError, SyncOutcome, TargetFailure};
