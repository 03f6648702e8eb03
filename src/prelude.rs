//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use annotation_controller::prelude::*;
//! ```
//!
//! This brings into scope:
//! - CRD types (Annotation, AnnotationSpec, Target)
//! - The work queue and its rate limiters
//! - Cache, informer, dispatcher, event recorder and reconciler types
//! - The controller runtime and config types

// CRD types - most commonly used
pub use crate::crd::*;

// Work queue
pub use crate::controller::key::{object_key, split_key, KeyError};
pub use crate::controller::queue::{RateLimiter, WorkQueue};

// Change notification and local cache
pub use crate::controller::cache::{wait_for_cache_sync, InformerCache, ObjectCache};
pub use crate::controller::informer::{EnqueueHandler, Informer, ResourceEventHandler};

// Sync handler and its collaborators
pub use crate::controller::dispatch::{
    merge_annotations, ActionDispatcher, ApplyOutcome, DispatchError, ExternalError,
    NamespaceAnnotator, ObjectStore, TargetHandler,
};
pub use crate::controller::events::EventRecorder;
pub use crate::controller::reconciler::{Reconciler, ReconcilerError, SyncOutcome};

// Controller runtime
pub use crate::runtime::controller::{Controller, ControllerError, ControllerState};

// Config types - for configuration management
pub use crate::config::{ControllerConfig, ServerConfig};
