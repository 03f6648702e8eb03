//! # Controller
//!
//! Core controller modules for the Annotation Controller.
//!
//! - `key`: work-queue keys derived from object identity
//! - `queue`: deduplicating, rate-limited work queue
//! - `cache`: read-only local cache of watched resources
//! - `informer`: watch stream driving the cache and enqueueing changes
//! - `dispatch`: target kind to handler mapping and the namespace handler
//! - `events`: Kubernetes Event recording
//! - `reconciler`: the sync handler
//! - `server`: HTTP server for metrics and health checks

pub mod cache;
pub mod dispatch;
pub mod events;
pub mod informer;
pub mod key;
pub mod queue;
pub mod reconciler;
pub mod server;
