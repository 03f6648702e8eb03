//! # Custom Resource Definitions
//!
//! CRD types for the Annotation Controller.
//!
//! ## Module Structure
//!
//! - `spec.rs` - The `Annotation` resource and its `Target` entries

mod spec;

// Re-export all public types
pub use spec::{Annotation, AnnotationSpec, Target};
