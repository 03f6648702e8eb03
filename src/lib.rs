//! Annotation Controller Library
//!
//! This library provides the core functionality for the Annotation Controller:
//! a level-triggered controller that merges the annotations declared by
//! `Annotation` resources (`ffx.io/v1`) into cluster objects.
//! Tests are included in the module files.
//!
//! ## Quick Start
//!
//! ```rust
//! use annotation_controller::prelude::*;
//! ```
//!
//! This brings commonly used types and traits into scope. For more specific imports,
//! use the individual modules.

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod runtime;
