//! # Object Keys
//!
//! Work-queue keys are `namespace/name` for namespaced objects and plain
//! `name` for cluster-scoped ones.

use kube::{Resource, ResourceExt};
use thiserror::Error;

/// A key that cannot be turned back into a namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    #[error("object has no name")]
    MissingName,
    #[error("unexpected key format: {0:?}")]
    InvalidKey(String),
}

/// Derive the work-queue key of an object
pub fn object_key<K: Resource>(obj: &K) -> Result<String, KeyError> {
    let name = obj.meta().name.as_deref().unwrap_or_default();
    if name.is_empty() {
        return Err(KeyError::MissingName);
    }

    Ok(match obj.namespace() {
        Some(namespace) if !namespace.is_empty() => format!("{namespace}/{name}"),
        _ => name.to_string(),
    })
}

/// Split a key back into `(namespace, name)`
///
/// A single segment is a cluster-scoped name and yields an empty namespace.
pub fn split_key(key: &str) -> Result<(&str, &str), KeyError> {
    let mut parts = key.split('/');
    let (namespace, name) = match (parts.next(), parts.next(), parts.next()) {
        (Some(name), None, None) => ("", name),
        (Some(namespace), Some(name), None) => (namespace, name),
        _ => return Err(KeyError::InvalidKey(key.to_string())),
    };

    if name.is_empty() {
        return Err(KeyError::InvalidKey(key.to_string()));
    }
    Ok((namespace, name))
}
