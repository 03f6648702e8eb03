//! # Annotation Spec
//!
//! The desired-state record reconciled by the controller.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Annotation Custom Resource Definition
///
/// Each `Annotation` lists targets; every target names the kind of cluster
/// object to mutate and the annotations to merge into it. Existing annotation
/// values on the target object are never overwritten.
///
/// # Example
///
/// ```yaml
/// apiVersion: ffx.io/v1
/// kind: Annotation
/// metadata:
///   name: policy1
///   namespace: team-a
/// spec:
///   targets:
///     - kind: namespace
///       data:
///         owner: team-a
/// ```
#[derive(
    kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema,
)]
#[kube(
    kind = "Annotation",
    group = "ffx.io",
    version = "v1",
    namespaced,
    shortname = "ann"
)]
#[serde(rename_all = "camelCase")]
pub struct AnnotationSpec {
    /// Mutations to apply, processed in list order
    #[serde(default)]
    pub targets: Vec<Target>,
}

/// One declared mutation inside an `Annotation`
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    /// Kind of object to mutate (e.g. "namespace")
    pub kind: String,
    /// Annotations to merge into the object; keys already present are left alone
    #[serde(default)]
    pub data: BTreeMap<String, String>,
}

impl Target {
    /// Build a target from a kind and key/value pairs
    pub fn new<I, K, V>(kind: impl Into<String>, data: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            kind: kind.into(),
            data: data
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}
