//! The `namespace` target: merge annotations into a Namespace.

use super::{ApplyOutcome, DispatchError, ObjectStore, TargetHandler};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{debug, info};

/// Merge `incoming` into `existing` without overwriting
///
/// Keys already present keep their value. Returns the number of keys added.
pub fn merge_annotations(
    existing: &mut BTreeMap<String, String>,
    incoming: &BTreeMap<String, String>,
) -> usize {
    let mut added = 0;
    for (key, value) in incoming {
        if !existing.contains_key(key) {
            existing.insert(key.clone(), value.clone());
            added += 1;
        }
    }
    added
}

/// Adds a target's data as annotations on the Namespace of the record
pub struct NamespaceAnnotator {
    store: Arc<dyn ObjectStore<Namespace>>,
}

impl std::fmt::Debug for NamespaceAnnotator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NamespaceAnnotator").finish_non_exhaustive()
    }
}

impl NamespaceAnnotator {
    /// Kind this handler is registered under
    pub const KIND: &'static str = "namespace";

    pub fn new(store: Arc<dyn ObjectStore<Namespace>>) -> Self {
        Self { store }
    }
}

#[async_trait]
impl TargetHandler for NamespaceAnnotator {
    async fn apply(
        &self,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, DispatchError> {
        let mut object = self.store.get(namespace).await?;

        let annotations = object.metadata.annotations.get_or_insert_with(BTreeMap::new);
        let added = merge_annotations(annotations, data);
        if added == 0 {
            debug!(namespace, "Namespace already carries every annotation");
            return Ok(ApplyOutcome::Unchanged);
        }

        self.store.replace(&object).await?;
        info!(namespace, added, "Annotated namespace");
        Ok(ApplyOutcome::Applied { added })
    }
}
