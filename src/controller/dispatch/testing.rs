//! In-memory stand-ins for the external system.

use super::{ExternalError, ObjectStore};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::Namespace;
use kube::api::ObjectMeta;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

pub(crate) fn pairs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

#[derive(Default)]
pub(crate) struct MemoryNamespaces {
    objects: Mutex<BTreeMap<String, Namespace>>,
    pub writes: AtomicUsize,
    pub conflicts: AtomicUsize,
}

impl MemoryNamespaces {
    pub fn with(name: &str, annotations: &[(&str, &str)]) -> Self {
        let store = Self::default();
        store.objects.lock().unwrap().insert(
            name.to_string(),
            Namespace {
                metadata: ObjectMeta {
                    name: Some(name.to_string()),
                    annotations: (!annotations.is_empty()).then(|| pairs(annotations)),
                    ..ObjectMeta::default()
                },
                ..Namespace::default()
            },
        );
        store
    }

    pub fn annotations(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.objects.lock().unwrap()[name].metadata.annotations.clone()
    }
}

#[async_trait]
impl ObjectStore<Namespace> for MemoryNamespaces {
    async fn get(&self, name: &str) -> Result<Namespace, ExternalError> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .cloned()
            .ok_or_else(|| ExternalError::NotFound {
                kind: "Namespace".to_string(),
                name: name.to_string(),
            })
    }

    async fn replace(&self, obj: &Namespace) -> Result<Namespace, ExternalError> {
        let name = obj.metadata.name.clone().unwrap_or_default();
        if self
            .conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(ExternalError::Conflict {
                kind: "Namespace".to_string(),
                name,
            });
        }
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().unwrap().insert(name, obj.clone());
        Ok(obj.clone())
    }
}

