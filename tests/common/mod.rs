//! Common test utilities for integration tests
//!
//! In-memory stand-ins for the cluster: a hand-filled record cache, a
//! namespace store, and an event recorder that keeps what it was given.

#![allow(dead_code)]

use annotation_controller::prelude::*;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Namespace, ObjectReference};
use kube::api::ObjectMeta;
use kube_runtime::events::EventType;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub fn pairs(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

pub fn annotation(namespace: &str, name: &str, targets: Vec<Target>) -> Annotation {
    let mut annotation = Annotation::new(name, AnnotationSpec { targets });
    annotation.metadata.namespace = Some(namespace.to_string());
    annotation
}

pub struct MemoryCache {
    objects: Mutex<BTreeMap<(String, String), Arc<Annotation>>>,
    pub synced: AtomicBool,
}

impl Default for MemoryCache {
    fn default() -> Self {
        Self {
            objects: Mutex::default(),
            synced: AtomicBool::new(true),
        }
    }
}

impl MemoryCache {
    pub fn insert(&self, obj: Annotation) {
        let key = (
            obj.metadata.namespace.clone().unwrap_or_default(),
            obj.metadata.name.clone().unwrap_or_default(),
        );
        self.objects.lock().unwrap().insert(key, Arc::new(obj));
    }
}

impl ObjectCache<Annotation> for MemoryCache {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<Annotation>> {
        self.objects
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

#[derive(Default)]
pub struct MemoryNamespaces {
    objects: Mutex<BTreeMap<String, Namespace>>,
    pub writes: AtomicUsize,
}

impl MemoryNamespaces {
    pub fn insert(&self, name: &str, annotations: &[(&str, &str)]) {
        self.objects.lock().unwrap().insert(
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
    }

    pub fn annotations(&self, name: &str) -> Option<BTreeMap<String, String>> {
        self.objects
            .lock()
            .unwrap()
            .get(name)
            .and_then(|ns| ns.metadata.annotations.clone())
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
        self.writes.fetch_add(1, Ordering::SeqCst);
        let name = obj.metadata.name.clone().unwrap_or_default();
        self.objects.lock().unwrap().insert(name, obj.clone());
        Ok(obj.clone())
    }
}

#[derive(Default)]
pub struct MemoryEventRecorder {
    events: Mutex<Vec<(String, EventType, String)>>,
}

impl MemoryEventRecorder {
    /// `(object name, type, reason)` of every recorded event
    pub fn events(&self) -> Vec<(String, EventType, String)> {
        self.events.lock().unwrap().clone()
    }
}

impl EventRecorder for MemoryEventRecorder {
    fn record(&self, subject: &ObjectReference, event_type: EventType, reason: &str, _message: &str) {
        self.events.lock().unwrap().push((
            subject.name.clone().unwrap_or_default(),
            event_type,
            reason.to_string(),
        ));
    }
}
