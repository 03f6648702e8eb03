//! # Local Cache
//!
//! Read-only, eventually consistent mirror of the watched resources, backed
//! by a `kube_runtime` reflector store and kept current by the
//! [`Informer`](crate::controller::informer::Informer).

use kube::Resource;
use kube_runtime::reflector::{ObjectRef, Store};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Lookup side of the local cache
pub trait ObjectCache<K>: Send + Sync {
    /// Current cached object, or `None` if it is not (or no longer) known
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>>;

    /// Whether the initial listing has completed
    fn has_synced(&self) -> bool;
}

/// Reflector store plus the synced flag set by the informer
#[derive(Debug)]
pub struct InformerCache<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    store: Store<K>,
    synced: Arc<AtomicBool>,
}

impl<K> Clone for InformerCache<K>
where
    K: Resource<DynamicType = ()> + 'static,
{
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            synced: Arc::clone(&self.synced),
        }
    }
}

impl<K> InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    pub(crate) fn new(store: Store<K>) -> Self {
        Self {
            store,
            synced: Arc::new(AtomicBool::new(false)),
        }
    }

    pub(crate) fn mark_synced(&self) {
        if !self.synced.swap(true, Ordering::AcqRel) {
            debug!(objects = self.store.len(), "cache.synced");
        }
    }

    /// Every cached object
    pub fn list(&self) -> Vec<Arc<K>> {
        self.store.state()
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }
}

impl<K> ObjectCache<K> for InformerCache<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
        let obj_ref = if namespace.is_empty() {
            ObjectRef::new(name)
        } else {
            ObjectRef::new(name).within(namespace)
        };
        self.store.get(&obj_ref)
    }

    fn has_synced(&self) -> bool {
        self.synced.load(Ordering::Acquire)
    }
}

/// Poll `probe` until it reports true
///
/// Returns `false` if `cancel` fires first.
#[must_use]
pub async fn wait_for_cache_sync<F>(
    probe: F,
    poll_interval: Duration,
    cancel: &CancellationToken,
) -> bool
where
    F: Fn() -> bool,
{
    let mut ticker = tokio::time::interval(poll_interval.max(Duration::from_millis(1)));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        if probe() {
            return true;
        }
        tokio::select! {
            () = cancel.cancelled() => return false,
            _ = ticker.tick() => {}
        }
    }
}

/// Hand-filled [`ObjectCache`] for tests
#[cfg(test)]
#[derive(Debug)]
pub(crate) struct MemoryCache<K> {
    objects: std::sync::Mutex<std::collections::BTreeMap<(String, String), Arc<K>>>,
    synced: AtomicBool,
}

#[cfg(test)]
impl<K> Default for MemoryCache<K> {
    fn default() -> Self {
        Self {
            objects: std::sync::Mutex::default(),
            synced: AtomicBool::new(true),
        }
    }
}

#[cfg(test)]
impl<K: Resource> MemoryCache<K> {
    pub fn insert(&self, obj: K) {
        let key = (
            obj.meta().namespace.clone().unwrap_or_default(),
            obj.meta().name.clone().unwrap_or_default(),
        );
        self.objects.lock().unwrap().insert(key, Arc::new(obj));
    }

    pub fn set_synced(&self, synced: bool) {
        self.synced.store(synced, Ordering::Release);
    }

    pub fn remove(&self, namespace: &str, name: &str) {
        self.objects
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
    }
}

#[cfg(test)]
impl<K: Send + Sync> ObjectCache<K> for MemoryCache<K> {
    fn get(&self, namespace: &str, name: &str) -> Option<Arc<K>> {
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
