//! # Informer
//!
//! Turns a `kube_runtime` watch stream into cache updates and change
//! notifications.
//!
//! Every event is applied to the reflector store backing the
//! [`InformerCache`]. Before an object is applied, the previous version is
//! looked up so handlers can tell an add from an update. `InitDone` marks the
//! cache as synced; from then on the cache reflects a full listing.

use crate::controller::cache::{InformerCache, ObjectCache};
use crate::controller::key::object_key;
use crate::controller::queue::WorkQueue;
use futures::{pin_mut, StreamExt};
use kube::api::Api;
use kube::Resource;
use kube_runtime::reflector::store::Writer;
use kube_runtime::reflector::ObjectRef;
use kube_runtime::watcher;
use kube_runtime::WatchStreamExt;
use serde::de::DeserializeOwned;
use std::fmt::Debug;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Receives change notifications from an [`Informer`]
///
/// Handlers run on the informer task and must not block.
pub trait ResourceEventHandler<K>: Send + Sync {
    fn on_add(&self, obj: &K);

    fn on_update(&self, old: &K, new: &K);

    fn on_delete(&self, _obj: &K) {}
}

/// Enqueues the key of every added or updated object
///
/// Initial enqueues are never rate limited; only requeues after a failed
/// sync are.
#[derive(Debug, Clone)]
pub struct EnqueueHandler {
    queue: WorkQueue,
}

impl EnqueueHandler {
    pub fn new(queue: WorkQueue) -> Self {
        Self { queue }
    }

    fn enqueue<K: Resource>(&self, obj: &K) {
        match object_key(obj) {
            Ok(key) => self.queue.add(key),
            Err(e) => error!(error = %e, "Failed to derive work queue key, dropping notification"),
        }
    }
}

impl<K: Resource> ResourceEventHandler<K> for EnqueueHandler {
    fn on_add(&self, obj: &K) {
        self.enqueue(obj);
    }

    fn on_update(&self, _old: &K, new: &K) {
        self.enqueue(new);
    }
}

/// Watches one resource type, keeps its cache current and notifies a handler
pub struct Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + 'static,
{
    writer: Writer<K>,
    cache: InformerCache<K>,
    handler: Arc<dyn ResourceEventHandler<K>>,
}

impl<K> std::fmt::Debug for Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + Send + Sync + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Informer")
            .field("kind", &K::kind(&()))
            .field("synced", &ObjectCache::has_synced(&self.cache))
            .finish_non_exhaustive()
    }
}

impl<K> Informer<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    pub fn new(handler: Arc<dyn ResourceEventHandler<K>>) -> Self {
        let writer = Writer::default();
        let cache = InformerCache::new(writer.as_reader());
        Self {
            writer,
            cache,
            handler,
        }
    }

    /// The cache this informer keeps current
    pub fn cache(&self) -> InformerCache<K> {
        self.cache.clone()
    }

    /// Apply one watch event to the cache and notify the handler
    pub fn handle_event(&mut self, event: watcher::Event<K>) {
        match &event {
            watcher::Event::Init => {
                debug!(kind = %K::kind(&()), "informer.list.started");
                self.writer.apply_watcher_event(&event);
            }
            watcher::Event::InitApply(obj) | watcher::Event::Apply(obj) => {
                let old = self.cache_lookup(obj);
                self.writer.apply_watcher_event(&event);
                match old {
                    Some(old) => self.handler.on_update(&old, obj),
                    None => self.handler.on_add(obj),
                }
            }
            watcher::Event::InitDone => {
                self.writer.apply_watcher_event(&event);
                self.cache.mark_synced();
                info!(kind = %K::kind(&()), objects = self.cache.len(), "informer.list.completed");
            }
            watcher::Event::Delete(obj) => {
                self.writer.apply_watcher_event(&event);
                self.handler.on_delete(obj);
            }
        }
    }

    fn cache_lookup(&self, obj: &K) -> Option<Arc<K>> {
        self.writer.as_reader().get(&ObjectRef::from_obj(obj))
    }

    /// Watch `api` until `cancel` fires or the stream ends
    ///
    /// Watch errors are retried with the watcher's default backoff.
    pub async fn run(mut self, api: Api<K>, config: watcher::Config, cancel: CancellationToken) {
        info!(kind = %K::kind(&()), "Starting informer");
        let stream = watcher(api, config).default_backoff();
        pin_mut!(stream);

        loop {
            let next = tokio::select! {
                () = cancel.cancelled() => break,
                next = stream.next() => next,
            };

            match next {
                Some(Ok(event)) => self.handle_event(event),
                Some(Err(e)) => {
                    warn!(kind = %K::kind(&()), error = %e, "Error watching resources, retrying");
                }
                None => {
                    warn!(kind = %K::kind(&()), "Watch stream ended");
                    break;
                }
            }
        }

        info!(kind = %K::kind(&()), "Informer stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crd::{Annotation, AnnotationSpec, Target};
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingHandler {
        calls: Mutex<Vec<String>>,
    }

    impl ResourceEventHandler<Annotation> for RecordingHandler {
        fn on_add(&self, obj: &Annotation) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("add {}", object_key(obj).unwrap()));
        }

        fn on_update(&self, old: &Annotation, new: &Annotation) {
            self.calls.lock().unwrap().push(format!(
                "update {} {}->{}",
                object_key(new).unwrap(),
                old.spec.targets.len(),
                new.spec.targets.len()
            ));
        }

        fn on_delete(&self, obj: &Annotation) {
            self.calls
                .lock()
                .unwrap()
                .push(format!("delete {}", object_key(obj).unwrap()));
        }
    }

    fn informer_for(handler: &Arc<RecordingHandler>) -> Informer<Annotation> {
        let handler: Arc<dyn ResourceEventHandler<Annotation>> =
            Arc::<RecordingHandler>::clone(handler);
        Informer::new(handler)
    }

    fn annotation(name: &str, targets: usize) -> Annotation {
        let mut annotation = Annotation::new(
            name,
            AnnotationSpec {
                targets: vec![Target::new("namespace", [("owner", "team-a")]); targets],
            },
        );
        annotation.metadata.namespace = Some("team-a".to_string());
        annotation
    }

    #[test]
    fn test_initial_listing_marks_synced() {
        let handler = Arc::new(RecordingHandler::default());
        let mut informer = informer_for(&handler);
        let cache = informer.cache();

        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(annotation("policy1", 1)));
        assert!(!cache.has_synced());

        informer.handle_event(watcher::Event::InitDone);
        assert!(cache.has_synced());
        assert!(cache.get("team-a", "policy1").is_some());
        assert_eq!(*handler.calls.lock().unwrap(), vec!["add team-a/policy1"]);
    }

    #[test]
    fn test_apply_distinguishes_add_and_update() {
        let handler = Arc::new(RecordingHandler::default());
        let mut informer = informer_for(&handler);

        informer.handle_event(watcher::Event::Apply(annotation("policy1", 1)));
        informer.handle_event(watcher::Event::Apply(annotation("policy1", 2)));
        informer.handle_event(watcher::Event::Delete(annotation("policy1", 2)));

        assert_eq!(
            *handler.calls.lock().unwrap(),
            vec![
                "add team-a/policy1",
                "update team-a/policy1 1->2",
                "delete team-a/policy1"
            ]
        );
        assert!(informer.cache().get("team-a", "policy1").is_none());
    }

    #[test]
    fn test_relist_reports_known_objects_as_updates() {
        let handler = Arc::new(RecordingHandler::default());
        let mut informer = informer_for(&handler);

        informer.handle_event(watcher::Event::Apply(annotation("policy1", 1)));
        informer.handle_event(watcher::Event::Init);
        informer.handle_event(watcher::Event::InitApply(annotation("policy1", 3)));
        informer.handle_event(watcher::Event::InitDone);

        assert_eq!(
            handler.calls.lock().unwrap().last().map(String::as_str),
            Some("update team-a/policy1 1->3")
        );
    }

    #[tokio::test]
    async fn test_enqueue_handler_adds_keys_without_rate_limit() {
        let queue = WorkQueue::default();
        let handler = EnqueueHandler::new(queue.clone());

        ResourceEventHandler::on_add(&handler, &annotation("policy1", 1));
        ResourceEventHandler::on_update(
            &handler,
            &annotation("policy1", 1),
            &annotation("policy1", 2),
        );

        assert_eq!(queue.len(), 1);
        assert_eq!(queue.num_requeues("team-a/policy1"), 0);
        assert_eq!(queue.get().await.as_deref(), Some("team-a/policy1"));
    }

    #[test]
    fn test_enqueue_handler_ignores_nameless_objects() {
        let queue = WorkQueue::default();
        let handler = EnqueueHandler::new(queue.clone());

        let nameless = Annotation {
            metadata: kube::api::ObjectMeta::default(),
            spec: AnnotationSpec::default(),
        };
        ResourceEventHandler::on_add(&handler, &nameless);
        assert!(queue.is_empty());
    }
}
