use super::types::{ReconcilerError, SyncOutcome, TargetFailure};
use crate::constants::{
    MESSAGE_SYNCED, REASON_SYNCED, REASON_SYNC_FAILED, REASON_UNKNOWN_TARGET_KIND,
};
use crate::controller::cache::ObjectCache;
use crate::controller::dispatch::{ActionDispatcher, ApplyOutcome, DispatchError};
use crate::controller::events::EventRecorder;
use crate::controller::key::split_key;
use crate::crd::Annotation;
use crate::observability::metrics;
use kube::Resource;
use kube_runtime::events::EventType;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Applies the targets of one record per call
#[derive(Clone)]
pub struct Reconciler {
    cache: Arc<dyn ObjectCache<Annotation>>,
    dispatcher: ActionDispatcher,
    recorder: Arc<dyn EventRecorder>,
}

impl std::fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reconciler")
            .field("dispatcher", &self.dispatcher)
            .finish_non_exhaustive()
    }
}

impl Reconciler {
    pub fn new(
        cache: Arc<dyn ObjectCache<Annotation>>,
        dispatcher: ActionDispatcher,
        recorder: Arc<dyn EventRecorder>,
    ) -> Self {
        Self {
            cache,
            dispatcher,
            recorder,
        }
    }

    /// Whether the cache this reconciler reads from has completed its initial listing
    pub fn has_synced(&self) -> bool {
        self.cache.has_synced()
    }

    /// Bring the external system in line with the record behind `key`
    pub async fn sync(&self, key: &str) -> Result<SyncOutcome, ReconcilerError> {
        let (namespace, name) = split_key(key)?;

        let Some(annotation) = self.cache.get(namespace, name) else {
            info!(resource.key = key, "Annotation no longer exists, nothing to sync");
            return Ok(SyncOutcome::NotFound);
        };
        let subject = annotation.object_ref(&());
        let targets = &annotation.spec.targets;

        let (mut applied, mut unchanged, mut skipped) = (0, 0, 0);
        let mut failures = Vec::new();

        for (index, target) in targets.iter().enumerate() {
            match self
                .dispatcher
                .dispatch(&target.kind, namespace, &target.data)
                .await
            {
                Ok(ApplyOutcome::Applied { added }) => {
                    debug!(resource.key = key, index, kind = %target.kind, added, "Target applied");
                    metrics::increment_targets_applied(&target.kind.trim().to_ascii_lowercase());
                    applied += 1;
                }
                Ok(ApplyOutcome::Unchanged) => unchanged += 1,
                Err(DispatchError::UnknownKind(kind)) => {
                    warn!(resource.key = key, index, kind = %kind, "Skipping target with unknown kind");
                    metrics::increment_unknown_target_kinds();
                    let supported = self.dispatcher.kinds().collect::<Vec<_>>().join(", ");
                    self.recorder.record(
                        &subject,
                        EventType::Warning,
                        REASON_UNKNOWN_TARGET_KIND,
                        &format!("Target {index} has unknown kind {kind:?} (supported: {supported})"),
                    );
                    skipped += 1;
                }
                Err(error) => {
                    warn!(resource.key = key, index, kind = %target.kind, error = %error, "Failed to apply target");
                    failures.push(TargetFailure {
                        index,
                        kind: target.kind.clone(),
                        error,
                    });
                }
            }
        }

        if !failures.is_empty() {
            let error = ReconcilerError::TargetsFailed {
                failures,
                total: targets.len(),
            };
            if error.is_retryable() {
                self.recorder.record(
                    &subject,
                    EventType::Warning,
                    REASON_SYNC_FAILED,
                    &error.to_string(),
                );
            }
            return Err(error);
        }

        self.recorder
            .record(&subject, EventType::Normal, REASON_SYNCED, MESSAGE_SYNCED);
        Ok(SyncOutcome::Synced {
            applied,
            unchanged,
            skipped,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::cache::MemoryCache;
    use crate::controller::dispatch::testing::{pairs, MemoryNamespaces};
    use crate::controller::dispatch::{ExternalError, NamespaceAnnotator, TargetHandler};
    use crate::controller::events::MemoryEventRecorder;
    use crate::controller::key::KeyError;
    use crate::crd::{AnnotationSpec, Target};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Always fails as if the external object did not exist
    struct Unreachable;

    #[async_trait]
    impl TargetHandler for Unreachable {
        async fn apply(
            &self,
            namespace: &str,
            _data: &BTreeMap<String, String>,
        ) -> Result<ApplyOutcome, DispatchError> {
            Err(ExternalError::NotFound {
                kind: "Unreachable".to_string(),
                name: namespace.to_string(),
            }
            .into())
        }
    }

    struct Fixture {
        cache: Arc<MemoryCache<Annotation>>,
        namespaces: Arc<MemoryNamespaces>,
        recorder: Arc<MemoryEventRecorder>,
        reconciler: Reconciler,
    }

    fn fixture(namespaces: MemoryNamespaces) -> Fixture {
        let cache = Arc::new(MemoryCache::default());
        let namespaces = Arc::new(namespaces);
        let recorder = Arc::new(MemoryEventRecorder::default());
        let dispatcher = ActionDispatcher::new()
            .with_handler(
                NamespaceAnnotator::KIND,
                NamespaceAnnotator::new(Arc::<MemoryNamespaces>::clone(&namespaces)),
            )
            .with_handler("unreachable", Unreachable);
        let reconciler = Reconciler::new(
            Arc::<MemoryCache<Annotation>>::clone(&cache),
            dispatcher,
            Arc::<MemoryEventRecorder>::clone(&recorder),
        );
        Fixture {
            cache,
            namespaces,
            recorder,
            reconciler,
        }
    }

    fn annotation(namespace: &str, name: &str, targets: Vec<Target>) -> Annotation {
        let mut annotation = Annotation::new(name, AnnotationSpec { targets });
        annotation.metadata.namespace = Some(namespace.to_string());
        annotation
    }

    #[tokio::test]
    async fn test_sync_merges_namespace_annotations() {
        let f = fixture(MemoryNamespaces::with("team-a", &[]));
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![Target::new("namespace", [("owner", "team-a")])],
        ));

        let outcome = f.reconciler.sync("team-a/policy1").await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                applied: 1,
                unchanged: 0,
                skipped: 0
            }
        );
        assert_eq!(
            f.namespaces.annotations("team-a"),
            Some(pairs(&[("owner", "team-a")]))
        );
        assert_eq!(f.recorder.reasons(), vec![REASON_SYNCED]);
    }

    #[tokio::test]
    async fn test_sync_is_idempotent() {
        let f = fixture(MemoryNamespaces::with("team-a", &[("b", "2")]));
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![Target::new("namespace", [("a", "1")])],
        ));

        f.reconciler.sync("team-a/policy1").await.unwrap();
        let after_first = f.namespaces.annotations("team-a");
        let second = f.reconciler.sync("team-a/policy1").await.unwrap();

        assert_eq!(f.namespaces.annotations("team-a"), after_first);
        assert_eq!(
            second,
            SyncOutcome::Synced {
                applied: 0,
                unchanged: 1,
                skipped: 0
            }
        );
    }

    #[tokio::test]
    async fn test_existing_values_are_never_overwritten() {
        let f = fixture(MemoryNamespaces::with("team-a", &[("a", "0"), ("b", "2")]));
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![Target::new("namespace", [("a", "1")])],
        ));

        f.reconciler.sync("team-a/policy1").await.unwrap();

        assert_eq!(
            f.namespaces.annotations("team-a"),
            Some(pairs(&[("a", "0"), ("b", "2")]))
        );
    }

    #[tokio::test]
    async fn test_missing_record_is_success() {
        let f = fixture(MemoryNamespaces::with("team-a", &[]));
        f.cache.insert(annotation("team-a", "policy1", vec![]));
        f.cache.remove("team-a", "policy1");

        let outcome = f.reconciler.sync("team-a/policy1").await.unwrap();

        assert_eq!(outcome, SyncOutcome::NotFound);
        assert!(f.recorder.events().is_empty());
    }

    #[tokio::test]
    async fn test_malformed_key_is_not_retryable() {
        let f = fixture(MemoryNamespaces::default());

        let err = f.reconciler.sync("a/b/c").await.unwrap_err();

        assert!(matches!(
            err,
            ReconcilerError::InvalidKey(KeyError::InvalidKey(_))
        ));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_unknown_kind_is_skipped_and_reported() {
        let f = fixture(MemoryNamespaces::with("team-a", &[]));
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![
                Target::new("configmap", [("x", "y")]),
                Target::new("Namespace", [("owner", "team-a")]),
            ],
        ));

        let outcome = f.reconciler.sync("team-a/policy1").await.unwrap();

        assert_eq!(
            outcome,
            SyncOutcome::Synced {
                applied: 1,
                unchanged: 0,
                skipped: 1
            }
        );
        assert_eq!(
            f.recorder.reasons(),
            vec![REASON_UNKNOWN_TARGET_KIND, REASON_SYNCED]
        );
        let warning = &f.recorder.events()[0];
        assert_eq!(warning.event_type, EventType::Warning);
        assert!(warning.message.contains("\"configmap\""));
    }

    #[tokio::test]
    async fn test_failed_target_does_not_stop_siblings() {
        let f = fixture(MemoryNamespaces::with("team-a", &[]));
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![
                Target::new("unreachable", [("x", "y")]),
                Target::new("namespace", [("owner", "team-a")]),
            ],
        ));

        let err = f.reconciler.sync("team-a/policy1").await.unwrap_err();

        let ReconcilerError::TargetsFailed { failures, total } = &err else {
            panic!("expected TargetsFailed, got {err:?}");
        };
        assert_eq!(*total, 2);
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].index, 0);
        assert!(err.is_retryable());
        assert_eq!(
            f.namespaces.annotations("team-a"),
            Some(pairs(&[("owner", "team-a")]))
        );
        assert_eq!(f.recorder.reasons(), vec![REASON_SYNC_FAILED]);
    }

    #[tokio::test]
    async fn test_missing_namespace_is_retryable() {
        let f = fixture(MemoryNamespaces::default());
        f.cache.insert(annotation(
            "team-a",
            "policy1",
            vec![Target::new("namespace", [("owner", "team-a")])],
        ));

        let err = f.reconciler.sync("team-a/policy1").await.unwrap_err();

        assert!(err.is_retryable());
    }
}
