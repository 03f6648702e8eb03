//! # Action Dispatcher
//!
//! Maps the `kind` of a [`Target`](crate::crd::Target) to the handler that
//! applies it to the external system.
//!
//! Handlers are registered explicitly; the set of supported kinds is fixed at
//! startup and can be listed. Kinds are matched after trimming and ignoring
//! ASCII case, so `namespace`, `Namespace` and ` NAMESPACE ` all select the
//! same handler. A kind with no handler is reported as
//! [`DispatchError::UnknownKind`] rather than silently ignored.

mod namespace;
mod store;
#[cfg(test)]
pub(crate) mod testing;

pub use namespace::{merge_annotations, NamespaceAnnotator};
pub use store::{ExternalError, KubeObjectStore, ObjectStore};

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

/// Result of applying one target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    /// The external object was written; `added` keys were new
    Applied { added: usize },
    /// The external object already satisfied the target; nothing was written
    Unchanged,
}

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("no handler registered for target kind {0:?}")]
    UnknownKind(String),

    #[error(transparent)]
    External(#[from] ExternalError),
}

impl DispatchError {
    /// External failures are transient; an unknown kind will not fix itself
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

/// Applies targets of one kind
#[async_trait]
pub trait TargetHandler: Send + Sync {
    /// Apply `data` to the external object selected by `namespace`
    async fn apply(
        &self,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, DispatchError>;
}

/// Registry of target handlers keyed by normalized kind
#[derive(Clone, Default)]
pub struct ActionDispatcher {
    handlers: BTreeMap<String, Arc<dyn TargetHandler>>,
}

impl std::fmt::Debug for ActionDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDispatcher")
            .field("kinds", &self.handlers.keys().collect::<Vec<_>>())
            .finish()
    }
}

fn normalize_kind(kind: &str) -> String {
    kind.trim().to_ascii_lowercase()
}

impl ActionDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`register`](Self::register)
    #[must_use]
    pub fn with_handler(mut self, kind: &str, handler: impl TargetHandler + 'static) -> Self {
        self.register(kind, Arc::new(handler));
        self
    }

    /// Register `handler` for `kind`, returning the handler it replaces
    pub fn register(
        &mut self,
        kind: &str,
        handler: Arc<dyn TargetHandler>,
    ) -> Option<Arc<dyn TargetHandler>> {
        self.handlers.insert(normalize_kind(kind), handler)
    }

    /// Registered kinds in sorted, normalized form
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.handlers.keys().map(String::as_str)
    }

    pub fn supports(&self, kind: &str) -> bool {
        self.handlers.contains_key(&normalize_kind(kind))
    }

    pub async fn dispatch(
        &self,
        kind: &str,
        namespace: &str,
        data: &BTreeMap<String, String>,
    ) -> Result<ApplyOutcome, DispatchError> {
        let Some(handler) = self.handlers.get(&normalize_kind(kind)) else {
            return Err(DispatchError::UnknownKind(kind.to_string()));
        };

        debug!(kind, namespace, keys = data.len(), "dispatch.apply");
        handler.apply(namespace, data).await
    }
}
