//! Read and write access to the external objects targets are applied to.

use async_trait::async_trait;
use kube::api::{Api, PostParams};
use kube::{Resource, ResourceExt};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt::Debug;
use thiserror::Error;

/// Failure talking to the external system
///
/// Every variant is retryable: the object may appear, the conflicting writer
/// may finish, the API server may recover.
#[derive(Debug, Error)]
pub enum ExternalError {
    #[error("{kind} {name:?} not found")]
    NotFound { kind: String, name: String },

    #[error("{kind} {name:?} was modified concurrently")]
    Conflict { kind: String, name: String },

    #[error("{kind} {name:?}: {source}")]
    Api {
        kind: String,
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl ExternalError {
    /// Classify a client error for the object `kind`/`name`
    pub fn from_kube(kind: impl Into<String>, name: impl Into<String>, error: kube::Error) -> Self {
        let (kind, name) = (kind.into(), name.into());
        match error {
            kube::Error::Api(api_err) if api_err.code == 404 => Self::NotFound { kind, name },
            kube::Error::Api(api_err) if api_err.code == 409 => Self::Conflict { kind, name },
            source => Self::Api { kind, name, source },
        }
    }
}

/// Get and replace objects of one type by name
#[async_trait]
pub trait ObjectStore<K>: Send + Sync {
    async fn get(&self, name: &str) -> Result<K, ExternalError>;

    /// Write `obj` back; fails with [`ExternalError::Conflict`] if it changed
    /// since it was read
    async fn replace(&self, obj: &K) -> Result<K, ExternalError>;
}

/// [`ObjectStore`] backed by the Kubernetes API
#[derive(Clone)]
pub struct KubeObjectStore<K> {
    api: Api<K>,
    field_manager: String,
}

impl<K> Debug for KubeObjectStore<K> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KubeObjectStore")
            .field("field_manager", &self.field_manager)
            .finish_non_exhaustive()
    }
}

impl<K> KubeObjectStore<K> {
    pub fn new(api: Api<K>, field_manager: impl Into<String>) -> Self {
        Self {
            api,
            field_manager: field_manager.into(),
        }
    }
}

#[async_trait]
impl<K> ObjectStore<K> for KubeObjectStore<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Serialize + Debug + Send + Sync + 'static,
{
    async fn get(&self, name: &str) -> Result<K, ExternalError> {
        self.api
            .get(name)
            .await
            .map_err(|e| ExternalError::from_kube(K::kind(&()), name, e))
    }

    async fn replace(&self, obj: &K) -> Result<K, ExternalError> {
        let name = obj.name_any();
        let params = PostParams {
            field_manager: Some(self.field_manager.clone()),
            ..PostParams::default()
        };
        self.api
            .replace(&name, &params, obj)
            .await
            .map_err(|e| ExternalError::from_kube(K::kind(&()), name, e))
    }
}
