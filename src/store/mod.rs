//! # Object Store
//!
//! Typed access to cluster objects for the reconciliation engine.
//!
//! Reconcilers never talk to `kube::Api` directly. They ask an [`ObjectClient`]
//! for an [`ObjectStore`] of the kind they need, which is backed either by the
//! API server through an informer cache ([`KubeStore`], [`KubeCache`]) or
//! by the in-memory fake used in tests ([`InMemoryCluster`]).

mod api;
mod cache;
mod memory;

pub use api::KubeStore;
pub use cache::{Informer, KubeCache};
pub use memory::{InMemoryCluster, RecordedAction, Verb};

use crate::controller::index::OwnerKey;
use async_trait::async_trait;
use k8s_openapi::NamespaceResourceScope;
use kube::Resource;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Any namespaced object the engine can read and write
pub trait KubeObject:
    Resource<DynamicType = (), Scope = NamespaceResourceScope>
    + Clone
    + fmt::Debug
    + Serialize
    + DeserializeOwned
    + Send
    + Sync
    + 'static
{
}

impl<K> KubeObject for K where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>
        + Clone
        + fmt::Debug
        + Serialize
        + DeserializeOwned
        + Send
        + Sync
        + 'static
{
}

/// Namespace and name of an object
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectKey {
    pub namespace: String,
    pub name: String,
}

impl ObjectKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    pub fn of<K: Resource>(obj: &K) -> Self {
        let meta = obj.meta();
        Self {
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Errors returned by object stores
///
/// The first three variants are the outcomes reconcilers branch on; everything
/// else is an opaque failure that is surfaced for retry.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{kind} \"{name}\" not found")]
    NotFound { kind: String, name: String },
    #[error("{kind} \"{name}\" already exists")]
    AlreadyExists { kind: String, name: String },
    #[error("conflict writing {kind} \"{name}\": {message}")]
    Conflict {
        kind: String,
        name: String,
        message: String,
    },
    #[error(transparent)]
    Kube(#[from] kube::Error),
    #[error("{kind} cache has not synced")]
    CacheNotSynced { kind: String },
    #[error("invalid object: {0}")]
    Invalid(String),
    #[error("failed to (de)serialize object: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Failure injected by a test reactor
    #[error("{0}")]
    Injected(String),
}

impl StoreError {
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound { .. })
    }

    #[must_use]
    pub fn is_already_exists(&self) -> bool {
        matches!(self, StoreError::AlreadyExists { .. })
    }

    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict { .. })
    }

    /// Name of the object that blocked a create
    #[must_use]
    pub fn already_exists_name(&self) -> Option<&str> {
        match self {
            StoreError::AlreadyExists { name, .. } => Some(name),
            _ => None,
        }
    }

    /// Classify an API server error for the object `kind`/`name`
    pub(crate) fn from_kube(err: kube::Error, kind: &str, name: &str) -> Self {
        match err {
            kube::Error::Api(ref api_err) if api_err.code == 404 => StoreError::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
            },
            kube::Error::Api(ref api_err)
                if api_err.code == 409 && api_err.reason == "AlreadyExists" =>
            {
                StoreError::AlreadyExists {
                    kind: kind.to_string(),
                    name: name.to_string(),
                }
            }
            kube::Error::Api(ref api_err) if api_err.code == 409 => StoreError::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                message: api_err.message.clone(),
            },
            other => StoreError::Kube(other),
        }
    }
}

/// Read and write access to objects of one kind
#[async_trait]
pub trait ObjectStore<K: KubeObject>: Send + Sync {
    /// Read through the (possibly stale) cache
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Read straight from the source of truth, bypassing any cache
    async fn get_direct(&self, key: &ObjectKey) -> Result<K, StoreError>;

    /// Objects in the owner's namespace whose controller is `owner`
    async fn list_owned(&self, owner: &OwnerKey) -> Result<Vec<K>, StoreError>;

    async fn create(&self, obj: &K) -> Result<K, StoreError>;

    async fn update(&self, obj: &K) -> Result<K, StoreError>;

    async fn delete(&self, obj: &K) -> Result<(), StoreError>;

    /// Replace the status subresource, leaving spec and metadata untouched
    async fn update_status(&self, obj: &K) -> Result<K, StoreError>;
}

/// Source of typed object stores
#[derive(Clone)]
pub enum ObjectClient {
    Kube(Arc<KubeCache>),
    InMemory(Arc<InMemoryCluster>),
}

impl fmt::Debug for ObjectClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ObjectClient::Kube(_) => f.write_str("ObjectClient::Kube"),
            ObjectClient::InMemory(_) => f.write_str("ObjectClient::InMemory"),
        }
    }
}

impl ObjectClient {
    #[must_use]
    pub fn store<K: KubeObject>(&self) -> Arc<dyn ObjectStore<K>> {
        match self {
            ObjectClient::Kube(cache) => {
                Arc::new(KubeStore::<K>::new(cache.client().clone(), cache.informer::<K>()))
            }
            ObjectClient::InMemory(cluster) => Arc::clone(cluster).store::<K>(),
        }
    }
}

/// Kind name used in logs, events and errors
pub fn kind_of<K: KubeObject>() -> String {
    K::kind(&()).into_owned()
}
