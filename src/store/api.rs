//! # API Server Store
//!
//! [`ObjectStore`] over `kube::Api`. Cached reads and owner listings are served
//! by the kind's [`Informer`]; direct reads and all writes go to the API server.

use super::{kind_of, Informer, KubeObject, ObjectKey, ObjectStore, StoreError};
use crate::constants::{CACHE_SYNC_TIMEOUT_SECS, CONTROLLER_NAME};
use crate::controller::index::OwnerKey;
use async_trait::async_trait;
use kube::api::{Api, DeleteParams, PostParams};
use kube::Client;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

pub struct KubeStore<K: KubeObject> {
    client: Client,
    informer: Arc<Informer<K>>,
}

impl<K: KubeObject> fmt::Debug for KubeStore<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("informer", &self.informer)
            .finish_non_exhaustive()
    }
}

impl<K: KubeObject> KubeStore<K> {
    #[must_use]
    pub fn new(client: Client, informer: Arc<Informer<K>>) -> Self {
        Self { client, informer }
    }

    /// Wait for the informer's initial list
    async fn synced(&self) -> Result<(), StoreError> {
        let timeout = Duration::from_secs(CACHE_SYNC_TIMEOUT_SECS);
        match tokio::time::timeout(timeout, self.informer.wait_until_ready()).await {
            Ok(true) => Ok(()),
            Ok(false) | Err(_) => {
                warn!(kind = %kind_of::<K>(), "Informer cache is not synced");
                Err(StoreError::CacheNotSynced { kind: kind_of::<K>() })
            }
        }
    }

    fn api(&self, namespace: &str) -> Api<K> {
        Api::namespaced(self.client.clone(), namespace)
    }

    fn post_params() -> PostParams {
        PostParams {
            field_manager: Some(CONTROLLER_NAME.to_string()),
            ..PostParams::default()
        }
    }
}

fn name_of<K: KubeObject>(obj: &K) -> String {
    let meta = obj.meta();
    meta.name
        .clone()
        .or_else(|| meta.generate_name.clone())
        .unwrap_or_default()
}

#[async_trait]
impl<K: KubeObject> ObjectStore<K> for KubeStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.synced().await?;
        self.informer.get(key).ok_or_else(|| StoreError::NotFound {
            kind: kind_of::<K>(),
            name: key.name.clone(),
        })
    }

    async fn get_direct(&self, key: &ObjectKey) -> Result<K, StoreError> {
        self.api(&key.namespace)
            .get(&key.name)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &key.name))
    }

    async fn list_owned(&self, owner: &OwnerKey) -> Result<Vec<K>, StoreError> {
        self.synced().await?;
        Ok(self.informer.owned_by(owner))
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        self.api(&namespace)
            .create(&Self::post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &name_of(obj)))
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        self.api(&key.namespace)
            .replace(&key.name, &Self::post_params(), obj)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &key.name))
    }

    async fn delete(&self, obj: &K) -> Result<(), StoreError> {
        let key = ObjectKey::of(obj);
        self.api(&key.namespace)
            .delete(&key.name, &DeleteParams::background())
            .await
            .map(|_| ())
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &key.name))
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let key = ObjectKey::of(obj);
        let data = serde_json::to_vec(obj)?;
        self.api(&key.namespace)
            .replace_status(&key.name, &Self::post_params(), data)
            .await
            .map_err(|e| StoreError::from_kube(e, &kind_of::<K>(), &key.name))
    }
}
