//! # Informer Cache
//!
//! One reflector per object kind, started the first time a store for that
//! kind is requested. Cached reads are served from the reflector's store, and
//! an [`OwnerIndex`] fed by the same watch events answers child listings.

use super::{kind_of, KubeObject, ObjectKey};
use crate::controller::index::{OwnerIndex, OwnerKey};
use futures::StreamExt;
use kube::api::Api;
use kube::Client;
use kube_runtime::reflector::{self, ObjectRef, Store};
use kube_runtime::{watcher, WatchStreamExt};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info, warn};

/// Informers shared by every store handed out for a cluster
pub struct KubeCache {
    client: Client,
    watcher_config: watcher::Config,
    informers: Mutex<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>,
}

impl fmt::Debug for KubeCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let informers = self.informers.lock().unwrap_or_else(PoisonError::into_inner).len();
        f.debug_struct("KubeCache")
            .field("informers", &informers)
            .finish_non_exhaustive()
    }
}

impl KubeCache {
    #[must_use]
    pub fn new(client: Client, watcher_config: watcher::Config) -> Self {
        Self {
            client,
            watcher_config,
            informers: Mutex::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn client(&self) -> &Client {
        &self.client
    }

    /// The informer for `K`, starting its watch on first use
    ///
    /// Must be called from within a tokio runtime.
    pub fn informer<K: KubeObject>(&self) -> Arc<Informer<K>> {
        let mut informers = self.informers.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = informers.get(&TypeId::of::<K>()) {
            if let Ok(informer) = Arc::clone(existing).downcast::<Informer<K>>() {
                return informer;
            }
        }

        let (store, writer) = reflector::store::<K>();
        let informer = Arc::new(Informer::new(store));
        let indexer = Arc::clone(&informer);
        let events = reflector::reflector(
            writer,
            watcher::watcher(Api::<K>::all(self.client.clone()), self.watcher_config.clone()),
        )
        .default_backoff();
        info!(kind = %kind_of::<K>(), "Starting informer");
        tokio::spawn(async move {
            events
                .for_each(|event| {
                    match event {
                        Ok(event) => indexer.index(&event),
                        Err(e) => warn!(kind = %kind_of::<K>(), "Informer watch error: {}", e),
                    }
                    futures::future::ready(())
                })
                .await;
            debug!(kind = %kind_of::<K>(), "Informer stopped");
        });

        let erased: Arc<dyn Any + Send + Sync> = Arc::<Informer<K>>::clone(&informer);
        informers.insert(TypeId::of::<K>(), erased);
        informer
    }
}

/// Cached objects of one kind plus their owner index
pub struct Informer<K: KubeObject> {
    store: Store<K>,
    owners: RwLock<OwnerIndex>,
}

impl<K: KubeObject> fmt::Debug for Informer<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Informer")
            .field("kind", &kind_of::<K>())
            .field("objects", &self.store.len())
            .finish()
    }
}

impl<K: KubeObject> Informer<K> {
    #[must_use]
    pub fn new(store: Store<K>) -> Self {
        Self {
            store,
            owners: RwLock::new(OwnerIndex::default()),
        }
    }

    /// Wait until the initial list has been applied
    ///
    /// Returns `false` if the watch task is gone.
    pub async fn wait_until_ready(&self) -> bool {
        self.store.wait_until_ready().await.is_ok()
    }

    /// Keep the owner index in step with the reflector store
    ///
    /// The reflector applies each event to the store before yielding it, so
    /// on `InitDone` the store already holds the relisted state.
    pub fn index(&self, event: &watcher::Event<K>) {
        let mut owners = self.owners.write().unwrap_or_else(PoisonError::into_inner);
        match event {
            watcher::Event::Apply(obj) => owners.insert(obj.meta()),
            watcher::Event::Delete(obj) => owners.remove(obj.meta()),
            watcher::Event::InitDone => {
                let mut relisted = OwnerIndex::default();
                for obj in self.store.state() {
                    relisted.insert(obj.meta());
                }
                *owners = relisted;
            }
            watcher::Event::Init | watcher::Event::InitApply(_) => {}
        }
    }

    #[must_use]
    pub fn get(&self, key: &ObjectKey) -> Option<K> {
        let reference = ObjectRef::<K>::new(&key.name).within(&key.namespace);
        self.store.get(&reference).map(|obj| K::clone(&obj))
    }

    /// Cached objects controlled by `owner`, in name order
    #[must_use]
    pub fn owned_by(&self, owner: &OwnerKey) -> Vec<K> {
        let names = self
            .owners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .lookup(owner);
        names
            .iter()
            .filter_map(|name| self.get(&ObjectKey::new(&owner.namespace, name)))
            .filter(|obj| owner.controls(obj.meta()))
            .collect()
    }
}
