//! # In-Memory Cluster
//!
//! A fake API server for exercising reconcilers without a cluster.
//!
//! Objects are stored as JSON per kind. The cluster assigns UIDs, resource
//! versions and `generateName` suffixes (`<prefix>001`, `<prefix>002`, ...),
//! maintains an owner index, logs every action it serves, and can be told to
//! fail specific verbs. Objects seeded with [`InMemoryCluster::seed_uncached`]
//! exist for direct reads and name collisions but are invisible to cached
//! reads and listings, modelling an informer that has not caught up.

use super::{kind_of, KubeObject, ObjectClient, ObjectKey, ObjectStore, StoreError};
use crate::controller::index::{OwnerIndex, OwnerKey};
use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::marker::PhantomData;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Get,
    List,
    Create,
    Update,
    Delete,
    UpdateStatus,
}

impl Verb {
    #[must_use]
    pub fn is_write(self) -> bool {
        !matches!(self, Verb::Get | Verb::List)
    }
}

/// A request served (or refused) by the cluster
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedAction {
    pub verb: Verb,
    pub kind: String,
    pub key: ObjectKey,
}

#[derive(Debug)]
struct Reactor {
    verb: Verb,
    kind: String,
    message: String,
}

#[derive(Debug, Default)]
struct ClusterState {
    objects: HashMap<String, BTreeMap<ObjectKey, Value>>,
    uncached: HashMap<String, BTreeMap<ObjectKey, Value>>,
    owners: HashMap<String, OwnerIndex>,
    generated_names: u32,
    resource_version: u64,
    reactors: Vec<Reactor>,
    actions: Vec<RecordedAction>,
}

impl ClusterState {
    fn record(&mut self, verb: Verb, kind: &str, key: &ObjectKey) -> Result<(), StoreError> {
        self.actions.push(RecordedAction {
            verb,
            kind: kind.to_string(),
            key: key.clone(),
        });
        match self
            .reactors
            .iter()
            .find(|r| r.verb == verb && r.kind == kind)
        {
            Some(reactor) => Err(StoreError::Injected(reactor.message.clone())),
            None => Ok(()),
        }
    }

    fn next_resource_version(&mut self) -> String {
        self.resource_version += 1;
        self.resource_version.to_string()
    }

    fn cached(&self, type_key: &str, key: &ObjectKey) -> Option<&Value> {
        self.objects.get(type_key)?.get(key)
    }

    fn direct(&self, type_key: &str, key: &ObjectKey) -> Option<&Value> {
        self.cached(type_key, key)
            .or_else(|| self.uncached.get(type_key)?.get(key))
    }

    fn store(&mut self, type_key: &str, key: ObjectKey, meta: &ObjectMeta, value: Value) {
        self.owners
            .entry(type_key.to_string())
            .or_default()
            .insert(meta);
        self.objects
            .entry(type_key.to_string())
            .or_default()
            .insert(key, value);
    }

    fn forget(&mut self, type_key: &str, key: &ObjectKey) -> Result<Option<Value>, StoreError> {
        let Some(removed) = self
            .objects
            .get_mut(type_key)
            .and_then(|objects| objects.remove(key))
        else {
            return Ok(None);
        };
        let meta: ObjectMeta = serde_json::from_value(removed["metadata"].clone())?;
        if let Some(index) = self.owners.get_mut(type_key) {
            index.remove(&meta);
        }
        Ok(Some(removed))
    }
}

#[derive(Debug, Default)]
pub struct InMemoryCluster {
    state: Mutex<ClusterState>,
}

impl InMemoryCluster {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// An [`ObjectClient`] serving from this cluster
    #[must_use]
    pub fn client(self: &Arc<Self>) -> ObjectClient {
        ObjectClient::InMemory(Arc::clone(self))
    }

    pub(crate) fn store<K: KubeObject>(self: Arc<Self>) -> Arc<dyn ObjectStore<K>> {
        Arc::new(MemoryStore::<K> {
            cluster: self,
            _kind: PhantomData,
        })
    }

    fn lock(&self) -> MutexGuard<'_, ClusterState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert an object as if it had been created earlier, without logging an action
    pub fn seed<K: KubeObject>(&self, obj: K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let (key, obj, value) = prepare_seed(&mut state, obj)?;
        state.store(&type_key::<K>(), key, obj.meta(), value);
        Ok(obj)
    }

    /// Insert an object that only direct reads can see
    pub fn seed_uncached<K: KubeObject>(&self, obj: K) -> Result<K, StoreError> {
        let mut state = self.lock();
        let (key, obj, value) = prepare_seed(&mut state, obj)?;
        state
            .uncached
            .entry(type_key::<K>())
            .or_default()
            .insert(key, value);
        Ok(obj)
    }

    /// Make every `verb` request against `kind` fail with `message`
    pub fn fail_on(&self, verb: Verb, kind: &str, message: &str) {
        self.lock().reactors.push(Reactor {
            verb,
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }

    pub fn clear_reactors(&self) {
        self.lock().reactors.clear();
    }

    #[must_use]
    pub fn actions(&self) -> Vec<RecordedAction> {
        self.lock().actions.clone()
    }

    /// Create, update, delete and status update requests, in order
    #[must_use]
    pub fn writes(&self) -> Vec<RecordedAction> {
        self.lock()
            .actions
            .iter()
            .filter(|a| a.verb.is_write())
            .cloned()
            .collect()
    }

    pub fn clear_actions(&self) {
        self.lock().actions.clear();
    }

    /// Current state of an object, without logging an action
    #[must_use]
    pub fn get_object<K: KubeObject>(&self, key: &ObjectKey) -> Option<K> {
        let state = self.lock();
        let value = state.direct(&type_key::<K>(), key)?.clone();
        serde_json::from_value(value).ok()
    }

    /// Every visible object of a kind in a namespace, in name order
    #[must_use]
    pub fn list_objects<K: KubeObject>(&self, namespace: &str) -> Vec<K> {
        let state = self.lock();
        state
            .objects
            .get(&type_key::<K>())
            .map(|objects| {
                objects
                    .iter()
                    .filter(|(key, _)| key.namespace == namespace)
                    .filter_map(|(_, value)| serde_json::from_value(value.clone()).ok())
                    .collect()
            })
            .unwrap_or_default()
    }
}

fn type_key<K: KubeObject>() -> String {
    let group = K::group(&());
    if group.is_empty() {
        K::kind(&()).into_owned()
    } else {
        format!("{}.{group}", K::kind(&()))
    }
}

fn prepare_seed<K: KubeObject>(
    state: &mut ClusterState,
    mut obj: K,
) -> Result<(ObjectKey, K, Value), StoreError> {
    let key = ObjectKey::of(&obj);
    if key.name.is_empty() {
        return Err(StoreError::Invalid("seeded objects need a name".to_string()));
    }
    let resource_version = state.next_resource_version();
    let meta = obj.meta_mut();
    meta.uid
        .get_or_insert_with(|| uuid::Uuid::new_v4().to_string());
    meta.resource_version = Some(resource_version);
    meta.generation.get_or_insert(1);
    let value = serde_json::to_value(&obj)?;
    Ok((key, obj, value))
}

/// Everything except metadata and status
fn body(value: &Value) -> Value {
    let mut body = value.clone();
    if let Some(map) = body.as_object_mut() {
        map.remove("metadata");
        map.remove("status");
    }
    body
}

fn check_resource_version(
    kind: &str,
    key: &ObjectKey,
    stored: &Value,
    meta: &ObjectMeta,
) -> Result<(), StoreError> {
    let stored_version = stored
        .pointer("/metadata/resourceVersion")
        .and_then(Value::as_str);
    match meta.resource_version.as_deref() {
        Some(requested) if Some(requested) != stored_version => Err(StoreError::Conflict {
            kind: kind.to_string(),
            name: key.name.clone(),
            message: "the object has been modified; please apply your changes to the latest version and try again".to_string(),
        }),
        _ => Ok(()),
    }
}

struct MemoryStore<K> {
    cluster: Arc<InMemoryCluster>,
    _kind: PhantomData<fn() -> K>,
}

impl<K: KubeObject> MemoryStore<K> {
    fn not_found(key: &ObjectKey) -> StoreError {
        StoreError::NotFound {
            kind: kind_of::<K>(),
            name: key.name.clone(),
        }
    }
}

#[async_trait]
impl<K: KubeObject> ObjectStore<K> for MemoryStore<K> {
    async fn get(&self, key: &ObjectKey) -> Result<K, StoreError> {
        let mut state = self.cluster.lock();
        state.record(Verb::Get, &kind_of::<K>(), key)?;
        let value = state
            .cached(&type_key::<K>(), key)
            .cloned()
            .ok_or_else(|| Self::not_found(key))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn get_direct(&self, key: &ObjectKey) -> Result<K, StoreError> {
        let mut state = self.cluster.lock();
        state.record(Verb::Get, &kind_of::<K>(), key)?;
        let value = state
            .direct(&type_key::<K>(), key)
            .cloned()
            .ok_or_else(|| Self::not_found(key))?;
        Ok(serde_json::from_value(value)?)
    }

    async fn list_owned(&self, owner: &OwnerKey) -> Result<Vec<K>, StoreError> {
        let mut state = self.cluster.lock();
        let scope = ObjectKey::new(owner.namespace.clone(), owner.name.clone());
        state.record(Verb::List, &kind_of::<K>(), &scope)?;

        let type_key = type_key::<K>();
        let names = state
            .owners
            .get(&type_key)
            .map(|index| index.lookup(owner))
            .unwrap_or_default();
        names
            .into_iter()
            .filter_map(|name| {
                let key = ObjectKey::new(owner.namespace.clone(), name);
                state.cached(&type_key, &key).cloned()
            })
            .map(|value| serde_json::from_value(value).map_err(StoreError::from))
            .collect()
    }

    async fn create(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let type_key = type_key::<K>();
        let mut state = self.cluster.lock();

        let mut obj = obj.clone();
        let namespace = obj.meta().namespace.clone().unwrap_or_default();
        let name = match obj.meta().name.clone().filter(|n| !n.is_empty()) {
            Some(name) => name,
            None => {
                let Some(prefix) = obj.meta().generate_name.clone() else {
                    return Err(StoreError::Invalid(
                        "name or generateName is required".to_string(),
                    ));
                };
                state.generated_names += 1;
                format!("{prefix}{:03}", state.generated_names)
            }
        };
        let key = ObjectKey::new(namespace, name);
        state.record(Verb::Create, &kind, &key)?;

        if state.direct(&type_key, &key).is_some() {
            return Err(StoreError::AlreadyExists {
                kind,
                name: key.name,
            });
        }

        let resource_version = state.next_resource_version();
        let meta = obj.meta_mut();
        meta.name = Some(key.name.clone());
        meta.uid = Some(uuid::Uuid::new_v4().to_string());
        meta.resource_version = Some(resource_version);
        meta.generation = Some(1);

        let value = serde_json::to_value(&obj)?;
        state.store(&type_key, key, obj.meta(), value);
        Ok(obj)
    }

    async fn update(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let type_key = type_key::<K>();
        let key = ObjectKey::of(obj);
        let mut state = self.cluster.lock();
        state.record(Verb::Update, &kind, &key)?;

        let stored = state
            .cached(&type_key, &key)
            .cloned()
            .ok_or_else(|| Self::not_found(&key))?;
        check_resource_version(&kind, &key, &stored, obj.meta())?;
        let stored_meta: ObjectMeta = serde_json::from_value(stored["metadata"].clone())?;

        let mut obj = obj.clone();
        let resource_version = state.next_resource_version();
        let meta = obj.meta_mut();
        meta.uid.clone_from(&stored_meta.uid);
        meta.resource_version = Some(resource_version);
        meta.generation = stored_meta.generation;

        let mut value = serde_json::to_value(&obj)?;
        if body(&value) != body(&stored) {
            let generation = stored_meta.generation.unwrap_or_default() + 1;
            value["metadata"]["generation"] = Value::from(generation);
        }
        // status belongs to the status subresource
        if let Some(map) = value.as_object_mut() {
            match stored.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }

        let updated: K = serde_json::from_value(value.clone())?;
        state.store(&type_key, key, updated.meta(), value);
        Ok(updated)
    }

    async fn delete(&self, obj: &K) -> Result<(), StoreError> {
        let key = ObjectKey::of(obj);
        let mut state = self.cluster.lock();
        state.record(Verb::Delete, &kind_of::<K>(), &key)?;
        match state.forget(&type_key::<K>(), &key)? {
            Some(_) => Ok(()),
            None => Err(Self::not_found(&key)),
        }
    }

    async fn update_status(&self, obj: &K) -> Result<K, StoreError> {
        let kind = kind_of::<K>();
        let type_key = type_key::<K>();
        let key = ObjectKey::of(obj);
        let mut state = self.cluster.lock();
        state.record(Verb::UpdateStatus, &kind, &key)?;

        let mut stored = state
            .cached(&type_key, &key)
            .cloned()
            .ok_or_else(|| Self::not_found(&key))?;
        check_resource_version(&kind, &key, &stored, obj.meta())?;

        let incoming = serde_json::to_value(obj)?;
        let resource_version = state.next_resource_version();
        if let Some(map) = stored.as_object_mut() {
            match incoming.get("status") {
                Some(status) => map.insert("status".to_string(), status.clone()),
                None => map.remove("status"),
            };
        }
        stored["metadata"]["resourceVersion"] = Value::from(resource_version);

        let updated: K = serde_json::from_value(stored.clone())?;
        state
            .objects
            .entry(type_key)
            .or_default()
            .insert(key, stored);
        Ok(updated)
    }
}
