//! # Owner Index
//!
//! Maps a controlling owner to the names of the objects it controls, so a
//! child reconciler can list its children without scanning the namespace.

use crate::store::KubeObject;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, OwnerReference};
use kube::Resource;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

/// Identity of a controlling owner as seen from its children
///
/// Owner references are namespace-local, so the namespace is the child's.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerKey {
    pub group: String,
    pub kind: String,
    pub namespace: String,
    pub name: String,
}

impl OwnerKey {
    pub fn of<P: KubeObject>(parent: &P) -> Self {
        let meta = parent.meta();
        Self {
            group: P::group(&()).into_owned(),
            kind: P::kind(&()).into_owned(),
            namespace: meta.namespace.clone().unwrap_or_default(),
            name: meta.name.clone().unwrap_or_default(),
        }
    }

    #[must_use]
    pub fn from_owner_reference(namespace: &str, owner: &OwnerReference) -> Self {
        Self {
            group: api_group(&owner.api_version).to_string(),
            kind: owner.kind.clone(),
            namespace: namespace.to_string(),
            name: owner.name.clone(),
        }
    }

    /// Whether `meta` names this owner as its controller
    #[must_use]
    pub fn controls(&self, meta: &ObjectMeta) -> bool {
        controller_key(meta).as_ref() == Some(self)
    }
}

impl fmt::Display for OwnerKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{} {}/{}", self.kind, self.namespace, self.name)
        } else {
            write!(f, "{}.{} {}/{}", self.kind, self.group, self.namespace, self.name)
        }
    }
}

/// The owner reference marked as controller, if any
#[must_use]
pub fn controller_of(meta: &ObjectMeta) -> Option<&OwnerReference> {
    meta.owner_references
        .as_ref()?
        .iter()
        .find(|r| r.controller == Some(true))
}

#[must_use]
pub fn controller_key(meta: &ObjectMeta) -> Option<OwnerKey> {
    let namespace = meta.namespace.as_deref().unwrap_or_default();
    controller_of(meta).map(|owner| OwnerKey::from_owner_reference(namespace, owner))
}

/// Whether the object described by `meta` is controlled by `parent`
///
/// Matches on UID, so a recreated parent with the same name does not adopt
/// children of its predecessor.
pub fn is_controlled_by<P: Resource>(meta: &ObjectMeta, parent: &P) -> bool {
    match (controller_of(meta), parent.meta().uid.as_deref()) {
        (Some(owner), Some(uid)) => owner.uid == uid,
        _ => false,
    }
}

fn api_group(api_version: &str) -> &str {
    api_version
        .rsplit_once('/')
        .map_or("", |(group, _version)| group)
}

/// Controller owner to controlled object names, for one object kind
#[derive(Debug, Default)]
pub struct OwnerIndex {
    entries: HashMap<OwnerKey, BTreeSet<String>>,
    /// Current controller of each indexed object, by namespace and name
    controllers: HashMap<(String, String), OwnerKey>,
}

impl OwnerIndex {
    /// Index the latest version of an object, dropping any previous owner
    pub fn insert(&mut self, meta: &ObjectMeta) {
        self.remove(meta);
        let (Some(owner), Some(name)) = (controller_key(meta), meta.name.clone()) else {
            return;
        };
        let namespace = owner.namespace.clone();
        self.entries.entry(owner.clone()).or_default().insert(name.clone());
        self.controllers.insert((namespace, name), owner);
    }

    pub fn remove(&mut self, meta: &ObjectMeta) {
        let Some(name) = meta.name.clone() else {
            return;
        };
        let namespace = meta.namespace.clone().unwrap_or_default();
        let Some(owner) = self.controllers.remove(&(namespace, name.clone())) else {
            return;
        };
        if let Some(names) = self.entries.get_mut(&owner) {
            names.remove(&name);
            if names.is_empty() {
                self.entries.remove(&owner);
            }
        }
    }

    /// Names controlled by `owner`, in name order
    #[must_use]
    pub fn lookup(&self, owner: &OwnerKey) -> Vec<String> {
        self.entries
            .get(owner)
            .map(|names| names.iter().cloned().collect())
            .unwrap_or_default()
    }
}
