//! # Tracker
//!
//! Records which parents care about which referenced objects, so a change to
//! the reference can be turned back into reconcile requests for the parents.
//!
//! Interest is a lease: [`Tracker::track`] (re)sets its expiry to
//! `now + lease`, and [`Tracker::lookup`] drops expired entries as it reads
//! them. A parent that stops reconciling simply lets its leases lapse.

use crate::store::{KubeObject, ObjectKey};
use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::time::Instant;
use tracing::debug;

/// Identity of a referenced object: API group, kind, namespace and name
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TrackKey {
    pub group: String,
    pub kind: String,
    pub key: ObjectKey,
}

impl TrackKey {
    pub fn new(group: impl Into<String>, kind: impl Into<String>, key: ObjectKey) -> Self {
        Self {
            group: group.into(),
            kind: kind.into(),
            key,
        }
    }

    /// Key for the object of kind `K` at `key`
    #[must_use]
    pub fn of<K: KubeObject>(key: ObjectKey) -> Self {
        Self::new(K::group(&()), K::kind(&()), key)
    }
}

impl fmt::Display for TrackKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.group.is_empty() {
            write!(f, "{} {}", self.kind, self.key)
        } else {
            write!(f, "{}.{} {}", self.kind, self.group, self.key)
        }
    }
}

pub trait Tracker: Send + Sync + fmt::Debug {
    /// Register (or refresh) `watcher`'s interest in `reference`
    fn track(&self, reference: TrackKey, watcher: ObjectKey);

    /// Watchers whose interest in `reference` has not expired
    fn lookup(&self, reference: &TrackKey) -> Vec<ObjectKey>;
}

/// Mutex-guarded lease table
///
/// Tracking is cheap next to a reconcile pass, so a single lock over the whole
/// table is enough.
#[derive(Debug)]
pub struct LeaseTracker {
    lease: Duration,
    watchers: Mutex<HashMap<TrackKey, HashMap<ObjectKey, Instant>>>,
}

impl LeaseTracker {
    #[must_use]
    pub fn new(lease: Duration) -> Self {
        Self {
            lease,
            watchers: Mutex::new(HashMap::new()),
        }
    }
}

impl Tracker for LeaseTracker {
    fn track(&self, reference: TrackKey, watcher: ObjectKey) {
        let expiry = Instant::now() + self.lease;
        debug!(reference = %reference, watcher = %watcher, "tracking reference");
        self.watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(reference)
            .or_default()
            .insert(watcher, expiry);
    }

    fn lookup(&self, reference: &TrackKey) -> Vec<ObjectKey> {
        let now = Instant::now();
        let mut watchers = self.watchers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(leases) = watchers.get_mut(reference) else {
            return Vec::new();
        };

        leases.retain(|_, expiry| *expiry >= now);
        let mut live: Vec<ObjectKey> = leases.keys().cloned().collect();
        if leases.is_empty() {
            watchers.remove(reference);
        }
        live.sort();
        live
    }
}
