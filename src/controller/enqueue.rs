//! # Enqueue
//!
//! Turns "an object of kind `K` changed" into reconcile requests for every
//! parent that is tracking it.

use crate::controller::tracker::{TrackKey, Tracker};
use crate::observability::metrics;
use crate::store::{kind_of, KubeObject, ObjectKey};
use kube_runtime::reflector::ObjectRef;
use std::sync::Arc;
use tracing::debug;

/// Mapper for [`kube_runtime::Controller::watches`]
///
/// Every watcher with a live lease on the changed object is enqueued as a `P`.
pub fn enqueue_tracked<K, P>(tracker: Arc<dyn Tracker>) -> impl Fn(K) -> Vec<ObjectRef<P>> + Send + Sync + 'static
where
    K: KubeObject,
    P: KubeObject,
{
    move |obj: K| {
        let reference = TrackKey::of::<K>(ObjectKey::of(&obj));
        let watchers = tracker.lookup(&reference);
        if !watchers.is_empty() {
            debug!(reference = %reference, count = watchers.len(), "Enqueueing tracking parents");
            metrics::increment_tracked_enqueues(&kind_of::<K>(), watchers.len());
        }
        watchers
            .into_iter()
            .map(|watcher| ObjectRef::new(&watcher.name).within(&watcher.namespace))
            .collect()
    }
}
