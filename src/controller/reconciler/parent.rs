//! # Parent Reconciler
//!
//! Entry point of a reconcile pass for one parent kind.
//!
//! A pass fetches the parent, applies spec defaults and initializes its
//! conditions, runs the sub-reconciler chain against a working copy and writes
//! the status back at most once, only if it changed.

use super::diff::json_diff;
use super::types::{
    ObjectStatus, ParentResource, ReconcilerContext, ReconcilerError, SetupContext, SubReconciler,
};
use crate::controller::events::Event;
use crate::controller::stash::Stash;
use crate::observability::metrics;
use crate::store::{kind_of, ObjectKey, ObjectStore};
use kube_runtime::Controller;
use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, info, Instrument};

pub struct ParentReconciler<P: ParentResource> {
    context: ReconcilerContext,
    store: Arc<dyn ObjectStore<P>>,
    reconcilers: Vec<Box<dyn SubReconciler<P>>>,
    in_flight: Mutex<HashSet<ObjectKey>>,
}

impl<P: ParentResource> fmt::Debug for ParentReconciler<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParentReconciler")
            .field("kind", &kind_of::<P>())
            .field("reconcilers", &self.reconcilers.len())
            .finish_non_exhaustive()
    }
}

/// Marks a key as being reconciled until dropped
struct InFlight<'a> {
    keys: &'a Mutex<HashSet<ObjectKey>>,
    key: ObjectKey,
}

impl<'a> InFlight<'a> {
    fn acquire(keys: &'a Mutex<HashSet<ObjectKey>>, key: &ObjectKey) -> Result<Self, ReconcilerError> {
        let mut guard = keys.lock().unwrap_or_else(PoisonError::into_inner);
        if !guard.insert(key.clone()) {
            return Err(ReconcilerError::AlreadyReconciling(key.clone()));
        }
        Ok(Self {
            keys,
            key: key.clone(),
        })
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.keys
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.key);
    }
}

impl<P: ParentResource> ParentReconciler<P> {
    pub fn new(context: ReconcilerContext, reconcilers: Vec<Box<dyn SubReconciler<P>>>) -> Self {
        let store = context.store::<P>();
        Self {
            context,
            store,
            reconcilers,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn context(&self) -> &ReconcilerContext {
        &self.context
    }

    /// Let every sub-reconciler register the watches it depends on
    pub fn setup(&self, controller: Controller<P>, ctx: &SetupContext) -> Controller<P> {
        self.reconcilers
            .iter()
            .fold(controller, |controller, reconciler| reconciler.setup(controller, ctx))
    }

    /// Run one reconcile pass for the parent at `key`
    ///
    /// # Errors
    ///
    /// Returns the first sub-reconciler error, a fetch or status update failure,
    /// or [`ReconcilerError::AlreadyReconciling`] if a pass for `key` is already running.
    pub async fn reconcile(&self, key: &ObjectKey) -> Result<(), ReconcilerError> {
        let span = tracing::info_span!(
            "reconcile",
            resource.kind = %kind_of::<P>(),
            resource.namespace = %key.namespace,
            resource.name = %key.name,
        );
        async move {
            let _in_flight = InFlight::acquire(&self.in_flight, key)?;
            let start = std::time::Instant::now();
            metrics::increment_reconciliations(&kind_of::<P>());

            let result = self.reconcile_parent(key).await;

            metrics::observe_reconciliation_duration(&kind_of::<P>(), start.elapsed().as_secs_f64());
            if let Err(e) = &result {
                metrics::increment_reconciliation_errors(&kind_of::<P>());
                error!("Reconcile failed: {}", e);
            }
            result
        }
        .instrument(span)
        .await
    }

    async fn reconcile_parent(&self, key: &ObjectKey) -> Result<(), ReconcilerError> {
        let original = match self.store.get(key).await {
            Ok(parent) => parent,
            Err(e) if e.is_not_found() => {
                // deleted between enqueue and fetch
                debug!("Parent not found, nothing to do");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut parent = original.clone();
        parent.default_spec();
        parent.status_mut().initialize_conditions();

        if parent.meta().deletion_timestamp.is_some() {
            debug!("Parent is being deleted, skipping");
            return Ok(());
        }

        let result = self.run_chain(&mut parent).await;
        if result.is_ok() {
            let generation = parent.meta().generation;
            parent.status_mut().set_observed_generation(generation);
        }

        let before = original.status().cloned().unwrap_or_default();
        let after = parent.status().cloned().unwrap_or_default();
        if before == after {
            return result;
        }

        info!(diff = %json_diff(&before, &after), "Updating status");
        let regarding = parent.object_ref(&());
        match self.store.update_status(&parent).await {
            Ok(_) => {
                metrics::increment_status_updates(&kind_of::<P>());
                self.context
                    .recorder
                    .record(&regarding, Event::normal("StatusUpdated", "Updated status"))
                    .await;
                result
            }
            Err(e) => {
                error!("Failed to update status: {}", e);
                self.context
                    .recorder
                    .record(
                        &regarding,
                        Event::warning("StatusUpdateFailed", format!("Failed to update status: {e}")),
                    )
                    .await;
                // the chain's own failure wins over the write failure
                result.and(Err(e.into()))
            }
        }
    }

    async fn run_chain(&self, parent: &mut P) -> Result<(), ReconcilerError> {
        let mut stash = Stash::new();
        for reconciler in &self.reconcilers {
            reconciler.reconcile(&mut stash, parent).await?;
        }
        Ok(())
    }
}
