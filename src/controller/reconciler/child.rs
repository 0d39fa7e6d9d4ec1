//! # Child Reconciler
//!
//! Manages the single child of one kind that a parent controls.
//!
//! Each pass lists the children the parent controls, deletes all of them if
//! there is more than one, then creates, updates or deletes toward the desired
//! child and reflects the outcome onto the parent's status. A create that
//! collides with an existing object is resolved with an uncached read: if the
//! blocker is ours the pass fails for retry, otherwise the collision is
//! reported on the parent and the foreign object is left alone.

use super::diff::json_diff;
use super::types::{
    ParentResource, ReconcilerContext, ReconcilerError, SetupContext, SubReconciler,
};
use crate::controller::events::{Event, EventRecorder};
use crate::controller::index::{is_controlled_by, OwnerKey};
use crate::controller::stash::Stash;
use crate::observability::metrics;
use crate::store::{kind_of, KubeObject, ObjectKey, ObjectStore};
use async_trait::async_trait;
use kube::api::Api;
use kube_runtime::Controller;
use serde_json::Value;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::{debug, error, info};

/// Resource-specific behavior of a [`ChildReconciler`]
#[async_trait]
pub trait ChildStrategy<P: ParentResource, C: KubeObject>: Send + Sync {
    /// Watches beyond the owned child kind, which is always watched
    fn setup(&self, controller: Controller<P>, _ctx: &SetupContext) -> Controller<P> {
        controller
    }

    /// The child `parent` should have, or `None` if it should have none
    async fn desired_child(&self, stash: &Stash, parent: &P) -> Result<Option<C>, ReconcilerError>;

    /// Copy the child's observed state onto the parent's status
    ///
    /// Called after every pass except one that failed because our own earlier
    /// create is not visible yet. `child` is `None` when there is no child or
    /// the pass failed.
    fn reflect_child_status_on_parent(
        &self,
        parent: &mut P,
        child: Option<&C>,
        err: Option<&ReconcilerError>,
    );

    /// Copy server-assigned fields from the live child onto the desired one
    fn harmonize_immutable_fields(&self, _current: &C, _desired: &mut C) {}

    /// Apply the meaningful fields of `desired` onto a copy of the live child
    fn merge_before_update(&self, current: &mut C, desired: &C);

    /// Whether two children agree on every field this strategy manages
    fn semantic_equals(&self, a: &C, b: &C) -> bool;

    /// Representation of a child for logs
    fn sanitize(&self, child: &C) -> Value {
        serde_json::to_value(child).unwrap_or(Value::Null)
    }
}

pub struct ChildReconciler<P, C, S> {
    strategy: S,
    store: Arc<dyn ObjectStore<C>>,
    recorder: Arc<dyn EventRecorder>,
    _parent: PhantomData<fn(P)>,
}

impl<P, C, S> fmt::Debug for ChildReconciler<P, C, S>
where
    C: KubeObject,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildReconciler")
            .field("child", &kind_of::<C>())
            .finish_non_exhaustive()
    }
}

impl<P, C, S> ChildReconciler<P, C, S>
where
    P: ParentResource,
    C: KubeObject,
    S: ChildStrategy<P, C>,
{
    pub fn new(ctx: &ReconcilerContext, strategy: S) -> Self {
        Self {
            strategy,
            store: ctx.store::<C>(),
            recorder: Arc::clone(&ctx.recorder),
            _parent: PhantomData,
        }
    }

    async fn record(&self, parent: &P, event: Event) {
        self.recorder.record(&parent.object_ref(&()), event).await;
    }

    async fn delete_child(&self, parent: &P, child: &C) -> Result<(), ReconcilerError> {
        let kind = kind_of::<C>();
        let name = child.meta().name.clone().unwrap_or_default();
        match self.store.delete(child).await {
            Ok(()) => {
                metrics::increment_child_operations(&kind, "delete");
                self.record(parent, Event::normal("Deleted", format!("Deleted {kind} \"{name}\"")))
                    .await;
                Ok(())
            }
            Err(e) => {
                error!(child.kind = %kind, child.name = %name, "Unable to delete child: {}", e);
                self.record(
                    parent,
                    Event::warning("DeleteFailed", format!("Failed to delete {kind} \"{name}\": {e}")),
                )
                .await;
                Err(e.into())
            }
        }
    }

    async fn reconcile_child(&self, stash: &Stash, parent: &P) -> Result<Option<C>, ReconcilerError> {
        let kind = kind_of::<C>();
        let mut children = self.store.list_owned(&OwnerKey::of(parent)).await?;

        let actual = if children.len() > 1 {
            // more than one child is corrupt state; start from a clean slate
            for extra in &children {
                info!(child.kind = %kind, child = %self.strategy.sanitize(extra), "Deleting extra child");
                self.delete_child(parent, extra).await?;
            }
            None
        } else {
            children.pop()
        };

        let Some(mut desired) = self.strategy.desired_child(stash, parent).await? else {
            if let Some(actual) = actual {
                info!(child.kind = %kind, child = %self.strategy.sanitize(&actual), "Deleting unwanted child");
                self.delete_child(parent, &actual).await?;
            }
            return Ok(None);
        };
        let owner = parent
            .controller_owner_ref(&())
            .ok_or_else(|| ReconcilerError::MissingUid(ObjectKey::of(parent)))?;
        desired.meta_mut().owner_references = Some(vec![owner]);

        let Some(actual) = actual else {
            info!(child.kind = %kind, child = %self.strategy.sanitize(&desired), "Creating child");
            return match self.store.create(&desired).await {
                Ok(created) => {
                    let name = created.meta().name.clone().unwrap_or_default();
                    metrics::increment_child_operations(&kind, "create");
                    self.record(parent, Event::normal("Created", format!("Created {kind} \"{name}\"")))
                        .await;
                    Ok(Some(created))
                }
                Err(e) => {
                    let meta = desired.meta();
                    let name = meta.name.as_deref().or(meta.generate_name.as_deref()).unwrap_or_default();
                    error!(child.kind = %kind, child.name = %name, "Unable to create child: {}", e);
                    self.record(
                        parent,
                        Event::warning(
                            "CreationFailed",
                            format!("Failed to create {kind} \"{name}\": {e}"),
                        ),
                    )
                    .await;
                    Err(e.into())
                }
            };
        };

        self.strategy.harmonize_immutable_fields(&actual, &mut desired);
        if self.strategy.semantic_equals(&desired, &actual) {
            debug!(child.kind = %kind, "Child is unchanged");
            return Ok(Some(actual));
        }

        let mut current = actual.clone();
        self.strategy.merge_before_update(&mut current, &desired);
        let name = current.meta().name.clone().unwrap_or_default();
        info!(
            child.kind = %kind,
            child.name = %name,
            diff = %json_diff(&self.strategy.sanitize(&actual), &self.strategy.sanitize(&current)),
            "Reconciling child"
        );
        match self.store.update(&current).await {
            Ok(updated) => {
                metrics::increment_child_operations(&kind, "update");
                self.record(parent, Event::normal("Updated", format!("Updated {kind} \"{name}\"")))
                    .await;
                Ok(Some(updated))
            }
            Err(e) => {
                error!(child.kind = %kind, child.name = %name, "Unable to update child: {}", e);
                self.record(
                    parent,
                    Event::warning("UpdateFailed", format!("Failed to update {kind} \"{name}\": {e}")),
                )
                .await;
                Err(e.into())
            }
        }
    }

    /// Whether the object blocking a create is one this parent already controls
    async fn blocked_by_own_child(&self, parent: &P, name: &str) -> bool {
        let namespace = parent.meta().namespace.clone().unwrap_or_default();
        match self.store.get_direct(&ObjectKey::new(namespace, name)).await {
            Ok(conflicted) => is_controlled_by(conflicted.meta(), parent),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl<P, C, S> SubReconciler<P> for ChildReconciler<P, C, S>
where
    P: ParentResource,
    C: KubeObject,
    S: ChildStrategy<P, C>,
{
    fn setup(&self, controller: Controller<P>, ctx: &SetupContext) -> Controller<P> {
        let controller = controller.owns(Api::<C>::all(ctx.client.clone()), ctx.watcher_config.clone());
        self.strategy.setup(controller, ctx)
    }

    async fn reconcile(&self, stash: &mut Stash, parent: &mut P) -> Result<(), ReconcilerError> {
        let err = match self.reconcile_child(stash, parent).await {
            Ok(child) => {
                self.strategy.reflect_child_status_on_parent(parent, child.as_ref(), None);
                return Ok(());
            }
            Err(err) => err,
        };

        if let Some(name) = err.already_exists_name() {
            if self.blocked_by_own_child(parent, name).await {
                // our earlier create has not reached the cache yet; retry without touching status
                debug!(child.kind = %kind_of::<C>(), child.name = %name, "Child exists but is not cached yet");
                return Err(err);
            }
            info!(child.kind = %kind_of::<C>(), child.name = %name, "Unable to reconcile child, not owned");
            self.strategy.reflect_child_status_on_parent(parent, None, Some(&err));
            return Ok(());
        }

        error!(child.kind = %kind_of::<C>(), "Unable to reconcile child: {}", err);
        self.strategy.reflect_child_status_on_parent(parent, None, Some(&err));
        Err(err)
    }
}
