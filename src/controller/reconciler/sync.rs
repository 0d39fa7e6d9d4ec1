//! # Sync Reconciler
//!
//! A sub-reconciler that runs arbitrary logic against the parent and the
//! stash, with no child of its own.

use super::types::{ParentResource, ReconcilerError, SetupContext, SubReconciler};
use crate::controller::stash::Stash;
use async_trait::async_trait;
use kube_runtime::Controller;
use std::fmt;
use std::marker::PhantomData;
use tracing::error;

/// Logic run by a [`SyncReconciler`]
///
/// A failing sync is expected to have recorded a condition on the parent
/// before returning the error.
#[async_trait]
pub trait SyncStrategy<P: ParentResource>: Send + Sync {
    fn setup(&self, controller: Controller<P>, _ctx: &SetupContext) -> Controller<P> {
        controller
    }

    async fn sync(&self, stash: &mut Stash, parent: &mut P) -> Result<(), ReconcilerError>;
}

pub struct SyncReconciler<P, S> {
    name: &'static str,
    strategy: S,
    _parent: PhantomData<fn(P)>,
}

impl<P, S> fmt::Debug for SyncReconciler<P, S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncReconciler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<P: ParentResource, S: SyncStrategy<P>> SyncReconciler<P, S> {
    /// `name` labels this step in logs
    pub fn new(name: &'static str, strategy: S) -> Self {
        Self {
            name,
            strategy,
            _parent: PhantomData,
        }
    }
}

#[async_trait]
impl<P, S> SubReconciler<P> for SyncReconciler<P, S>
where
    P: ParentResource,
    S: SyncStrategy<P>,
{
    fn setup(&self, controller: Controller<P>, ctx: &SetupContext) -> Controller<P> {
        self.strategy.setup(controller, ctx)
    }

    async fn reconcile(&self, stash: &mut Stash, parent: &mut P) -> Result<(), ReconcilerError> {
        self.strategy.sync(stash, parent).await.inspect_err(|e| {
            error!(reconciler = self.name, "Unable to sync: {}", e);
        })
    }
}
