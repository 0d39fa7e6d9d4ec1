//! # Types
//!
//! Contracts between the engine and the resource kinds it reconciles.

use crate::controller::events::EventRecorder;
use crate::controller::stash::Stash;
use crate::controller::tracker::{TrackKey, Tracker};
use crate::store::{KubeObject, ObjectClient, ObjectKey, ObjectStore, StoreError};
use async_trait::async_trait;
use kube_runtime::{watcher, Controller};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcilerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    /// Another pass for the same key is still running
    #[error("{0} is already being reconciled")]
    AlreadyReconciling(ObjectKey),
    /// Children can only be owned by a persisted parent
    #[error("{0} has no UID, cannot set controller reference")]
    MissingUid(ObjectKey),
    #[error("Reconciliation failed: {0}")]
    ReconciliationFailed(#[from] anyhow::Error),
}

impl ReconcilerError {
    /// Name of the object that blocked a child create, if that is what failed
    #[must_use]
    pub fn already_exists_name(&self) -> Option<&str> {
        match self {
            ReconcilerError::Store(err) => err.already_exists_name(),
            _ => None,
        }
    }
}

/// Status of a parent resource
pub trait ObjectStatus:
    Clone + PartialEq + fmt::Debug + Default + Serialize + Send + Sync + 'static
{
    /// Add every condition this status manages that is not present yet
    fn initialize_conditions(&mut self);

    fn set_observed_generation(&mut self, generation: Option<i64>);
}

/// A resource reconciled by a [`ParentReconciler`](super::ParentReconciler)
pub trait ParentResource: KubeObject {
    type Status: ObjectStatus;

    fn status(&self) -> Option<&Self::Status>;

    /// The status, created empty if absent
    fn status_mut(&mut self) -> &mut Self::Status;

    /// Fill in spec defaults before any sub-reconciler sees the object
    fn default_spec(&mut self);
}

/// Collaborators shared by every reconciler of a controller
#[derive(Clone)]
pub struct ReconcilerContext {
    pub client: ObjectClient,
    pub recorder: Arc<dyn EventRecorder>,
    pub tracker: Arc<dyn Tracker>,
}

impl fmt::Debug for ReconcilerContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReconcilerContext")
            .field("client", &self.client)
            .field("recorder", &self.recorder)
            .field("tracker", &self.tracker)
            .finish()
    }
}

impl ReconcilerContext {
    #[must_use]
    pub fn store<K: KubeObject>(&self) -> Arc<dyn ObjectStore<K>> {
        self.client.store::<K>()
    }

    /// Re-reconcile `parent` whenever the `K` at `reference` changes
    pub fn track<K: KubeObject, P: KubeObject>(&self, reference: ObjectKey, parent: &P) {
        self.tracker
            .track(TrackKey::of::<K>(reference), ObjectKey::of(parent));
    }
}

/// What a sub-reconciler needs to register watches
#[derive(Clone)]
pub struct SetupContext {
    pub client: kube::Client,
    pub tracker: Arc<dyn Tracker>,
    pub watcher_config: watcher::Config,
}

impl fmt::Debug for SetupContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SetupContext")
            .field("tracker", &self.tracker)
            .finish_non_exhaustive()
    }
}

/// One step of a parent's reconcile pass
#[async_trait]
pub trait SubReconciler<P: ParentResource>: Send + Sync {
    /// Register the watches this step depends on
    fn setup(&self, controller: Controller<P>, _ctx: &SetupContext) -> Controller<P> {
        controller
    }

    /// Converge toward `parent`'s desired state, recording outcomes on its status
    ///
    /// Returning an error stops the rest of the chain for this pass.
    async fn reconcile(&self, stash: &mut Stash, parent: &mut P) -> Result<(), ReconcilerError>;
}
