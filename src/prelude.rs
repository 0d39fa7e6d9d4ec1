//! # Prelude
//!
//! Re-exports commonly used types and traits for convenience.
//!
//! ## Usage
//!
//! ```rust
//! use riff_system::prelude::*;
//! ```
//!
//! This brings into scope:
//! - All CRD types (Deployer, Application, conditions, etc.)
//! - The reconciliation engine (ParentReconciler, SyncReconciler, ChildReconciler and their traits)
//! - Collaborators (Stash, Tracker, EventRecorder, ObjectStore)
//! - Config types (ControllerConfig, ServerConfig)

// CRD types - most commonly used
pub use crate::crd::*;

// Engine - composing reconcilers for a parent kind
pub use crate::controller::reconciler::{
    ChildReconciler, ChildStrategy, ObjectStatus, ParentReconciler, ParentResource,
    ReconcilerContext, ReconcilerError, SetupContext, SubReconciler, SyncReconciler, SyncStrategy,
};

// Collaborators shared along a pass
pub use crate::controller::events::{Event, EventRecorder};
pub use crate::controller::stash::{Stash, StashKey};
pub use crate::controller::tracker::{LeaseTracker, TrackKey, Tracker};
pub use crate::store::{KubeObject, ObjectClient, ObjectKey, ObjectStore, StoreError};

// Config types
pub use crate::config::{ControllerConfig, ServerConfig};
