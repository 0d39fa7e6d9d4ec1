//! # Reconciler
//!
//! The generic reconciliation engine.
//!
//! - `parent`: fetches a parent, runs the chain and writes status once
//! - `sync`: side-effecting steps against the parent
//! - `child`: lifecycle of one child kind per parent
//! - `diff`: readable JSON diffs for logs

mod child;
mod diff;
mod parent;
mod sync;
mod types;

pub use child::{ChildReconciler, ChildStrategy};
pub use diff::json_diff;
pub use parent::ParentReconciler;
pub use sync::{SyncReconciler, SyncStrategy};
pub use types::{
    ObjectStatus, ParentResource, ReconcilerContext, ReconcilerError, SetupContext, SubReconciler,
};
