//! # Runtime
//!
//! Process plumbing around a [`ParentReconciler`]: start-up, the controller
//! watch loop, and the error policies applied to failed passes and broken
//! watch streams.

pub mod error_policy;
pub mod initialization;
pub mod watch_loop;

pub use initialization::{initialize, InitializationResult};
pub use watch_loop::run_watch_loop;

use crate::controller::backoff::KeyedBackoff;
use crate::controller::reconciler::{ParentReconciler, ParentResource};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// State handed to every reconcile and error policy call of one controller
pub struct RuntimeContext<P: ParentResource> {
    pub reconciler: Arc<ParentReconciler<P>>,
    /// Per-object Fibonacci backoff for failed passes
    pub backoff: KeyedBackoff,
    /// Requeue interval after a successful pass
    pub sync_period: Duration,
}

impl<P: ParentResource> fmt::Debug for RuntimeContext<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuntimeContext")
            .field("reconciler", &self.reconciler)
            .field("sync_period", &self.sync_period)
            .finish_non_exhaustive()
    }
}
