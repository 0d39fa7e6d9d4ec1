//! # Error Policy
//!
//! Error handling and backoff logic for the controller watch loop.
//! This module handles reconciliation errors and watch stream errors.

use super::RuntimeContext;
use crate::controller::reconciler::{ParentResource, ReconcilerError};
use crate::observability;
use crate::store::{kind_of, ObjectKey};
use kube_runtime::controller::Action;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Requeue delay when a pass for the same object was still running
const ALREADY_RECONCILING_REQUEUE: Duration = Duration::from_secs(1);

/// Handle reconciliation errors with Fibonacci backoff
///
/// Backoff state is tracked per object so one failing parent does not delay
/// the retries of any other.
pub fn handle_reconciliation_error<P: ParentResource>(
    obj: Arc<P>,
    error: &ReconcilerError,
    ctx: Arc<RuntimeContext<P>>,
) -> Action {
    let key = ObjectKey::of(obj.as_ref());

    if matches!(error, ReconcilerError::AlreadyReconciling(_)) {
        info!(resource = %key, "Pass already in flight, requeueing");
        observability::metrics::increment_requeues_total("already-reconciling");
        return Action::requeue(ALREADY_RECONCILING_REQUEUE);
    }

    let error_span = tracing::span!(
        tracing::Level::ERROR,
        "controller.watch.reconciliation_error",
        resource.kind = %kind_of::<P>(),
        resource.namespace = %key.namespace,
        resource.name = %key.name,
        error = %error
    );
    let _error_guard = error_span.enter();

    let delay = ctx.backoff.next(&key.to_string());
    let next_trigger_time =
        chrono::Utc::now() + chrono::Duration::seconds(i64::try_from(delay.as_secs()).unwrap_or(i64::MAX));

    error!("Reconciliation error for {}: {:?}", key, error);
    info!(
        "Retrying with Fibonacci backoff: {}s, next attempt at {}",
        delay.as_secs(),
        next_trigger_time.to_rfc3339()
    );

    observability::metrics::increment_requeues_total("error-backoff");
    Action::requeue(delay)
}

/// Drop the failure streak of a parent the controller no longer knows
///
/// A parent deleted while it was backing off never reaches `reconcile` again,
/// so nothing else would clear its entry.
pub fn forget_deleted_object<P: ParentResource>(ctx: &RuntimeContext<P>, key: &ObjectKey) {
    debug!(resource = %key, "Object is gone, dropping its backoff");
    ctx.backoff.reset(&key.to_string());
}

/// How the watch loop reacts to a broken watch stream
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchErrorKind {
    /// Credentials rejected, RBAC may have been revoked
    Unauthorized,
    /// Resource version too old, normal after restarts
    Expired,
    /// API server storage is (re)initializing or throttling
    TooManyRequests,
    /// Watched kind or object is gone
    NotFound,
    Other,
}

/// Classify a controller stream error from its debug rendering
pub fn classify_watch_error(error_string: &str) -> WatchErrorKind {
    // 404 first: a plain-text 404 body surfaces as a serde error inside WatchFailed
    let is_not_found = error_string.contains("ObjectNotFound")
        || error_string.contains("404")
        || error_string.contains("not found");
    let is_401 = error_string.contains("401") || error_string.contains("Unauthorized");
    let is_410 = error_string.contains("410")
        || error_string.contains("too old resource version")
        || error_string.contains("Expired")
        || error_string.contains("Gone");
    let is_429 = error_string.contains("429")
        || error_string.contains("storage is (re)initializing")
        || error_string.contains("TooManyRequests");

    if is_401 && !is_not_found {
        WatchErrorKind::Unauthorized
    } else if is_410 {
        WatchErrorKind::Expired
    } else if is_429 {
        WatchErrorKind::TooManyRequests
    } else if is_not_found {
        WatchErrorKind::NotFound
    } else {
        WatchErrorKind::Other
    }
}

/// Handle watch stream errors with appropriate classification and backoff
///
/// Returns `None` to filter out the error (allow restart) or `Some(())` to continue.
pub async fn handle_watch_stream_error(
    error_string: &str,
    backoff: &Arc<AtomicU64>,
    max_backoff_ms: u64,
    watch_restart_delay: Duration,
) -> Option<()> {
    let error_span = tracing::span!(
        tracing::Level::WARN,
        "controller.watch.error",
        error = %error_string
    );
    let _error_guard = error_span.enter();

    match classify_watch_error(error_string) {
        WatchErrorKind::Unauthorized => {
            error!("Watch authentication failed (401 Unauthorized), RBAC may have been revoked or the token expired");
            error!("Check the controller ServiceAccount and its ClusterRoleBinding, then restart the pod if RBAC changed");
            warn!(
                "Waiting {}s before retrying watch",
                watch_restart_delay.as_secs()
            );
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
        WatchErrorKind::Expired => {
            warn!(error_type = "410", "Watch resource version expired, watch will restart");
            None
        }
        WatchErrorKind::TooManyRequests => {
            let current_backoff = backoff.load(Ordering::Relaxed);
            warn!(
                "API server storage reinitializing (429), backing off for {}ms before restart...",
                current_backoff
            );
            tokio::time::sleep(Duration::from_millis(current_backoff)).await;
            backoff.store(
                std::cmp::min(current_backoff.saturating_mul(2), max_backoff_ms),
                Ordering::Relaxed,
            );
            None
        }
        WatchErrorKind::NotFound => {
            warn!(
                "Resource not found (404), normal if it was deleted or its CRD is missing. Error: {}",
                error_string
            );
            Some(())
        }
        WatchErrorKind::Other => {
            error!("Controller stream error: {}", error_string);
            tokio::time::sleep(watch_restart_delay).await;
            None
        }
    }
}
