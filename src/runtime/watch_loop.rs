//! # Watch Loop
//!
//! Runs a [`kube_runtime::Controller`] for one parent kind, restarting it when
//! its watch streams end, until a shutdown signal arrives.

use super::error_policy::{forget_deleted_object, handle_reconciliation_error, handle_watch_stream_error};
use super::RuntimeContext;
use crate::config::ControllerConfig;
use crate::controller::backoff::KeyedBackoff;
use crate::controller::reconciler::{ParentReconciler, ParentResource, ReconcilerError, SetupContext};
use crate::controller::server::ServerState;
use crate::observability;
use crate::store::{kind_of, ObjectKey};
use futures::StreamExt;
use kube::api::Api;
use kube_runtime::controller::{self, Action};
use kube_runtime::Controller;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn, Instrument};

/// Run the controller watch loop for parents of kind `P`
///
/// Sub-reconcilers register their own watches through
/// [`ParentReconciler::setup`] every time the controller is (re)started.
///
/// # Errors
///
/// Currently only returns once a shutdown was requested, always with `Ok`.
pub async fn run_watch_loop<P: ParentResource>(
    reconciler: Arc<ParentReconciler<P>>,
    setup: SetupContext,
    server_state: Arc<ServerState>,
    config: ControllerConfig,
) -> Result<(), anyhow::Error> {
    let context = Arc::new(RuntimeContext {
        reconciler,
        backoff: KeyedBackoff::new(config.error_backoff_min_minutes, config.error_backoff_max_minutes),
        sync_period: config.sync_period(),
    });
    let backoff_duration_ms = Arc::new(AtomicU64::new(config.backoff_start_ms));

    // mark not ready on SIGINT/SIGTERM so the loop stops restarting
    let shutdown_server_state = Arc::clone(&server_state);
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received shutdown signal (SIGINT/SIGTERM), initiating graceful shutdown...");
        shutdown_server_state.set_ready(false);
        info!("Marked server as not ready, waiting for in-flight reconciliations to complete...");
    });

    loop {
        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let watch_span = tracing::info_span!(
            "controller.watch",
            resource.kind = %kind_of::<P>(),
        );
        run_controller(&context, &setup, &config, &backoff_duration_ms)
            .instrument(watch_span)
            .await;

        if !server_state.is_ready.load(Ordering::Relaxed) {
            info!("Shutdown requested, exiting watch loop");
            break;
        }

        let delay = config.watch_restart_delay_after_end_duration();
        warn!(
            "Controller watch stream ended, restarting in {} seconds...",
            delay.as_secs()
        );
        tokio::time::sleep(delay).await;
    }

    info!("Controller stopped gracefully");
    Ok(())
}

async fn run_controller<P: ParentResource>(
    context: &Arc<RuntimeContext<P>>,
    setup: &SetupContext,
    config: &ControllerConfig,
    backoff: &Arc<AtomicU64>,
) {
    info!("Starting controller watch loop...");
    let controller = Controller::new(
        Api::<P>::all(setup.client.clone()),
        setup.watcher_config.clone(),
    );
    let controller = context.reconciler.setup(controller, setup);

    let backoff_start_ms = config.backoff_start_ms;
    let backoff_max_ms = config.backoff_max_ms;
    let restart_delay = config.watch_restart_delay_duration();

    controller
        .with_config(controller::Config::default().concurrency(config.max_concurrent_reconciliations))
        .shutdown_on_signal()
        .run(reconcile, handle_reconciliation_error, Arc::clone(context))
        .filter_map(|result| {
            let backoff = Arc::clone(backoff);
            let context = Arc::clone(context);
            async move {
                match result {
                    Ok((object, _)) => {
                        backoff.store(backoff_start_ms, Ordering::Relaxed);
                        debug!(resource.name = %object.name, "watch.event.reconciled");
                        Some(())
                    }
                    // already handled by the error policy
                    Err(controller::Error::ReconcilerFailed(e, object)) => {
                        debug!(resource.name = %object.name, error = %e, "watch.event.reconciliation_failed");
                        Some(())
                    }
                    Err(controller::Error::ObjectNotFound(object)) => {
                        let key = ObjectKey::new(object.namespace.clone().unwrap_or_default(), object.name.clone());
                        forget_deleted_object(context.as_ref(), &key);
                        Some(())
                    }
                    Err(e) => {
                        let error_string = format!("{e:?}");
                        handle_watch_stream_error(&error_string, &backoff, backoff_max_ms, restart_delay)
                            .await
                    }
                }
            }
        })
        .for_each(|()| futures::future::ready(()))
        .await;
}

/// One pass for `obj`, then a periodic resync
///
/// The resync refreshes every tracker lease the parent holds.
async fn reconcile<P: ParentResource>(
    obj: Arc<P>,
    ctx: Arc<RuntimeContext<P>>,
) -> Result<Action, ReconcilerError> {
    let key = ObjectKey::of(obj.as_ref());
    ctx.reconciler.reconcile(&key).await?;
    ctx.backoff.reset(&key.to_string());
    observability::metrics::increment_requeues_total("sync-period");
    Ok(Action::requeue(ctx.sync_period))
}
