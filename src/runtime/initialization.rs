//! # Initialization
//!
//! Start-up sequence of the controller manager: crypto provider, tracing,
//! metrics, the probe server and the collaborators every reconciler shares.

use crate::config::{ControllerConfig, ServerConfig};
use crate::controller::events::KubeEventRecorder;
use crate::controller::reconciler::{ReconcilerContext, SetupContext};
use crate::controller::server::{start_server, ServerState};
use crate::controller::tracker::{LeaseTracker, Tracker};
use crate::observability;
use crate::store::{KubeCache, ObjectClient};
use anyhow::{Context, Result};
use kube::Client;
use kube_runtime::watcher;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tracing::{error, info};

/// Everything `main` needs to build and run controllers
pub struct InitializationResult {
    pub client: Client,
    pub context: ReconcilerContext,
    pub setup: SetupContext,
    pub server_state: Arc<ServerState>,
    pub controller_config: ControllerConfig,
    pub server_config: ServerConfig,
}

impl std::fmt::Debug for InitializationResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InitializationResult")
            .field("server_ready", &self.server_state.is_ready.load(Ordering::Relaxed))
            .field("controller_config", &self.controller_config)
            .finish_non_exhaustive()
    }
}

/// Initialize the controller manager
///
/// # Errors
///
/// Fails if metrics cannot be registered, the probe server does not come up in
/// time, or no Kubernetes client can be configured.
pub async fn initialize() -> Result<InitializationResult> {
    rustls::crypto::ring::default_provider()
        .install_default()
        .unwrap_or_else(|_| panic!("Failed to install rustls crypto provider"));

    let controller_config = ControllerConfig::from_env();
    let server_config = ServerConfig::from_env();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| controller_config.log_level.clone().into()),
        )
        .init();

    info!("Starting riff System Controller");
    info!(
        "Build info: timestamp={}, datetime={}, git_hash={}",
        env!("BUILD_TIMESTAMP"),
        env!("BUILD_DATETIME"),
        env!("BUILD_GIT_HASH")
    );

    observability::metrics::register_metrics()?;

    let server_state = Arc::new(ServerState::default());
    let server_state_clone = Arc::clone(&server_state);
    let server_port = server_config.metrics_port;
    let server_handle = tokio::spawn(async move {
        if let Err(e) = start_server(server_port, server_state_clone).await {
            error!("HTTP server error: {}", e);
        }
    });
    wait_for_server_ready(&server_state, &server_handle, &server_config).await?;

    let client = Client::try_default()
        .await
        .context("Failed to create Kubernetes client")?;

    let watcher_config = watcher::Config::default().any_semantic();
    let cache = Arc::new(KubeCache::new(client.clone(), watcher_config.clone()));
    let tracker: Arc<dyn Tracker> = Arc::new(LeaseTracker::new(controller_config.sync_period()));
    let context = ReconcilerContext {
        client: ObjectClient::Kube(cache),
        recorder: Arc::new(KubeEventRecorder::new(client.clone())),
        tracker: Arc::clone(&tracker),
    };
    let setup = SetupContext {
        client: client.clone(),
        tracker,
        watcher_config,
    };

    info!(
        system_namespace = %controller_config.system_namespace,
        sync_period_secs = controller_config.sync_period_secs,
        "Controller initialized, starting watch loop..."
    );

    Ok(InitializationResult {
        client,
        context,
        setup,
        server_state,
        controller_config,
        server_config,
    })
}

async fn wait_for_server_ready(
    server_state: &Arc<ServerState>,
    server_handle: &tokio::task::JoinHandle<()>,
    server_config: &ServerConfig,
) -> Result<()> {
    let startup_timeout = server_config.startup_timeout();
    let poll_interval = server_config.poll_interval();
    let start_time = std::time::Instant::now();

    loop {
        if server_handle.is_finished() {
            return Err(anyhow::anyhow!("HTTP server failed to start"));
        }

        if server_state.is_ready.load(Ordering::Relaxed) {
            info!("HTTP server is ready and accepting connections");
            return Ok(());
        }

        if start_time.elapsed() > startup_timeout {
            return Err(anyhow::anyhow!(
                "HTTP server failed to become ready within {} seconds",
                startup_timeout.as_secs()
            ));
        }

        tokio::time::sleep(poll_interval).await;
    }
}
