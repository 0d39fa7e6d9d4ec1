//! # Topic Provisioner
//!
//! HTTP service creating streaming topics on demand.
//!
//! ```bash
//! topic-provisioner --gateway my-gateway:6565 --port 8080
//! curl -X PUT http://localhost:8080/my-namespace/my-stream
//! ```
//!
//! `PUT /<namespace>/<stream>` creates topic `<namespace>_<stream>` unless it
//! already exists and answers with the gateway and topic to connect to.

use anyhow::{Context, Result};
use clap::Parser;
use riff_system::constants::{DEFAULT_PROVISIONER_PORT, DEFAULT_TOPIC_PARTITIONS};
use riff_system::observability;
use riff_system::provisioner::{router, InMemoryTopicAdmin, ProvisionerState};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

/// Creates streaming topics on demand
#[derive(Parser, Debug)]
#[command(name = "topic-provisioner", about = "Creates streaming topics on demand", long_about = None)]
struct Args {
    /// Gateway address returned to clients
    #[arg(long, env = "GATEWAY")]
    gateway: String,

    /// Port to listen on
    #[arg(long, env = "PORT", default_value_t = DEFAULT_PROVISIONER_PORT)]
    port: u16,

    /// Partition count of newly created topics
    #[arg(long, env = "PARTITIONS", default_value_t = DEFAULT_TOPIC_PARTITIONS)]
    partitions: i32,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "riff_system=info,tower_http=info".into()),
        )
        .init();

    observability::metrics::register_metrics()?;

    let state = ProvisionerState {
        admin: Arc::new(InMemoryTopicAdmin::new()),
        gateway: args.gateway,
        partitions: args.partitions,
    };

    let addr = format!("0.0.0.0:{}", args.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(gateway = %state.gateway, partitions = state.partitions, "Topic provisioner listening on {}", addr);

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Received shutdown signal, stopping topic provisioner");
        })
        .await?;
    Ok(())
}
