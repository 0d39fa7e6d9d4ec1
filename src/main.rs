//! # riff System Controller
//!
//! Controller manager reconciling riff `Deployer` resources into a Deployment,
//! a Service and, when exposed externally, an Ingress.
//!
//! ## Overview
//!
//! 1. **Resolve the image** - from the referenced Application, Container or Function build,
//!    or from the template when no build is named
//! 2. **Run it** - a Deployment with a readiness probe on the container port
//! 3. **Expose it** - a Service inside the cluster and, for `External` ingress
//!    policy, an Ingress on the domain from the `riff-core-settings` ConfigMap
//!
//! Status conditions on the Deployer report the readiness of each step.

use anyhow::Result;
use riff_system::controller::deployer::deployer_reconciler;
use riff_system::runtime::{initialize, run_watch_loop};
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<()> {
    let init = initialize().await?;

    let reconciler = Arc::new(deployer_reconciler(
        init.context.clone(),
        &init.controller_config.system_namespace,
    ));

    run_watch_loop(
        reconciler,
        init.setup,
        init.server_state,
        init.controller_config,
    )
    .await
}
