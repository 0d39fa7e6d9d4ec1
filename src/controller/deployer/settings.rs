//! Resolves the domain External Deployers are exposed on.
//!
//! The domain lives in the cluster-wide settings ConfigMap, which is tracked
//! so that changing it moves every External Deployer to the new domain.

use crate::constants::{DEFAULT_DOMAIN, DEFAULT_DOMAIN_KEY, SETTINGS_CONFIG_MAP_NAME};
use crate::controller::enqueue::enqueue_tracked;
use crate::controller::reconciler::{
    ParentResource, ReconcilerContext, ReconcilerError, SetupContext, SyncStrategy,
};
use crate::controller::stash::{Stash, StashKey};
use crate::crd::{Deployer, IngressPolicy};
use crate::store::ObjectKey;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::Api;
use kube_runtime::Controller;
use std::sync::Arc;
use tracing::error;

/// Domain Ingress hosts are created under
pub const INGRESS_DOMAIN: StashKey<String> = StashKey::new("ingress-domain");

#[derive(Debug, Clone)]
pub struct SettingsSync {
    context: ReconcilerContext,
    namespace: String,
}

impl SettingsSync {
    pub fn new(context: &ReconcilerContext, system_namespace: &str) -> Self {
        Self {
            context: context.clone(),
            namespace: system_namespace.to_string(),
        }
    }
}

#[async_trait]
impl SyncStrategy<Deployer> for SettingsSync {
    fn setup(&self, controller: Controller<Deployer>, ctx: &SetupContext) -> Controller<Deployer> {
        controller.watches(
            Api::<ConfigMap>::namespaced(ctx.client.clone(), &self.namespace),
            ctx.watcher_config.clone(),
            enqueue_tracked::<ConfigMap, Deployer>(Arc::clone(&ctx.tracker)),
        )
    }

    async fn sync(&self, stash: &mut Stash, parent: &mut Deployer) -> Result<(), ReconcilerError> {
        let has_service = parent.status().is_some_and(|s| s.service_ref.is_some());
        if parent.spec.ingress_policy != IngressPolicy::External || !has_service {
            return Ok(());
        }

        let key = ObjectKey::new(&self.namespace, SETTINGS_CONFIG_MAP_NAME);
        self.context.track::<ConfigMap, Deployer>(key.clone(), parent);
        let settings = self
            .context
            .store::<ConfigMap>()
            .get(&key)
            .await
            .inspect_err(|e| error!("Unable to fetch settings {}: {}", key, e))?;

        let domain = settings
            .data
            .as_ref()
            .and_then(|data| data.get(DEFAULT_DOMAIN_KEY))
            .filter(|domain| !domain.is_empty())
            .cloned()
            .unwrap_or_else(|| DEFAULT_DOMAIN.to_string());
        stash.store_value(INGRESS_DOMAIN, domain);
        Ok(())
    }
}
