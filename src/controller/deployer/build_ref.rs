//! Resolves the image a Deployer runs.
//!
//! A Deployer either names its image in the pod template or follows the
//! `latestImage` of a build source. Build sources are tracked, so a new build
//! re-reconciles every Deployer that follows it.

use crate::controller::enqueue::enqueue_tracked;
use crate::controller::reconciler::{
    ParentResource, ReconcilerContext, ReconcilerError, SetupContext, SyncStrategy,
};
use crate::controller::stash::Stash;
use crate::crd::{Application, Container, Deployer, Function, LatestImage};
use crate::store::{KubeObject, ObjectKey};
use async_trait::async_trait;
use kube::api::Api;
use kube::Resource;
use kube_runtime::Controller;
use std::sync::Arc;
use tracing::debug;

#[derive(Debug, Clone)]
pub struct BuildRefSync {
    context: ReconcilerContext,
}

impl BuildRefSync {
    pub fn new(context: &ReconcilerContext) -> Self {
        Self {
            context: context.clone(),
        }
    }

    async fn follow<K>(&self, parent: &mut Deployer, name: &str) -> Result<(), ReconcilerError>
    where
        K: KubeObject + LatestImage,
    {
        let key = ObjectKey::new(parent.meta().namespace.clone().unwrap_or_default(), name);
        self.context.track::<K, Deployer>(key.clone(), parent);

        let source = match self.context.store::<K>().get(&key).await {
            Ok(source) => source,
            Err(e) if e.is_not_found() => {
                // tracked, so its creation brings us back
                debug!(source.name = %name, "Build source not found");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };
        if let Some(image) = source.latest_image() {
            parent.status_mut().latest_image = Some(image.to_string());
        }
        Ok(())
    }
}

#[async_trait]
impl SyncStrategy<Deployer> for BuildRefSync {
    fn setup(&self, controller: Controller<Deployer>, ctx: &SetupContext) -> Controller<Deployer> {
        controller
            .watches(
                Api::<Application>::all(ctx.client.clone()),
                ctx.watcher_config.clone(),
                enqueue_tracked::<Application, Deployer>(Arc::clone(&ctx.tracker)),
            )
            .watches(
                Api::<Container>::all(ctx.client.clone()),
                ctx.watcher_config.clone(),
                enqueue_tracked::<Container, Deployer>(Arc::clone(&ctx.tracker)),
            )
            .watches(
                Api::<Function>::all(ctx.client.clone()),
                ctx.watcher_config.clone(),
                enqueue_tracked::<Function, Deployer>(Arc::clone(&ctx.tracker)),
            )
    }

    async fn sync(&self, _stash: &mut Stash, parent: &mut Deployer) -> Result<(), ReconcilerError> {
        let Some(build) = parent.spec.build.clone() else {
            let image = parent
                .spec
                .template
                .as_ref()
                .and_then(|t| t.spec.as_ref())
                .and_then(|s| s.containers.first())
                .and_then(|c| c.image.clone())
                .filter(|image| !image.is_empty());
            parent.status_mut().latest_image = image;
            return Ok(());
        };

        let non_empty = |name: &Option<String>| name.clone().filter(|n| !n.is_empty());
        if let Some(name) = non_empty(&build.application_ref) {
            self.follow::<Application>(parent, &name).await
        } else if let Some(name) = non_empty(&build.container_ref) {
            self.follow::<Container>(parent, &name).await
        } else if let Some(name) = non_empty(&build.function_ref) {
            self.follow::<Function>(parent, &name).await
        } else {
            Err(anyhow::anyhow!("invalid build").into())
        }
    }
}
