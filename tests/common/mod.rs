//! Common test utilities for reconciler integration tests
//!
//! Provides an in-memory cluster wired into a [`ReconcilerContext`], plus a
//! small `Widget` parent kind for exercising the engine on its own.

#![allow(dead_code, reason = "each test crate uses a different subset")]

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::api::ObjectMeta;
use kube::{CustomResource, Resource};
use riff_system::controller::events::InMemoryEventRecorder;
use riff_system::controller::reconciler::{
    ChildStrategy, ObjectStatus, ParentResource, ReconcilerContext, ReconcilerError, SyncStrategy,
};
use riff_system::controller::stash::{Stash, StashKey};
use riff_system::controller::tracker::LeaseTracker;
use riff_system::crd::{Condition, ConditionSet};
use riff_system::store::InMemoryCluster;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;

pub const NAMESPACE: &str = "default";

/// In-memory collaborators of a reconciler under test
#[derive(Debug)]
pub struct Harness {
    pub cluster: Arc<InMemoryCluster>,
    pub recorder: Arc<InMemoryEventRecorder>,
    pub tracker: Arc<LeaseTracker>,
    pub context: ReconcilerContext,
}

impl Harness {
    pub fn new() -> Self {
        let cluster = InMemoryCluster::new();
        let recorder = Arc::new(InMemoryEventRecorder::default());
        let tracker = Arc::new(LeaseTracker::new(Duration::from_secs(60 * 60)));
        let context = ReconcilerContext {
            client: cluster.client(),
            recorder: Arc::<InMemoryEventRecorder>::clone(&recorder),
            tracker: Arc::<LeaseTracker>::clone(&tracker),
        };
        Self {
            cluster,
            recorder,
            tracker,
            context,
        }
    }
}

pub fn meta(name: &str) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(NAMESPACE.to_string()),
        ..Default::default()
    }
}

pub const WIDGET_CONDITION_CONFIG_MAP_READY: &str = "ConfigMapReady";

pub const WIDGET_CONDITIONS: ConditionSet = ConditionSet::living(&[WIDGET_CONDITION_CONFIG_MAP_READY]);

/// A parent that materializes its value into a ConfigMap
#[derive(CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Widget",
    group = "test.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "WidgetStatus"
)]
pub struct WidgetSpec {
    /// Empty means the widget wants no ConfigMap
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct WidgetStatus {
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub observed_generation: Option<i64>,
    pub config_map_name: Option<String>,
}

impl WidgetStatus {
    pub fn condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }
}

impl ObjectStatus for WidgetStatus {
    fn initialize_conditions(&mut self) {
        WIDGET_CONDITIONS
            .manage(&mut self.conditions)
            .initialize_conditions();
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.observed_generation = generation;
    }
}

impl ParentResource for Widget {
    type Status = WidgetStatus;

    fn status(&self) -> Option<&WidgetStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut WidgetStatus {
        self.status.get_or_insert_with(WidgetStatus::default)
    }

    fn default_spec(&mut self) {
        self.spec.value.get_or_insert_with(|| "default".to_string());
    }
}

pub fn widget(name: &str, value: &str) -> Widget {
    Widget {
        metadata: meta(name),
        spec: WidgetSpec {
            value: Some(value.to_string()),
        },
        status: None,
    }
}

pub const PREFIX: StashKey<String> = StashKey::new("prefix");

/// Stashes the prefix the ConfigMap child writes in front of the value
///
/// Fails while `failing` is set. Waits for `release` when `gate` is set.
#[derive(Debug, Default)]
pub struct PrefixSync {
    pub failing: Arc<AtomicBool>,
    pub gate: Option<Gate>,
}

/// Pauses a pass until the test lets it continue
#[derive(Debug, Clone, Default)]
pub struct Gate {
    pub entered: Arc<Notify>,
    pub release: Arc<Notify>,
}

#[async_trait]
impl SyncStrategy<Widget> for PrefixSync {
    async fn sync(&self, stash: &mut Stash, parent: &mut Widget) -> Result<(), ReconcilerError> {
        if let Some(gate) = &self.gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }
        if self.failing.load(Ordering::SeqCst) {
            WIDGET_CONDITIONS.manage(&mut parent.status_mut().conditions).mark_false(
                WIDGET_CONDITION_CONFIG_MAP_READY,
                "PrefixFailed",
                "unable to compute prefix",
            );
            return Err(anyhow::anyhow!("unable to compute prefix").into());
        }
        stash.store_value(PREFIX, "widget:".to_string());
        Ok(())
    }
}

/// The single ConfigMap of a Widget
#[derive(Debug, Default)]
pub struct ConfigMapChild;

#[async_trait]
impl ChildStrategy<Widget, ConfigMap> for ConfigMapChild {
    async fn desired_child(&self, stash: &Stash, parent: &Widget) -> Result<Option<ConfigMap>, ReconcilerError> {
        let value = parent.spec.value.clone().unwrap_or_default();
        if value.is_empty() {
            return Ok(None);
        }
        let prefix = stash.retrieve_value(PREFIX).cloned().unwrap_or_default();
        let name = parent.meta().name.clone().unwrap_or_default();
        Ok(Some(ConfigMap {
            metadata: ObjectMeta {
                generate_name: Some(format!("{name}-")),
                namespace: parent.meta().namespace.clone(),
                labels: Some(BTreeMap::from([("widget".to_string(), name)])),
                ..Default::default()
            },
            data: Some(BTreeMap::from([("value".to_string(), format!("{prefix}{value}"))])),
            ..Default::default()
        }))
    }

    fn reflect_child_status_on_parent(
        &self,
        parent: &mut Widget,
        child: Option<&ConfigMap>,
        err: Option<&ReconcilerError>,
    ) {
        let status = parent.status_mut();
        if let Some(err) = err {
            WIDGET_CONDITIONS.manage(&mut status.conditions).mark_false(
                WIDGET_CONDITION_CONFIG_MAP_READY,
                "ReconcileFailed",
                err.to_string(),
            );
            return;
        }
        status.config_map_name = child.and_then(|c| c.meta().name.clone());
        WIDGET_CONDITIONS
            .manage(&mut status.conditions)
            .mark_true(WIDGET_CONDITION_CONFIG_MAP_READY);
    }

    fn merge_before_update(&self, current: &mut ConfigMap, desired: &ConfigMap) {
        current.metadata.labels = desired.metadata.labels.clone();
        current.data = desired.data.clone();
    }

    fn semantic_equals(&self, a: &ConfigMap, b: &ConfigMap) -> bool {
        a.data == b.data && a.metadata.labels == b.metadata.labels
    }
}

/// A ConfigMap controlled by `owner`
pub fn owned_config_map(owner: &Widget, name: &str, value: &str) -> ConfigMap {
    let mut metadata = meta(name);
    metadata.owner_references = owner.controller_owner_ref(&()).map(|r| vec![r]);
    metadata.labels = Some(BTreeMap::from([(
        "widget".to_string(),
        owner.meta().name.clone().unwrap_or_default(),
    )]));
    ConfigMap {
        metadata,
        data: Some(BTreeMap::from([("value".to_string(), value.to_string())])),
        ..Default::default()
    }
}
