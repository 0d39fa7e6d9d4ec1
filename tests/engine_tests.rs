//! # Reconciliation Engine Tests
//!
//! Drives a `ParentReconciler` for the `Widget` test kind against the
//! in-memory cluster and checks the writes it makes.

mod common;

use common::*;
use k8s_openapi::api::core::v1::ConfigMap;
use riff_system::controller::reconciler::{
    ChildReconciler, ParentReconciler, ReconcilerError, SubReconciler, SyncReconciler,
};
use riff_system::crd::ConditionStatus;
use riff_system::store::{ObjectKey, Verb};
use std::sync::atomic::Ordering;
use std::sync::Arc;

fn reconciler(harness: &Harness, sync: PrefixSync) -> ParentReconciler<Widget> {
    let reconcilers: Vec<Box<dyn SubReconciler<Widget>>> = vec![
        Box::new(SyncReconciler::new("Prefix", sync)),
        Box::new(ChildReconciler::new(&harness.context, ConfigMapChild)),
    ];
    ParentReconciler::new(harness.context.clone(), reconcilers)
}

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

fn verbs(harness: &Harness) -> Vec<(Verb, String)> {
    harness
        .cluster
        .writes()
        .into_iter()
        .map(|a| (a.verb, a.kind))
        .collect()
}

#[tokio::test]
async fn test_creates_child_and_converges() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    assert_eq!(
        verbs(&harness),
        vec![
            (Verb::Create, "ConfigMap".to_string()),
            (Verb::UpdateStatus, "Widget".to_string()),
        ]
    );
    let child: ConfigMap = harness.cluster.get_object(&key("w-001")).unwrap();
    assert_eq!(child.data.unwrap()["value"], "widget:hello");
    let parent: Widget = harness.cluster.get_object(&key("w")).unwrap();
    assert!(riff_system::controller::index::is_controlled_by(&child.metadata, &parent));

    let status = parent.status.unwrap();
    assert_eq!(status.config_map_name.as_deref(), Some("w-001"));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.condition("Ready").unwrap().status, ConditionStatus::True);
    assert_eq!(harness.recorder.reasons(), vec!["Created", "StatusUpdated"]);

    // a second pass over converged state writes nothing
    harness.cluster.clear_actions();
    reconciler.reconcile(&key("w")).await.unwrap();
    assert!(harness.cluster.writes().is_empty());
}

#[tokio::test]
async fn test_updates_drifted_child() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-config", "stale"))
        .unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    let child: ConfigMap = harness.cluster.get_object(&key("w-config")).unwrap();
    assert_eq!(child.data.unwrap()["value"], "widget:hello");
    assert!(verbs(&harness).contains(&(Verb::Update, "ConfigMap".to_string())));
    assert!(harness.recorder.reasons().contains(&"Updated".to_string()));
}

#[tokio::test]
async fn test_deletes_unwanted_child() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-config", "widget:hello"))
        .unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    assert!(harness.cluster.get_object::<ConfigMap>(&key("w-config")).is_none());
    assert_eq!(harness.recorder.reasons()[0], "Deleted");
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    assert_eq!(status.config_map_name, None);
}

#[tokio::test]
async fn test_more_than_one_child_starts_over() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-a", "widget:hello"))
        .unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-b", "widget:hello"))
        .unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    assert_eq!(
        verbs(&harness),
        vec![
            (Verb::Delete, "ConfigMap".to_string()),
            (Verb::Delete, "ConfigMap".to_string()),
            (Verb::Create, "ConfigMap".to_string()),
            (Verb::UpdateStatus, "Widget".to_string()),
        ]
    );
    assert_eq!(harness.cluster.list_objects::<ConfigMap>(NAMESPACE).len(), 1);
}

#[tokio::test]
async fn test_ignores_children_of_other_owners() {
    let harness = Harness::new();
    let other = harness.cluster.seed(widget("other", "hello")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&other, "other-config", "widget:hello"))
        .unwrap();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    assert!(harness
        .cluster
        .get_object::<ConfigMap>(&key("other-config"))
        .is_some());
    assert!(!verbs(&harness).contains(&(Verb::Delete, "ConfigMap".to_string())));
}

#[tokio::test]
async fn test_missing_parent_is_a_no_op() {
    let harness = Harness::new();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("gone")).await.unwrap();

    assert!(harness.cluster.writes().is_empty());
    assert!(harness.recorder.events().is_empty());
}

#[tokio::test]
async fn test_deleting_parent_is_skipped() {
    let harness = Harness::new();
    let deleting: Widget = serde_json::from_value(serde_json::json!({
        "apiVersion": "test.projectriff.io/v1alpha1",
        "kind": "Widget",
        "metadata": {
            "name": "w",
            "namespace": NAMESPACE,
            "deletionTimestamp": "2026-01-01T00:00:00Z",
            "finalizers": ["test.projectriff.io/cleanup"]
        },
        "spec": { "value": "hello" }
    }))
    .unwrap();
    harness.cluster.seed(deleting).unwrap();
    let reconciler = reconciler(&harness, PrefixSync::default());

    reconciler.reconcile(&key("w")).await.unwrap();

    assert!(harness.cluster.writes().is_empty());
    assert!(harness.cluster.list_objects::<ConfigMap>(NAMESPACE).is_empty());
}

#[tokio::test]
async fn test_failed_pass_keeps_observed_generation() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    let sync = PrefixSync::default();
    let failing = Arc::clone(&sync.failing);
    failing.store(true, Ordering::SeqCst);
    let reconciler = reconciler(&harness, sync);

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::ReconciliationFailed(_)));

    // the chain stopped before the child, but the status it recorded is written
    assert_eq!(verbs(&harness), vec![(Verb::UpdateStatus, "Widget".to_string())]);
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    assert_eq!(status.observed_generation, None);
    let ready = status.condition("Ready").unwrap();
    assert_eq!(ready.status, ConditionStatus::False);
    assert_eq!(ready.reason.as_deref(), Some("PrefixFailed"));

    failing.store(false, Ordering::SeqCst);
    reconciler.reconcile(&key("w")).await.unwrap();
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(status.condition("Ready").unwrap().status, ConditionStatus::True);
}

#[tokio::test]
async fn test_child_create_failure_is_reflected() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .fail_on(Verb::Create, "ConfigMap", "quota exceeded");
    let reconciler = reconciler(&harness, PrefixSync::default());

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();
    assert!(err.to_string().contains("quota exceeded"));

    assert_eq!(harness.recorder.reasons(), vec!["CreationFailed", "StatusUpdated"]);
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    let condition = status.condition(WIDGET_CONDITION_CONFIG_MAP_READY).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("ReconcileFailed"));
}

#[tokio::test]
async fn test_status_update_failure_is_returned() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .fail_on(Verb::UpdateStatus, "Widget", "etcd unavailable");
    let reconciler = reconciler(&harness, PrefixSync::default());

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();

    assert!(err.to_string().contains("etcd unavailable"));
    assert_eq!(harness.recorder.reasons(), vec!["Created", "StatusUpdateFailed"]);
}

#[tokio::test]
async fn test_chain_error_wins_over_status_update_error() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .fail_on(Verb::UpdateStatus, "Widget", "etcd unavailable");
    let sync = PrefixSync::default();
    sync.failing.store(true, Ordering::SeqCst);
    let reconciler = reconciler(&harness, sync);

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();

    assert!(err.to_string().contains("unable to compute prefix"));
    assert_eq!(harness.recorder.reasons(), vec!["StatusUpdateFailed"]);
}

#[tokio::test]
async fn test_concurrent_pass_for_same_key_is_rejected() {
    let harness = Harness::new();
    harness.cluster.seed(widget("w", "hello")).unwrap();
    let gate = Gate::default();
    let sync = PrefixSync {
        gate: Some(gate.clone()),
        ..Default::default()
    };
    let reconciler = Arc::new(reconciler(&harness, sync));

    let first = {
        let reconciler = Arc::clone(&reconciler);
        tokio::spawn(async move { reconciler.reconcile(&key("w")).await })
    };
    gate.entered.notified().await;

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();
    assert!(matches!(err, ReconcilerError::AlreadyReconciling(_)));

    gate.release.notify_one();
    first.await.unwrap().unwrap();

    // the key is free again once the first pass is done
    gate.release.notify_one();
    reconciler.reconcile(&key("w")).await.unwrap();
}

#[tokio::test]
async fn test_extra_child_delete_failure_aborts_before_create() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-a", "widget:hello"))
        .unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-b", "widget:hello"))
        .unwrap();
    harness
        .cluster
        .fail_on(Verb::Delete, "ConfigMap", "deletion forbidden");
    let reconciler = reconciler(&harness, PrefixSync::default());

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();

    assert!(err.to_string().contains("deletion forbidden"));
    assert!(!verbs(&harness).contains(&(Verb::Create, "ConfigMap".to_string())));
    assert_eq!(harness.recorder.reasons(), vec!["DeleteFailed", "StatusUpdated"]);
    assert_eq!(harness.cluster.list_objects::<ConfigMap>(NAMESPACE).len(), 2);
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    let condition = status.condition(WIDGET_CONDITION_CONFIG_MAP_READY).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("ReconcileFailed"));
    assert_eq!(status.observed_generation, None);
}

#[tokio::test]
async fn test_child_update_failure_is_reflected() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "hello")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-config", "stale"))
        .unwrap();
    harness
        .cluster
        .fail_on(Verb::Update, "ConfigMap", "admission webhook denied");
    let reconciler = reconciler(&harness, PrefixSync::default());

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();

    assert!(err.to_string().contains("admission webhook denied"));
    assert_eq!(harness.recorder.reasons(), vec!["UpdateFailed", "StatusUpdated"]);
    let child: ConfigMap = harness.cluster.get_object(&key("w-config")).unwrap();
    assert_eq!(child.data.unwrap()["value"], "stale");
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    let condition = status.condition(WIDGET_CONDITION_CONFIG_MAP_READY).unwrap();
    assert_eq!(condition.status, ConditionStatus::False);
    assert_eq!(condition.reason.as_deref(), Some("ReconcileFailed"));
}

#[tokio::test]
async fn test_unwanted_child_delete_failure_is_reflected() {
    let harness = Harness::new();
    let parent = harness.cluster.seed(widget("w", "")).unwrap();
    harness
        .cluster
        .seed(owned_config_map(&parent, "w-config", "widget:hello"))
        .unwrap();
    harness
        .cluster
        .fail_on(Verb::Delete, "ConfigMap", "deletion forbidden");
    let reconciler = reconciler(&harness, PrefixSync::default());

    let err = reconciler.reconcile(&key("w")).await.unwrap_err();

    assert!(err.to_string().contains("deletion forbidden"));
    assert_eq!(harness.recorder.reasons(), vec!["DeleteFailed", "StatusUpdated"]);
    assert!(harness
        .cluster
        .get_object::<ConfigMap>(&key("w-config"))
        .is_some());
    let status = harness.cluster.get_object::<Widget>(&key("w")).unwrap().status.unwrap();
    assert_eq!(
        status.condition(WIDGET_CONDITION_CONFIG_MAP_READY).unwrap().status,
        ConditionStatus::False
    );
}
