//! # Deployer Controller Tests
//!
//! Full reconcile passes of the Deployer chain against the in-memory cluster.

mod common;

use common::{meta, Harness, NAMESPACE};
use k8s_openapi::api::apps::v1::{Deployment, DeploymentCondition, DeploymentStatus};
use k8s_openapi::api::core::v1::{ConfigMap, Container as PodContainer, PodSpec, PodTemplateSpec, Service};
use k8s_openapi::api::networking::v1::Ingress;
use kube::Resource;
use riff_system::constants::{DEFAULT_SYSTEM_NAMESPACE, SETTINGS_CONFIG_MAP_NAME};
use riff_system::controller::deployer::deployer_reconciler;
use riff_system::controller::reconciler::{ParentReconciler, ReconcilerError};
use riff_system::controller::tracker::{TrackKey, Tracker};
use riff_system::crd::{
    Application, ApplicationSpec, Build, BuildStatus, ConditionStatus, Deployer, DeployerSpec,
    DeployerStatus, IngressPolicy,
};
use riff_system::store::{ObjectKey, ObjectStore, Verb};
use std::collections::BTreeMap;

const IMAGE: &str = "registry.example.com/petclinic@sha256:7e8b1f";

fn key(name: &str) -> ObjectKey {
    ObjectKey::new(NAMESPACE, name)
}

fn reconciler(harness: &Harness) -> ParentReconciler<Deployer> {
    deployer_reconciler(harness.context.clone(), DEFAULT_SYSTEM_NAMESPACE)
}

fn application(name: &str, latest_image: Option<&str>) -> Application {
    Application {
        metadata: meta(name),
        spec: ApplicationSpec {
            image: "registry.example.com/petclinic".to_string(),
        },
        status: Some(BuildStatus {
            latest_image: latest_image.map(str::to_string),
            ..Default::default()
        }),
    }
}

fn deployer(name: &str, policy: IngressPolicy) -> Deployer {
    Deployer {
        metadata: meta(name),
        spec: DeployerSpec {
            build: Some(Build {
                application_ref: Some("petclinic".to_string()),
                ..Default::default()
            }),
            ingress_policy: policy,
            ..Default::default()
        },
        status: None,
    }
}

fn settings(domain: &str) -> ConfigMap {
    ConfigMap {
        metadata: kube::api::ObjectMeta {
            name: Some(SETTINGS_CONFIG_MAP_NAME.to_string()),
            namespace: Some(DEFAULT_SYSTEM_NAMESPACE.to_string()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([("defaultDomain".to_string(), domain.to_string())])),
        ..Default::default()
    }
}

fn status(harness: &Harness, name: &str) -> DeployerStatus {
    harness
        .cluster
        .get_object::<Deployer>(&key(name))
        .and_then(|d| d.status)
        .expect("deployer has a status")
}

fn condition(status: &DeployerStatus, type_: &str) -> ConditionStatus {
    status.get_condition(type_).expect("condition is set").status
}

#[tokio::test]
async fn test_creates_deployment_and_service_then_converges() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();
    let reconciler = reconciler(&harness);

    reconciler.reconcile(&key("petclinic")).await.unwrap();

    let deployment: Deployment = harness
        .cluster
        .get_object(&key("petclinic-deployer-001"))
        .expect("deployment created from generateName");
    let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
    let container = &pod_spec.containers[0];
    assert_eq!(container.image.as_deref(), Some(IMAGE));
    let env = container.env.as_ref().unwrap();
    assert!(env
        .iter()
        .any(|e| e.name == "PORT" && e.value.as_deref() == Some("8080")));

    let service: Service = harness.cluster.get_object(&key("petclinic")).unwrap();
    let ports = service.spec.unwrap().ports.unwrap();
    assert_eq!(ports[0].port, 80);

    let status = status(&harness, "petclinic");
    assert_eq!(status.latest_image.as_deref(), Some(IMAGE));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(
        status.deployment_ref.as_ref().map(|r| r.name.as_str()),
        Some("petclinic-deployer-001")
    );
    assert_eq!(
        status.address.as_ref().map(|a| a.url.as_str()),
        Some("http://petclinic.default.svc.cluster.local")
    );
    assert_eq!(condition(&status, "DeploymentReady"), ConditionStatus::Unknown);
    assert_eq!(condition(&status, "ServiceReady"), ConditionStatus::True);
    assert_eq!(condition(&status, "IngressReady"), ConditionStatus::True);
    assert_eq!(condition(&status, "Ready"), ConditionStatus::Unknown);
    assert!(status.url.is_none());

    harness.cluster.clear_actions();
    reconciler.reconcile(&key("petclinic")).await.unwrap();
    assert!(harness.cluster.writes().is_empty());
}

#[tokio::test]
async fn test_ready_once_deployment_is_available() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();
    let reconciler = reconciler(&harness);
    reconciler.reconcile(&key("petclinic")).await.unwrap();

    let mut deployment: Deployment = harness
        .cluster
        .get_object(&key("petclinic-deployer-001"))
        .unwrap();
    let condition_of = |type_: &str| DeploymentCondition {
        type_: type_.to_string(),
        status: "True".to_string(),
        ..Default::default()
    };
    deployment.status = Some(DeploymentStatus {
        conditions: Some(vec![condition_of("Available"), condition_of("Progressing")]),
        ..Default::default()
    });
    harness
        .context
        .store::<Deployment>()
        .update_status(&deployment)
        .await
        .unwrap();

    reconciler.reconcile(&key("petclinic")).await.unwrap();

    let status = status(&harness, "petclinic");
    assert_eq!(condition(&status, "DeploymentReady"), ConditionStatus::True);
    assert_eq!(condition(&status, "Ready"), ConditionStatus::True);
    assert!(status.is_ready());
}

#[tokio::test]
async fn test_template_image_without_build() {
    let harness = Harness::new();
    let mut parent = deployer("nginx", IngressPolicy::ClusterLocal);
    parent.spec.build = None;
    parent.spec.template = Some(PodTemplateSpec {
        spec: Some(PodSpec {
            containers: vec![PodContainer {
                image: Some("nginx:1.27".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    });
    harness.cluster.seed(parent).unwrap();

    reconciler(&harness).reconcile(&key("nginx")).await.unwrap();

    assert_eq!(status(&harness, "nginx").latest_image.as_deref(), Some("nginx:1.27"));
    let deployment: Deployment = harness.cluster.get_object(&key("nginx-deployer-001")).unwrap();
    let pod_spec = deployment.spec.unwrap().template.spec.unwrap();
    let container = &pod_spec.containers[0];
    assert_eq!(container.image.as_deref(), Some("nginx:1.27"));
}

#[tokio::test]
async fn test_waits_for_missing_application() {
    let harness = Harness::new();
    let parent = harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();

    reconciler(&harness).reconcile(&key("petclinic")).await.unwrap();

    assert!(harness.cluster.list_objects::<Deployment>(NAMESPACE).is_empty());
    assert!(harness.cluster.list_objects::<Service>(NAMESPACE).is_empty());
    let status = status(&harness, "petclinic");
    assert_eq!(status.latest_image, None);
    assert_eq!(condition(&status, "Ready"), ConditionStatus::Unknown);

    // the application is tracked so its creation re-enqueues the deployer
    let watchers = harness
        .tracker
        .lookup(&TrackKey::of::<Application>(key("petclinic")));
    assert_eq!(watchers, vec![ObjectKey::of(&parent)]);
}

#[tokio::test]
async fn test_invalid_build_fails() {
    let harness = Harness::new();
    let mut parent = deployer("petclinic", IngressPolicy::ClusterLocal);
    parent.spec.build = Some(Build::default());
    harness.cluster.seed(parent).unwrap();

    let err = reconciler(&harness)
        .reconcile(&key("petclinic"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("invalid build"));
    assert_eq!(status(&harness, "petclinic").observed_generation, None);
}

#[tokio::test]
async fn test_external_ingress_uses_settings_domain() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness.cluster.seed(settings("apps.example.org")).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::External))
        .unwrap();

    reconciler(&harness).reconcile(&key("petclinic")).await.unwrap();

    let ingresses = harness.cluster.list_objects::<Ingress>(NAMESPACE);
    assert_eq!(ingresses.len(), 1);
    let rule = &ingresses[0].spec.as_ref().unwrap().rules.as_ref().unwrap()[0];
    assert_eq!(rule.host.as_deref(), Some("petclinic.default.apps.example.org"));

    let status = status(&harness, "petclinic");
    assert_eq!(
        status.url.as_deref(),
        Some("http://petclinic.default.apps.example.org")
    );
    assert!(status.ingress_ref.is_some());
    assert_eq!(condition(&status, "IngressReady"), ConditionStatus::True);
}

#[tokio::test]
async fn test_external_ingress_without_settings_fails() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::External))
        .unwrap();

    let err = reconciler(&harness)
        .reconcile(&key("petclinic"))
        .await
        .unwrap_err();

    assert!(matches!(&err, ReconcilerError::Store(e) if e.is_not_found()));
    assert!(harness.cluster.list_objects::<Ingress>(NAMESPACE).is_empty());
}

#[tokio::test]
async fn test_switching_to_cluster_local_removes_ingress() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness.cluster.seed(settings("apps.example.org")).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::External))
        .unwrap();
    let reconciler = reconciler(&harness);
    reconciler.reconcile(&key("petclinic")).await.unwrap();

    let mut parent: Deployer = harness.cluster.get_object(&key("petclinic")).unwrap();
    parent.spec.ingress_policy = IngressPolicy::ClusterLocal;
    harness.context.store::<Deployer>().update(&parent).await.unwrap();

    reconciler.reconcile(&key("petclinic")).await.unwrap();

    assert!(harness.cluster.list_objects::<Ingress>(NAMESPACE).is_empty());
    let status = status(&harness, "petclinic");
    assert!(status.url.is_none());
    assert!(status.ingress_ref.is_none());
    assert_eq!(status.observed_generation, Some(2));
}

#[tokio::test]
async fn test_foreign_service_is_not_owned() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness
        .cluster
        .seed(Service {
            metadata: meta("petclinic"),
            ..Default::default()
        })
        .unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();

    reconciler(&harness).reconcile(&key("petclinic")).await.unwrap();

    let status = status(&harness, "petclinic");
    let service_ready = status.get_condition("ServiceReady").unwrap();
    assert_eq!(service_ready.status, ConditionStatus::False);
    assert_eq!(service_ready.reason.as_deref(), Some("NotOwned"));
    assert_eq!(
        service_ready.message.as_deref(),
        Some("There is an existing Service \"petclinic\" that the Deployer does not own.")
    );
    assert_eq!(condition(&status, "Ready"), ConditionStatus::False);
    assert!(status.service_ref.is_none());

    let touched_service = harness
        .cluster
        .writes()
        .into_iter()
        .any(|a| a.kind == "Service" && matches!(a.verb, Verb::Update | Verb::Delete));
    assert!(!touched_service);
    assert!(harness.recorder.reasons().contains(&"CreationFailed".to_string()));
}

#[tokio::test]
async fn test_own_uncached_service_is_retried() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    let parent = harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();
    let mut service_meta = meta("petclinic");
    service_meta.owner_references = parent.controller_owner_ref(&()).map(|r| vec![r]);
    harness
        .cluster
        .seed_uncached(Service {
            metadata: service_meta,
            ..Default::default()
        })
        .unwrap();

    let err = reconciler(&harness)
        .reconcile(&key("petclinic"))
        .await
        .unwrap_err();

    assert!(err.already_exists_name().is_some());
    let status = status(&harness, "petclinic");
    assert_eq!(condition(&status, "ServiceReady"), ConditionStatus::Unknown);
    assert_eq!(status.observed_generation, None);
    assert!(status.deployment_ref.is_some());
}

#[tokio::test]
async fn test_deployment_create_failure_stops_chain() {
    let harness = Harness::new();
    harness.cluster.seed(application("petclinic", Some(IMAGE))).unwrap();
    harness
        .cluster
        .seed(deployer("petclinic", IngressPolicy::ClusterLocal))
        .unwrap();
    harness
        .cluster
        .fail_on(Verb::Create, "Deployment", "exceeded quota");

    let err = reconciler(&harness)
        .reconcile(&key("petclinic"))
        .await
        .unwrap_err();

    assert!(err.to_string().contains("exceeded quota"));
    assert!(harness.cluster.list_objects::<Service>(NAMESPACE).is_empty());
    let status = status(&harness, "petclinic");
    assert_eq!(status.latest_image.as_deref(), Some(IMAGE));
    assert_eq!(status.observed_generation, None);
}
