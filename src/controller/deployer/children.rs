//! Deployment, Service and Ingress children of a Deployer.

use super::settings::INGRESS_DOMAIN;
use super::{deployer_labels, deployer_selector};
use crate::controller::reconciler::{ChildStrategy, ParentResource, ReconcilerError};
use crate::controller::stash::Stash;
use crate::crd::{Addressable, Deployer, IngressPolicy, TypedLocalObjectReference};
use anyhow::anyhow;
use async_trait::async_trait;
use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ContainerPort, EnvVar, Probe, Service, ServicePort, ServiceSpec, TCPSocketAction,
};
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend, IngressRule,
    IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::Resource;
use serde_json::Value;

fn target_port(parent: &Deployer) -> Result<ContainerPort, ReconcilerError> {
    parent
        .target_port()
        .cloned()
        .ok_or_else(|| anyhow!("deployer template has no container port").into())
}

/// Runs the resolved image
#[derive(Debug, Clone, Copy, Default)]
pub struct DeploymentChild;

#[async_trait]
impl ChildStrategy<Deployer, Deployment> for DeploymentChild {
    async fn desired_child(
        &self,
        _stash: &Stash,
        parent: &Deployer,
    ) -> Result<Option<Deployment>, ReconcilerError> {
        let Some(latest_image) = parent.status().and_then(|s| s.latest_image.clone()) else {
            // nothing to run yet
            return Ok(None);
        };
        let port = target_port(parent)?;
        let labels = deployer_labels(parent);

        let mut template = parent.spec.template.clone().unwrap_or_default();
        let template_meta = template.metadata.get_or_insert_with(ObjectMeta::default);
        let mut template_labels = template_meta.labels.clone().unwrap_or_default();
        template_labels.extend(labels.clone());
        template_meta.labels = Some(template_labels);

        let pod_spec = template.spec.get_or_insert_with(Default::default);
        let Some(container) = pod_spec.containers.first_mut() else {
            return Err(anyhow!("deployer template has no container").into());
        };
        container.env.get_or_insert_with(Vec::new).push(EnvVar {
            name: "PORT".to_string(),
            value: Some(port.container_port.to_string()),
            ..Default::default()
        });
        if container.readiness_probe.is_none() {
            container.readiness_probe = Some(Probe {
                tcp_socket: Some(TCPSocketAction {
                    host: None,
                    port: IntOrString::Int(port.container_port),
                }),
                ..Default::default()
            });
        }
        if container.image.as_deref().unwrap_or_default().is_empty() {
            container.image = Some(latest_image);
        }

        Ok(Some(Deployment {
            metadata: ObjectMeta {
                generate_name: Some(format!(
                    "{}-deployer-",
                    parent.meta().name.as_deref().unwrap_or_default()
                )),
                namespace: parent.meta().namespace.clone(),
                labels: Some(labels),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                selector: LabelSelector {
                    match_labels: Some(deployer_selector(parent)),
                    ..Default::default()
                },
                template,
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    fn reflect_child_status_on_parent(
        &self,
        parent: &mut Deployer,
        child: Option<&Deployment>,
        err: Option<&ReconcilerError>,
    ) {
        if err.is_some() {
            return;
        }
        let status = parent.status_mut();
        match child {
            None => status.deployment_ref = None,
            Some(child) => {
                status.deployment_ref = Some(TypedLocalObjectReference::for_object(child));
                status.propagate_deployment_status(child.status.as_ref());
            }
        }
    }

    fn harmonize_immutable_fields(&self, current: &Deployment, desired: &mut Deployment) {
        // replicas belong to whoever scales the workload
        if let Some(spec) = desired.spec.as_mut() {
            spec.replicas = current.spec.as_ref().and_then(|s| s.replicas);
        }
    }

    fn merge_before_update(&self, current: &mut Deployment, desired: &Deployment) {
        current.metadata.labels = desired.metadata.labels.clone();
        current.spec = desired.spec.clone();
    }

    fn semantic_equals(&self, a: &Deployment, b: &Deployment) -> bool {
        a.spec == b.spec && a.metadata.labels == b.metadata.labels
    }

    fn sanitize(&self, child: &Deployment) -> Value {
        serde_json::to_value(&child.spec).unwrap_or(Value::Null)
    }
}

/// Exposes the Deployment inside the cluster under the Deployer's name
#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceChild;

#[async_trait]
impl ChildStrategy<Deployer, Service> for ServiceChild {
    async fn desired_child(
        &self,
        _stash: &Stash,
        parent: &Deployer,
    ) -> Result<Option<Service>, ReconcilerError> {
        if !parent.status().is_some_and(|s| s.deployment_ref.is_some()) {
            return Ok(None);
        }
        let port = target_port(parent)?;

        Ok(Some(Service {
            metadata: ObjectMeta {
                name: parent.meta().name.clone(),
                namespace: parent.meta().namespace.clone(),
                labels: Some(deployer_labels(parent)),
                ..Default::default()
            },
            spec: Some(ServiceSpec {
                ports: Some(vec![ServicePort {
                    name: port.name.clone(),
                    port: 80,
                    target_port: Some(IntOrString::Int(port.container_port)),
                    ..Default::default()
                }]),
                selector: Some(deployer_selector(parent)),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    fn reflect_child_status_on_parent(
        &self,
        parent: &mut Deployer,
        child: Option<&Service>,
        err: Option<&ReconcilerError>,
    ) {
        let status = parent.status_mut();
        if let Some(err) = err {
            if let Some(name) = err.already_exists_name() {
                status.mark_service_not_owned(name);
            }
            return;
        }
        match child {
            None => {
                status.service_ref = None;
                status.address = None;
            }
            Some(child) => {
                status.service_ref = Some(TypedLocalObjectReference::for_object(child));
                status.address = Some(Addressable {
                    url: format!(
                        "http://{}.{}.svc.cluster.local",
                        child.meta().name.as_deref().unwrap_or_default(),
                        child.meta().namespace.as_deref().unwrap_or_default()
                    ),
                });
                status.propagate_service_status();
            }
        }
    }

    fn harmonize_immutable_fields(&self, current: &Service, desired: &mut Service) {
        let Some(current) = current.spec.as_ref() else {
            return;
        };
        if let Some(spec) = desired.spec.as_mut() {
            spec.cluster_ip = current.cluster_ip.clone();
            spec.cluster_ips = current.cluster_ips.clone();
        }
    }

    fn merge_before_update(&self, current: &mut Service, desired: &Service) {
        current.metadata.labels = desired.metadata.labels.clone();
        current.spec = desired.spec.clone();
    }

    fn semantic_equals(&self, a: &Service, b: &Service) -> bool {
        a.spec == b.spec && a.metadata.labels == b.metadata.labels
    }

    fn sanitize(&self, child: &Service) -> Value {
        serde_json::to_value(&child.spec).unwrap_or(Value::Null)
    }
}

/// Exposes the Service outside the cluster when the policy is External
#[derive(Debug, Clone, Copy, Default)]
pub struct IngressChild;

#[async_trait]
impl ChildStrategy<Deployer, Ingress> for IngressChild {
    async fn desired_child(
        &self,
        stash: &Stash,
        parent: &Deployer,
    ) -> Result<Option<Ingress>, ReconcilerError> {
        let service_name = match parent.status().and_then(|s| s.service_ref.as_ref()) {
            Some(service) if parent.spec.ingress_policy == IngressPolicy::External => {
                service.name.clone()
            }
            _ => return Ok(None),
        };
        let domain = stash
            .retrieve_value(INGRESS_DOMAIN)
            .ok_or_else(|| anyhow!("ingress domain was not resolved"))?;
        let name = parent.meta().name.as_deref().unwrap_or_default();
        let namespace = parent.meta().namespace.as_deref().unwrap_or_default();

        Ok(Some(Ingress {
            metadata: ObjectMeta {
                generate_name: Some(format!("{name}-deployer-")),
                namespace: parent.meta().namespace.clone(),
                labels: Some(deployer_labels(parent)),
                ..Default::default()
            },
            spec: Some(IngressSpec {
                rules: Some(vec![IngressRule {
                    host: Some(format!("{name}.{namespace}.{domain}")),
                    http: Some(HTTPIngressRuleValue {
                        paths: vec![HTTPIngressPath {
                            path: Some("/".to_string()),
                            path_type: "Prefix".to_string(),
                            backend: IngressBackend {
                                service: Some(IngressServiceBackend {
                                    name: service_name,
                                    port: Some(ServiceBackendPort {
                                        number: Some(80),
                                        ..Default::default()
                                    }),
                                }),
                                ..Default::default()
                            },
                        }],
                    }),
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }))
    }

    fn reflect_child_status_on_parent(
        &self,
        parent: &mut Deployer,
        child: Option<&Ingress>,
        err: Option<&ReconcilerError>,
    ) {
        if err.is_some() {
            return;
        }
        let cluster_local = parent.spec.ingress_policy == IngressPolicy::ClusterLocal;
        let status = parent.status_mut();
        match child {
            None => {
                status.ingress_ref = None;
                status.url = None;
                if cluster_local {
                    status.mark_ingress_not_required();
                }
            }
            Some(child) => {
                status.ingress_ref = Some(TypedLocalObjectReference::for_object(child));
                status.url = child
                    .spec
                    .as_ref()
                    .and_then(|s| s.rules.as_ref())
                    .and_then(|rules| rules.first())
                    .and_then(|rule| rule.host.as_ref())
                    .map(|host| format!("http://{host}"));
                status.propagate_ingress_status();
            }
        }
    }

    fn merge_before_update(&self, current: &mut Ingress, desired: &Ingress) {
        current.metadata.labels = desired.metadata.labels.clone();
        current.spec = desired.spec.clone();
    }

    fn semantic_equals(&self, a: &Ingress, b: &Ingress) -> bool {
        a.spec == b.spec && a.metadata.labels == b.metadata.labels
    }

    fn sanitize(&self, child: &Ingress) -> Value {
        serde_json::to_value(&child.spec).unwrap_or(Value::Null)
    }
}
