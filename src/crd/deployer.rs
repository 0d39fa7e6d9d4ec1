//! # Deployer
//!
//! A Deployer runs the latest image of a build source (or a fixed image) as a
//! Deployment, exposes it through a Service and, when asked to, an Ingress.
//!
//! ```yaml
//! apiVersion: core.projectriff.io/v1alpha1
//! kind: Deployer
//! metadata:
//!   name: petclinic
//!   namespace: default
//! spec:
//!   build:
//!     applicationRef: petclinic
//!   ingressPolicy: External
//! ```

use super::condition::{Condition, ConditionSet, CONDITION_READY};
use crate::controller::reconciler::{ObjectStatus, ParentResource};
use k8s_openapi::api::apps::v1::DeploymentStatus;
use k8s_openapi::api::core::v1::{Container, ContainerPort, PodSpec, PodTemplateSpec};
use kube::Resource;
use schemars::{JsonSchema, Schema, SchemaGenerator};
use serde::{Deserialize, Serialize};

pub const DEPLOYER_CONDITION_DEPLOYMENT_READY: &str = "DeploymentReady";
pub const DEPLOYER_CONDITION_SERVICE_READY: &str = "ServiceReady";
pub const DEPLOYER_CONDITION_INGRESS_READY: &str = "IngressReady";

pub const DEPLOYER_CONDITIONS: ConditionSet = ConditionSet::living(&[
    DEPLOYER_CONDITION_DEPLOYMENT_READY,
    DEPLOYER_CONDITION_SERVICE_READY,
    DEPLOYER_CONDITION_INGRESS_READY,
]);

#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[kube(
    kind = "Deployer",
    group = "core.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "DeployerStatus",
    printcolumn = r#"{"name":"Type", "type":"string", "jsonPath":".status.deploymentRef.kind"}, {"name":"URL", "type":"string", "jsonPath":".status.url"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}, {"name":"Reason", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].reason"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DeployerSpec {
    /// Build source to follow for new images. Without one, the template's image is used as is.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build: Option<Build>,
    /// Pod template for the workload
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[schemars(schema_with = "pod_template_schema")]
    pub template: Option<PodTemplateSpec>,
    #[serde(default)]
    pub ingress_policy: IngressPolicy,
}

/// Reference to the build source of a Deployer; exactly one field is set
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Build {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub application_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub container_ref: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub function_ref: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub enum IngressPolicy {
    /// Reachable only from inside the cluster
    #[default]
    ClusterLocal,
    /// Reachable through an Ingress on the cluster's default domain
    External,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct TypedLocalObjectReference {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_group: Option<String>,
    pub kind: String,
    pub name: String,
}

impl TypedLocalObjectReference {
    pub fn for_object<K: Resource<DynamicType = ()>>(obj: &K) -> Self {
        let group = K::group(&());
        Self {
            api_group: (!group.is_empty()).then(|| group.into_owned()),
            kind: K::kind(&()).into_owned(),
            name: obj.meta().name.clone().unwrap_or_default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
pub struct Addressable {
    pub url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct DeployerStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deployment_ref: Option<TypedLocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub service_ref: Option<TypedLocalObjectReference>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ingress_ref: Option<TypedLocalObjectReference>,
    /// In-cluster address of the service
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub address: Option<Addressable>,
    /// External URL, set when an Ingress exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl DeployerStatus {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        let mut conditions = self.conditions.clone();
        DEPLOYER_CONDITIONS.manage(&mut conditions).is_happy()
    }

    #[must_use]
    pub fn get_condition(&self, type_: &str) -> Option<&Condition> {
        self.conditions.iter().find(|c| c.r#type == type_)
    }

    /// Map the Deployment's Available/Progressing conditions onto `DeploymentReady`
    ///
    /// Nothing changes until the Deployment reports both conditions.
    pub fn propagate_deployment_status(&mut self, status: Option<&DeploymentStatus>) {
        let conditions = status.and_then(|s| s.conditions.as_deref()).unwrap_or_default();
        let available = conditions.iter().find(|c| c.type_ == "Available");
        let progressing = conditions.iter().find(|c| c.type_ == "Progressing");
        let (Some(available), Some(progressing)) = (available, progressing) else {
            return;
        };

        let mut manager = DEPLOYER_CONDITIONS.manage(&mut self.conditions);
        if progressing.status == "True" && available.status == "False" {
            // still rolling out; not a failure yet
            manager.mark_unknown(
                DEPLOYER_CONDITION_DEPLOYMENT_READY,
                progressing.reason.clone().unwrap_or_default(),
                progressing.message.clone().unwrap_or_default(),
            );
            return;
        }
        match available.status.as_str() {
            "True" => manager.mark_true(DEPLOYER_CONDITION_DEPLOYMENT_READY),
            "False" => manager.mark_false(
                DEPLOYER_CONDITION_DEPLOYMENT_READY,
                available.reason.clone().unwrap_or_default(),
                available.message.clone().unwrap_or_default(),
            ),
            _ => manager.mark_unknown(
                DEPLOYER_CONDITION_DEPLOYMENT_READY,
                available.reason.clone().unwrap_or_default(),
                available.message.clone().unwrap_or_default(),
            ),
        }
    }

    /// Services carry no meaningful status, existing is enough
    pub fn propagate_service_status(&mut self) {
        DEPLOYER_CONDITIONS
            .manage(&mut self.conditions)
            .mark_true(DEPLOYER_CONDITION_SERVICE_READY);
    }

    pub fn mark_service_not_owned(&mut self, name: &str) {
        DEPLOYER_CONDITIONS.manage(&mut self.conditions).mark_false(
            DEPLOYER_CONDITION_SERVICE_READY,
            "NotOwned",
            format!("There is an existing Service \"{name}\" that the Deployer does not own."),
        );
    }

    /// Ingress status is not reported reliably, existing is enough
    pub fn propagate_ingress_status(&mut self) {
        DEPLOYER_CONDITIONS
            .manage(&mut self.conditions)
            .mark_true(DEPLOYER_CONDITION_INGRESS_READY);
    }

    pub fn mark_ingress_not_required(&mut self) {
        DEPLOYER_CONDITIONS
            .manage(&mut self.conditions)
            .mark_true(DEPLOYER_CONDITION_INGRESS_READY);
    }
}

impl ObjectStatus for DeployerStatus {
    fn initialize_conditions(&mut self) {
        DEPLOYER_CONDITIONS
            .manage(&mut self.conditions)
            .initialize_conditions();
    }

    fn set_observed_generation(&mut self, generation: Option<i64>) {
        self.observed_generation = generation;
    }
}

impl Deployer {
    /// First port of the first container, present once defaults are applied
    #[must_use]
    pub fn target_port(&self) -> Option<&ContainerPort> {
        self.spec
            .template
            .as_ref()?
            .spec
            .as_ref()?
            .containers
            .first()?
            .ports
            .as_ref()?
            .first()
    }

    /// The Ready condition of the status, if any
    #[must_use]
    pub fn ready_condition(&self) -> Option<&Condition> {
        self.status.as_ref()?.get_condition(CONDITION_READY)
    }
}

impl ParentResource for Deployer {
    type Status = DeployerStatus;

    fn status(&self) -> Option<&DeployerStatus> {
        self.status.as_ref()
    }

    fn status_mut(&mut self) -> &mut DeployerStatus {
        self.status.get_or_insert_with(DeployerStatus::default)
    }

    fn default_spec(&mut self) {
        let pod_spec = self
            .spec
            .template
            .get_or_insert_with(PodTemplateSpec::default)
            .spec
            .get_or_insert_with(PodSpec::default);
        if pod_spec.containers.is_empty() {
            pod_spec.containers.push(Container::default());
        }
        let ports = pod_spec.containers[0].ports.get_or_insert_with(Vec::new);
        if ports.is_empty() {
            ports.push(ContainerPort {
                name: Some("http".to_string()),
                container_port: 8080,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            });
        }
    }
}

fn pod_template_schema(_gen: &mut SchemaGenerator) -> Schema {
    // PodTemplateSpec is validated by the API server when the Deployment is written
    let schema_value = serde_json::json!({
        "type": "object",
        "x-kubernetes-preserve-unknown-fields": true
    });
    Schema::try_from(schema_value).expect("Failed to create Schema for PodTemplateSpec")
}
