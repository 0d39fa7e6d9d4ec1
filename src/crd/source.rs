//! # Build Sources
//!
//! Resources that produce container images. A Deployer follows the
//! `latestImage` a source reports on its status.

use super::condition::Condition;
use serde::{Deserialize, Serialize};

/// Status shared by every build source
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<Condition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    /// Most recent image built from this source
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latest_image: Option<String>,
}

/// Application built from source with buildpacks
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Application",
    group = "build.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "BuildStatus",
    shortname = "app",
    printcolumn = r#"{"name":"Latest Image", "type":"string", "jsonPath":".status.latestImage"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ApplicationSpec {
    /// Repository the built image is pushed to
    pub image: String,
}

/// Pre-built container image, resolved to a digest
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Container",
    group = "build.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "BuildStatus",
    printcolumn = r#"{"name":"Latest Image", "type":"string", "jsonPath":".status.latestImage"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct ContainerSpec {
    pub image: String,
}

/// Function built with a riff invoker
#[derive(kube::CustomResource, Debug, Clone, Default, PartialEq, Deserialize, Serialize, schemars::JsonSchema)]
#[kube(
    kind = "Function",
    group = "build.projectriff.io",
    version = "v1alpha1",
    namespaced,
    status = "BuildStatus",
    shortname = "fn",
    printcolumn = r#"{"name":"Latest Image", "type":"string", "jsonPath":".status.latestImage"}, {"name":"Ready", "type":"string", "jsonPath":".status.conditions[?(@.type==\"Ready\")].status"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct FunctionSpec {
    pub image: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub handler: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub invoker: Option<String>,
}

/// A resource that reports the image it last built
pub trait LatestImage {
    /// `None` until a build has completed
    fn latest_image(&self) -> Option<&str>;
}

macro_rules! impl_latest_image {
    ($($kind:ty),*) => {
        $(
            impl LatestImage for $kind {
                fn latest_image(&self) -> Option<&str> {
                    self.status
                        .as_ref()
                        .and_then(|s| s.latest_image.as_deref())
                        .filter(|image| !image.is_empty())
                }
            }
        )*
    };
}

impl_latest_image!(Application, Container, Function);
