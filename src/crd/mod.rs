//! # Custom Resource Definitions
//!
//! - `condition.rs` - Tri-state conditions and living condition sets
//! - `deployer.rs` - The `Deployer` parent resource and its status lifecycle
//! - `source.rs` - Build sources (`Application`, `Container`, `Function`) a Deployer can reference

mod condition;
mod deployer;
mod source;

pub use condition::{
    Condition, ConditionManager, ConditionSet, ConditionStatus, CONDITION_READY,
};
pub use deployer::{
    Addressable, Build, Deployer, DeployerSpec, DeployerStatus, IngressPolicy,
    TypedLocalObjectReference, DEPLOYER_CONDITIONS, DEPLOYER_CONDITION_DEPLOYMENT_READY,
    DEPLOYER_CONDITION_INGRESS_READY, DEPLOYER_CONDITION_SERVICE_READY,
};
pub use source::{
    Application, ApplicationSpec, BuildStatus, Container, ContainerSpec, Function, FunctionSpec,
    LatestImage,
};
