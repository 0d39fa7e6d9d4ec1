//! # Deployer Controller
//!
//! The Deployer parent wired onto the generic engine:
//!
//! 1. `BuildRef` resolves the image to run
//! 2. the Deployment child runs it
//! 3. the Service child exposes it inside the cluster
//! 4. `Settings` resolves the ingress domain when exposure is External
//! 5. the Ingress child exposes it outside the cluster

mod build_ref;
mod children;
mod settings;

pub use build_ref::BuildRefSync;
pub use children::{DeploymentChild, IngressChild, ServiceChild};
pub use settings::{SettingsSync, INGRESS_DOMAIN};

use crate::constants::DEPLOYER_LABEL_KEY;
use crate::controller::reconciler::{
    ChildReconciler, ParentReconciler, ReconcilerContext, SubReconciler, SyncReconciler,
};
use crate::crd::Deployer;
use kube::Resource;
use std::collections::BTreeMap;

/// Build the reconciler for Deployers
///
/// `system_namespace` holds the cluster-wide settings ConfigMap.
pub fn deployer_reconciler(
    context: ReconcilerContext,
    system_namespace: &str,
) -> ParentReconciler<Deployer> {
    let reconcilers: Vec<Box<dyn SubReconciler<Deployer>>> = vec![
        Box::new(SyncReconciler::new("BuildRef", BuildRefSync::new(&context))),
        Box::new(ChildReconciler::new(&context, DeploymentChild)),
        Box::new(ChildReconciler::new(&context, ServiceChild)),
        Box::new(SyncReconciler::new(
            "Settings",
            SettingsSync::new(&context, system_namespace),
        )),
        Box::new(ChildReconciler::new(&context, IngressChild)),
    ];
    ParentReconciler::new(context, reconcilers)
}

/// The parent's labels plus the label selecting its workload
fn deployer_labels(parent: &Deployer) -> BTreeMap<String, String> {
    let mut labels = parent.meta().labels.clone().unwrap_or_default();
    labels.insert(DEPLOYER_LABEL_KEY.to_string(), parent.meta().name.clone().unwrap_or_default());
    labels
}

fn deployer_selector(parent: &Deployer) -> BTreeMap<String, String> {
    BTreeMap::from([(
        DEPLOYER_LABEL_KEY.to_string(),
        parent.meta().name.clone().unwrap_or_default(),
    )])
}
