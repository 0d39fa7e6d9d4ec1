//! # CRD Generator
//!
//! Prints the CustomResourceDefinitions reconciled or watched by the controller.
//!
//! ```bash
//! cargo run --bin crdgen > config/crds.yaml
//! cargo run --bin crdgen | kubectl apply -f -
//! ```

use kube::core::CustomResourceExt;
use riff_system::crd::{Application, Container, Deployer, Function};

fn main() {
    let crds = [
        Deployer::crd(),
        Application::crd(),
        Container::crd(),
        Function::crd(),
    ];

    for (i, crd) in crds.iter().enumerate() {
        match serde_yaml::to_string(crd) {
            Ok(yaml) => {
                if i > 0 {
                    println!("---");
                }
                print!("{}", yaml);
            }
            Err(e) => {
                eprintln!("Failed to serialize CRD to YAML: {}", e);
                std::process::exit(1);
            }
        }
    }
}
