//! riff System Library
//!
//! Generic reconciliation engine for Kubernetes-style parent resources plus the
//! controllers and services built on it.
//!
//! ## Quick Start
//!
//! ```rust
//! use riff_system::prelude::*;
//! ```
//!
//! The engine lives in [`controller::reconciler`]; a parent kind is wired by
//! composing [`controller::reconciler::SyncReconciler`] and
//! [`controller::reconciler::ChildReconciler`] values into a
//! [`controller::reconciler::ParentReconciler`].

pub mod config;
pub mod constants;
pub mod controller;
pub mod crd;
pub mod observability;
pub mod prelude;
pub mod provisioner;
pub mod runtime;
pub mod store;
