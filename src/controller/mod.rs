//! # Controller
//!
//! - `reconciler`: the generic reconciliation engine
//! - `tracker`, `enqueue`: re-reconcile parents when tracked objects change
//! - `stash`: request-scoped values shared along a reconcile pass
//! - `index`: controller owner identity and lookup
//! - `events`: event recording for parents
//! - `deployer`: Deployer wiring of the engine
//! - `backoff`: Fibonacci backoff for failed passes
//! - `server`: HTTP server for metrics and health checks

pub mod backoff;
pub mod deployer;
pub mod enqueue;
pub mod events;
pub mod index;
pub mod reconciler;
pub mod server;
pub mod stash;
pub mod tracker;
