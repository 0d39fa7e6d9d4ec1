//! # Topic Provisioner
//!
//! HTTP service that makes sure a topic exists for a stream:
//!
//! - `PUT /<namespace>/<name>` creates topic `<namespace>_<name>` and answers
//!   `201 Created` with `{"gateway": "<gateway>", "topic": "<namespace>_<name>"}`
//! - the same request for an existing topic answers `200 OK` with the same body
//! - any other path answers `400` with a plain-text usage message
//! - broker failures answer `500` with a plain-text error
//!
//! The broker is reached through [`TopicAdmin`].

mod admin;
mod handler;

pub use admin::{InMemoryTopicAdmin, ProvisionError, TopicAdmin};
pub use handler::{router, ProvisionerState, TopicAddress};
