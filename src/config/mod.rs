//! # Configuration
//!
//! Controller and server settings loaded from environment variables.

mod controller;
mod server;

pub use controller::ControllerConfig;
pub use server::ServerConfig;
