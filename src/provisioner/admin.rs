//! Broker administration used by the provisioner.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The broker answered with an error
    #[error("{0}")]
    Broker(String),
    #[error("{0}")]
    Unavailable(String),
}

#[async_trait]
pub trait TopicAdmin: Send + Sync + fmt::Debug {
    async fn topic_exists(&self, topic: &str) -> Result<bool, ProvisionError>;

    async fn create_topic(&self, topic: &str, partitions: i32) -> Result<(), ProvisionError>;
}

/// Broker kept in memory, with switchable failures
#[derive(Debug, Default)]
pub struct InMemoryTopicAdmin {
    state: Mutex<AdminState>,
}

#[derive(Debug, Default)]
struct AdminState {
    topics: BTreeMap<String, i32>,
    list_failure: Option<String>,
    create_failure: Option<String>,
}

impl InMemoryTopicAdmin {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> std::sync::MutexGuard<'_, AdminState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Topics and their partition counts
    #[must_use]
    pub fn topics(&self) -> BTreeMap<String, i32> {
        self.state().topics.clone()
    }

    /// Make every existence check fail with `message`
    pub fn fail_listing(&self, message: impl Into<String>) {
        self.state().list_failure = Some(message.into());
    }

    /// Make every creation fail with `message`
    pub fn fail_creation(&self, message: impl Into<String>) {
        self.state().create_failure = Some(message.into());
    }
}

#[async_trait]
impl TopicAdmin for InMemoryTopicAdmin {
    async fn topic_exists(&self, topic: &str) -> Result<bool, ProvisionError> {
        let state = self.state();
        if let Some(message) = &state.list_failure {
            return Err(ProvisionError::Unavailable(message.clone()));
        }
        Ok(state.topics.contains_key(topic))
    }

    async fn create_topic(&self, topic: &str, partitions: i32) -> Result<(), ProvisionError> {
        let mut state = self.state();
        if let Some(message) = &state.create_failure {
            return Err(ProvisionError::Broker(message.clone()));
        }
        if state.topics.contains_key(topic) {
            return Err(ProvisionError::Broker(format!("topic \"{topic}\" already exists")));
        }
        state.topics.insert(topic.to_string(), partitions);
        Ok(())
    }
}
