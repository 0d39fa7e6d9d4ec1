//! # Events
//!
//! Human-readable trail of what the engine did to a parent and its children.
//! Events are best effort: a failure to publish is logged and dropped.

use crate::constants::CONTROLLER_NAME;
use async_trait::async_trait;
use k8s_openapi::api::core::v1::ObjectReference;
use kube::runtime::events::{self as kube_events, Recorder, Reporter};
use kube::Client;
use std::fmt;
use std::sync::{Mutex, PoisonError};
use tracing::warn;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    Normal,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub type_: EventType,
    pub reason: String,
    pub message: String,
}

impl Event {
    pub fn normal(reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Normal,
            reason: reason.to_string(),
            message: message.into(),
        }
    }

    pub fn warning(reason: &str, message: impl Into<String>) -> Self {
        Self {
            type_: EventType::Warning,
            reason: reason.to_string(),
            message: message.into(),
        }
    }
}

#[async_trait]
pub trait EventRecorder: Send + Sync + fmt::Debug {
    async fn record(&self, regarding: &ObjectReference, event: Event);
}

/// Publishes events through the Kubernetes events API
pub struct KubeEventRecorder {
    recorder: Recorder,
}

impl fmt::Debug for KubeEventRecorder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeEventRecorder").finish_non_exhaustive()
    }
}

impl KubeEventRecorder {
    #[must_use]
    pub fn new(client: Client) -> Self {
        let reporter = Reporter {
            controller: CONTROLLER_NAME.to_string(),
            instance: std::env::var("POD_NAME").ok(),
        };
        Self {
            recorder: Recorder::new(client, reporter),
        }
    }
}

#[async_trait]
impl EventRecorder for KubeEventRecorder {
    async fn record(&self, regarding: &ObjectReference, event: Event) {
        let kube_event = kube_events::Event {
            type_: match event.type_ {
                EventType::Normal => kube_events::EventType::Normal,
                EventType::Warning => kube_events::EventType::Warning,
            },
            reason: event.reason.clone(),
            note: Some(event.message),
            action: "Reconcile".to_string(),
            secondary: None,
        };
        if let Err(e) = self.recorder.publish(&kube_event, regarding).await {
            warn!(
                reason = %event.reason,
                object = regarding.name.as_deref().unwrap_or_default(),
                "Failed to publish event: {}",
                e
            );
        }
    }
}

/// Keeps events in memory for assertions
#[derive(Debug, Default)]
pub struct InMemoryEventRecorder {
    events: Mutex<Vec<Event>>,
}

impl InMemoryEventRecorder {
    #[must_use]
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Reasons of recorded events, in order
    #[must_use]
    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventRecorder for InMemoryEventRecorder {
    async fn record(&self, _regarding: &ObjectReference, event: Event) {
        self.events
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(event);
    }
}
