//! HTTP handler of the provisioner.

use super::admin::TopicAdmin;
use crate::observability::metrics;
use axum::{
    extract::{OriginalUri, State},
    http::{Method, StatusCode},
    response::{IntoResponse, Json, Response},
    Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

const USAGE: &str = "URLs should be of the form /<namespace>/<stream-name>\n";

#[derive(Debug, Clone)]
pub struct ProvisionerState {
    pub admin: Arc<dyn TopicAdmin>,
    /// Address clients use to reach the topic
    pub gateway: String,
    pub partitions: i32,
}

/// Response body of a successful provisioning request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicAddress {
    pub gateway: String,
    pub topic: String,
}

pub fn router(state: ProvisionerState) -> Router {
    Router::new()
        .fallback(provision)
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// `namespace_name` for a `/namespace/name` path
///
/// The path is percent-decoded before it is split, so an encoded `/` counts
/// as a separator.
fn topic_name(path: &str) -> Option<String> {
    let path = urlencoding::decode(path).ok()?;
    let segments: Vec<&str> = path.trim_start_matches('/').split('/').collect();
    match segments.as_slice() {
        [namespace, name] if !namespace.is_empty() && !name.is_empty() => {
            Some(format!("{namespace}_{name}"))
        }
        _ => None,
    }
}

fn plain_text(status: StatusCode, body: String) -> Response {
    (status, [("content-type", "text/plain; charset=utf-8")], body).into_response()
}

async fn provision(
    State(state): State<Arc<ProvisionerState>>,
    method: Method,
    OriginalUri(uri): OriginalUri,
) -> Response {
    if method != Method::PUT {
        return StatusCode::METHOD_NOT_ALLOWED.into_response();
    }
    let Some(topic) = topic_name(uri.path()) else {
        metrics::increment_topics_provisioned("invalid");
        return plain_text(StatusCode::BAD_REQUEST, USAGE.to_string());
    };
    let address = TopicAddress {
        gateway: state.gateway.clone(),
        topic: topic.clone(),
    };

    match state.admin.topic_exists(&topic).await {
        Ok(true) => {
            metrics::increment_topics_provisioned("exists");
            return (StatusCode::OK, Json(address)).into_response();
        }
        Ok(false) => {}
        Err(e) => {
            error!(topic = %topic, "Unable to list topics: {}", e);
            metrics::increment_topics_provisioned("error");
            return plain_text(
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("Error trying to list topics to see if \"{topic}\" exists: {e}\n"),
            );
        }
    }

    if let Err(e) = state.admin.create_topic(&topic, state.partitions).await {
        error!(topic = %topic, "Unable to create topic: {}", e);
        metrics::increment_topics_provisioned("error");
        return plain_text(
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("Error creating topic \"{topic}\": {e}\n"),
        );
    }
    info!(topic = %topic, partitions = state.partitions, "Created topic");
    metrics::increment_topics_provisioned("created");
    (StatusCode::CREATED, Json(address)).into_response()
}
