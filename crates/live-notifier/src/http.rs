//! HTTP surface.
//!
//! - `POST /v1/commands` - execute a command for a destination
//! - `GET /health`, `GET /ready` - see [`crate::observability::health`]
//! - `GET /metrics` - Prometheus scrape endpoint

use crate::commands::{Command, CommandContext, CommandReply, CommandService};
use crate::errors::NotifierError;
use crate::observability::{health_router, HealthState};
use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use common::types::DestinationId;
use metrics_exporter_prometheus::PrometheusHandle;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{debug, instrument};

/// Body of `POST /v1/commands`.
#[derive(Debug, Deserialize)]
pub struct CommandRequest {
    /// Destination the command was issued from.
    pub destination: String,
    /// Invoking user.
    pub invoker: String,
    #[serde(flatten)]
    pub command: Command,
}

/// Successful command response.
#[derive(Debug, Serialize)]
pub struct CommandResponse {
    /// Chat-ready rendering of the reply.
    pub text: String,
    #[serde(flatten)]
    pub reply: CommandReply,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Serialize)]
struct ErrorDetail {
    status: u16,
    message: String,
}

impl IntoResponse for NotifierError {
    fn into_response(self) -> Response {
        let status =
            StatusCode::from_u16(self.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let body = ErrorBody {
            error: ErrorDetail {
                status: status.as_u16(),
                message: self.client_message(),
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Build the HTTP router.
pub fn router(
    commands: CommandService,
    health_state: Arc<HealthState>,
    prometheus: PrometheusHandle,
) -> Router {
    let command_router = Router::new()
        .route("/v1/commands", post(command_handler))
        .with_state(commands);

    let metrics_router = Router::new()
        .route("/metrics", get(metrics_handler))
        .with_state(prometheus);

    command_router
        .merge(health_router(health_state))
        .merge(metrics_router)
        .layer(TraceLayer::new_for_http())
}

#[instrument(skip_all, name = "notifier.http.command")]
async fn command_handler(
    State(commands): State<CommandService>,
    payload: Result<Json<CommandRequest>, JsonRejection>,
) -> Result<Json<CommandResponse>, NotifierError> {
    let Json(request) = payload.map_err(|e| NotifierError::InvalidRequest(e.body_text()))?;

    let destination = DestinationId::new(request.destination)
        .map_err(|e| NotifierError::InvalidRequest(e.to_string()))?;
    debug!(
        target: "notifier.commands",
        destination = %destination,
        command = request.command.name(),
        "Command received"
    );

    let ctx = CommandContext {
        destination,
        invoker: request.invoker,
    };
    let reply = commands.execute(&ctx, request.command).await?;

    Ok(Json(CommandResponse {
        text: reply.text(),
        reply,
    }))
}

#[instrument(skip_all, name = "notifier.metrics.scrape")]
async fn metrics_handler(State(handle): State<PrometheusHandle>) -> impl IntoResponse {
    handle.render()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::actors::{ActorMetrics, ConnectionSupervisor, SupervisorConfig};
    use crate::clients::{NameResolver, StreamClient, StreamLink};
    use crate::errors::{ResolveError, StreamError};
    use crate::persistence::PersistenceManager;
    use crate::registry::SubscriptionRegistry;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use common::types::RoomId;
    use http_body_util::BodyExt;
    use metrics_exporter_prometheus::PrometheusBuilder;
    use serde_json::{json, Value};
    use tokio::sync::mpsc;
    use tower::util::ServiceExt;

    struct Offline;

    #[async_trait]
    impl StreamClient for Offline {
        async fn connect(&self, _room_id: RoomId) -> Result<Box<dyn StreamLink>, StreamError> {
            Err(StreamError::Connect("offline".to_string()))
        }

        async fn check_live(&self, _room_id: RoomId) -> Result<bool, StreamError> {
            Ok(false)
        }
    }

    struct Names;

    #[async_trait]
    impl NameResolver for Names {
        async fn resolve_name(&self, room_id: RoomId) -> Result<String, ResolveError> {
            Ok(format!("Streamer {room_id}"))
        }
    }

    async fn app(dir: &tempfile::TempDir) -> Router {
        let registry = Arc::new(
            SubscriptionRegistry::open(PersistenceManager::new(dir.path().join("data.json"))).await,
        );
        let (notify_tx, _notify_rx) = mpsc::channel(16);
        let (supervisor, _task) = ConnectionSupervisor::spawn(
            SupervisorConfig::default(),
            Arc::new(Offline),
            notify_tx,
            ActorMetrics::new(),
        );
        let commands = CommandService::new(registry, supervisor, Arc::new(Names));
        let prometheus = PrometheusBuilder::new().build_recorder().handle();
        router(commands, Arc::new(HealthState::new()), prometheus)
    }

    async fn post(app: &Router, body: Value) -> (StatusCode, Value) {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/v1/commands")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_add_and_subscribe_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let (status, body) = post(
            &app,
            json!({"destination": "group:1", "invoker": "u1", "command": "add", "room_id": 42}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "room_added");
        assert_eq!(body["name"], "Streamer 42");
        assert!(body["text"].as_str().unwrap().contains("Streamer 42"));

        let (status, body) = post(
            &app,
            json!({"destination": "group:1", "invoker": "u1", "command": "sub", "room_id": 42}),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["reply"], "subscribed");
    }

    #[tokio::test]
    async fn test_errors_map_to_status_codes() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let (status, body) = post(
            &app,
            json!({"destination": "group:1", "invoker": "u1", "command": "sub", "room_id": 7}),
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["status"], 404);

        let (status, _) = post(
            &app,
            json!({"destination": "group:1", "invoker": "u1", "command": "unsub", "room_id": 7}),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_malformed_requests_are_bad_requests() {
        let dir = tempfile::tempdir().unwrap();
        let app = app(&dir).await;

        let (status, _) = post(
            &app,
            json!({"destination": "group:1", "invoker": "u1", "command": "dance"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (status, _) = post(
            &app,
            json!({"destination": "", "invoker": "u1", "command": "ls"}),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_metrics_endpoint_responds() {
        let dir = tempfile::tempdir().unwrap();
        let response = app(&dir)
            .await
            .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }
}
