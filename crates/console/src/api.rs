//! HTTP API of the fleet console
//!
//! Serves reconciled streams and their commit feed, accepts operator
//! commands, exposes the convergence board, and answers health, readiness
//! and metrics probes.

use crate::error::{ApiError, ApiResult};
use crate::sessions::{SessionBoard, SessionReport};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{
        sse::{Event, KeepAlive, Sse},
        IntoResponse,
    },
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use futures_util::stream::{self, Stream};
use fleet_core::command::{Command, CommandDispatcher, DispatchOutcome};
use fleet_core::health::{ComponentStatus, HealthRegistry};
use fleet_core::models::{EntityIdentity, EntityKind, ReconciledView};
use fleet_core::reconcile::{LoadOutcome, Reconciler};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::convert::Infallible;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub reconciler: Arc<Reconciler>,
    pub dispatcher: Arc<CommandDispatcher>,
    pub sessions: SessionBoard,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        reconciler: Arc<Reconciler>,
        dispatcher: Arc<CommandDispatcher>,
        sessions: SessionBoard,
    ) -> Self {
        Self {
            health_registry,
            reconciler,
            dispatcher,
            sessions,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub refresh: bool,
}

/// Snapshot of one stream
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamResponse {
    pub kind: EntityKind,
    /// Epoch of the committed set (0 if nothing was committed yet)
    pub epoch: u64,
    pub live_available: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub views: Vec<ReconciledView>,
}

/// One row of the stream index
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamSummary {
    pub kind: EntityKind,
    pub epoch: u64,
    pub entities: usize,
    pub live_available: bool,
    pub fetched_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReloadResponse {
    pub kind: EntityKind,
    pub outcome: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epoch: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CommandRequest {
    pub identity: EntityIdentity,
    pub command: Command,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResponse {
    pub identity: EntityIdentity,
    pub command: String,
    /// True when a convergence session was started
    pub converging: bool,
    /// Board id of that session
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

fn parse_kind(kind: &str) -> ApiResult<EntityKind> {
    kind.parse()
        .map_err(|e: fleet_core::models::ParseKindError| ApiError::NotFound(e.to_string()))
}

async fn get_stream(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Json<StreamResponse>> {
    let kind = parse_kind(&kind)?;

    if query.refresh || state.reconciler.snapshot(kind).is_none() {
        state.reconciler.load(kind).await;
    }

    let snapshot = state.reconciler.snapshot(kind).unwrap_or_default();
    let response = match snapshot.set {
        Some(set) => StreamResponse {
            kind,
            epoch: set.epoch,
            live_available: set.live_available,
            fetched_at: Some(set.fetched_at),
            error: snapshot.error,
            views: set.views.clone(),
        },
        None => StreamResponse {
            kind,
            epoch: 0,
            live_available: false,
            fetched_at: None,
            error: snapshot.error,
            views: Vec::new(),
        },
    };

    Ok(Json(response))
}

async fn list_streams(State(state): State<Arc<AppState>>) -> Json<Vec<StreamSummary>> {
    let summaries = state
        .reconciler
        .loaded_kinds()
        .into_iter()
        .filter_map(|kind| {
            let snapshot = state.reconciler.snapshot(kind)?;
            let set = snapshot.set.as_ref();
            Some(StreamSummary {
                kind,
                epoch: set.map(|s| s.epoch).unwrap_or(0),
                entities: set.map(|s| s.views.len()).unwrap_or(0),
                live_available: set.map(|s| s.live_available).unwrap_or(false),
                fetched_at: set.map(|s| s.fetched_at),
                error: snapshot.error,
            })
        })
        .collect();

    Json(summaries)
}

/// Server-sent events, one per committed stream set
async fn stream_updates(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let updates = state.reconciler.subscribe();

    let events = stream::unfold(updates, |mut updates| async move {
        match updates.recv().await {
            Ok(update) => {
                let event = Event::default()
                    .event("commit")
                    .json_data(&update)
                    .unwrap_or_else(|_| Event::default().comment("unencodable update"));
                Some((Ok(event), updates))
            }
            Err(RecvError::Lagged(skipped)) => {
                debug!(skipped, "Update subscriber lagged");
                Some((Ok(Event::default().comment("lagged")), updates))
            }
            Err(RecvError::Closed) => None,
        }
    });

    Sse::new(events).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(15))
            .text("ping"),
    )
}

async fn reload_stream(
    State(state): State<Arc<AppState>>,
    Path(kind): Path<String>,
) -> ApiResult<impl IntoResponse> {
    let kind = parse_kind(&kind)?;
    let outcome = state.reconciler.load(kind).await;

    let (status, response) = match &outcome {
        LoadOutcome::Applied(set) => (
            StatusCode::OK,
            ReloadResponse {
                kind,
                outcome: outcome.as_str().to_string(),
                epoch: Some(set.epoch),
                error: None,
            },
        ),
        LoadOutcome::Superseded => (
            StatusCode::OK,
            ReloadResponse {
                kind,
                outcome: outcome.as_str().to_string(),
                epoch: None,
                error: None,
            },
        ),
        LoadOutcome::Failed { error } => (
            StatusCode::BAD_GATEWAY,
            ReloadResponse {
                kind,
                outcome: outcome.as_str().to_string(),
                epoch: None,
                error: Some(error.clone()),
            },
        ),
    };

    Ok((status, Json(response)))
}

async fn dispatch_command(
    State(state): State<Arc<AppState>>,
    Json(request): Json<CommandRequest>,
) -> ApiResult<impl IntoResponse> {
    let name = request.command.name();
    info!(identity = %request.identity, command = %request.command, "Command requested");

    let outcome = state
        .dispatcher
        .dispatch(request.command, request.identity.clone())
        .await
        .map_err(|e| {
            warn!(identity = %request.identity, command = name, error = %e, "Command refused");
            ApiError::from(e)
        })?;

    let converging = outcome.is_converging();
    let message = outcome.ack().message.clone();
    let session_id = match outcome {
        DispatchOutcome::Converging { session, .. } => Some(state.sessions.track(name, session).0),
        DispatchOutcome::Applied { .. } => None,
    };

    Ok((
        StatusCode::ACCEPTED,
        Json(CommandResponse {
            identity: request.identity,
            command: name.to_string(),
            converging,
            session_id,
            message,
        }),
    ))
}

async fn list_sessions(State(state): State<Arc<AppState>>) -> Json<Vec<SessionReport>> {
    Json(state.sessions.list())
}

/// Health check: 200 while operational, 503 when a component is unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = match health.status {
        ComponentStatus::Healthy | ComponentStatus::Degraded => StatusCode::OK,
        ComponentStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> impl IntoResponse {
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&prometheus::gather(), &mut buffer) {
        warn!(error = %e, "Failed to encode metrics");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            [("content-type", "text/plain; charset=utf-8")],
            Vec::new(),
        );
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
}

pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/v1/streams", get(list_streams))
        .route("/api/v1/streams/:kind", get(get_stream))
        .route("/api/v1/streams/:kind/reload", post(reload_stream))
        .route("/api/v1/commands", post(dispatch_command))
        .route("/api/v1/sessions", get(list_sessions))
        .route("/api/v1/events", get(stream_updates))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .with_state(state)
}

pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting console API");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
