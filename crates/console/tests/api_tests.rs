//! Integration tests for the console API endpoints

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use fleet_console::{
    api::{create_router, AppState},
    sessions::SessionBoard,
};
use fleet_core::{
    command::{Command, CommandDispatcher, DispatchConfig},
    convergence::PollPolicy,
    error::SourceError,
    health::{components, HealthRegistry},
    models::{EntityIdentity, EntityKind, InventoryRecord, LiveRecord, Reachability},
    observability::AuditLogger,
    reconcile::Reconciler,
    source::{CommandAck, CommandBackend, InventorySource, LiveSource},
};
use futures_util::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tower::ServiceExt;

/// Backend serving fixed inventory and live records
struct FakeBackend {
    inventory: Vec<InventoryRecord>,
    live: Mutex<Vec<LiveRecord>>,
    inventory_down: AtomicBool,
}

#[async_trait]
impl InventorySource for FakeBackend {
    async fn list_inventory(&self, kind: EntityKind) -> Result<Vec<InventoryRecord>, SourceError> {
        if self.inventory_down.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("inventory offline".to_string()));
        }
        Ok(self
            .inventory
            .iter()
            .filter(|r| r.identity.kind == kind)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl LiveSource for FakeBackend {
    async fn list_live(&self, kind: EntityKind) -> Result<Vec<LiveRecord>, SourceError> {
        Ok(self
            .live
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.identity.kind == kind)
            .cloned()
            .collect())
    }
}

#[async_trait]
impl CommandBackend for FakeBackend {
    async fn execute(
        &self,
        identity: &EntityIdentity,
        command: &Command,
    ) -> Result<CommandAck, SourceError> {
        if let Command::Scale { replicas } = command {
            let mut live = self.live.lock().unwrap();
            for record in live.iter_mut().filter(|r| &r.identity == identity) {
                *record = LiveRecord::new(identity.clone()).with_replicas(*replicas, *replicas);
            }
        }
        Ok(CommandAck::default())
    }
}

fn web() -> EntityIdentity {
    EntityIdentity::namespaced(EntityKind::Deployment, "shop", "web")
}

async fn setup_test_app() -> (Router, Arc<AppState>, Arc<FakeBackend>) {
    let backend = Arc::new(FakeBackend {
        inventory: vec![
            InventoryRecord::new(EntityIdentity::node("n1"), Reachability::Online),
            InventoryRecord::new(EntityIdentity::node("n2"), Reachability::Offline),
        ],
        live: Mutex::new(vec![
            LiveRecord::new(EntityIdentity::node("n1")).with_status("Ready"),
            LiveRecord::new(web()).with_replicas(2, 2),
        ]),
        inventory_down: AtomicBool::new(false),
    });

    let health_registry = HealthRegistry::with_console_components().await;
    let reconciler = Arc::new(
        Reconciler::builder()
            .sources(backend.clone())
            .health(health_registry.clone())
            .build()
            .unwrap(),
    );
    let dispatcher = Arc::new(
        CommandDispatcher::builder()
            .backend(backend.clone())
            .reconciler(reconciler.clone())
            .config(DispatchConfig {
                poll_policy: PollPolicy::default()
                    .with_interval(Duration::from_millis(5))
                    .with_max_attempts(20),
                ..DispatchConfig::default()
            })
            .build()
            .unwrap(),
    );

    let state = Arc::new(AppState::new(
        health_registry,
        reconciler,
        dispatcher,
        SessionBoard::new(AuditLogger::new("test")),
    ));
    let router = create_router(state.clone());

    (router, state, backend)
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_get_stream_returns_reconciled_views() {
    let (app, _state, _backend) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/streams/nodes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);

    let stream = body_json(response).await;
    assert_eq!(stream["kind"], "node");
    assert_eq!(stream["epoch"], 1);
    assert_eq!(stream["liveAvailable"], true);

    let views = stream["views"].as_array().unwrap();
    assert_eq!(views.len(), 2);
    assert_eq!(views[0]["status"], "ONLINE_REGISTERED_READY");
    assert_eq!(views[1]["status"], "OFFLINE");
}

#[tokio::test]
async fn test_get_stream_unknown_kind_is_not_found() {
    let (app, _state, _backend) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/streams/replicasets")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_reload_failure_keeps_last_good_set() {
    let (app, state, backend) = setup_test_app().await;
    state.reconciler.load(EntityKind::Node).await;

    backend.inventory_down.store(true, Ordering::SeqCst);
    let response = app
        .clone()
        .oneshot(post_json("/api/v1/streams/nodes/reload", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/streams/nodes")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let stream = body_json(response).await;

    assert_eq!(stream["epoch"], 1);
    assert_eq!(stream["views"].as_array().unwrap().len(), 2);
    assert!(stream["error"].as_str().unwrap().contains("inventory offline"));

    let health = state.health_registry.health().await;
    assert!(health.components[components::INVENTORY_SOURCE].message.is_some());
}

#[tokio::test]
async fn test_scale_command_is_tracked_on_session_board() {
    let (app, state, _backend) = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/v1/commands",
            serde_json::json!({
                "identity": {"kind": "deployment", "namespace": "shop", "name": "web"},
                "command": {"command": "scale", "replicas": 4}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let accepted = body_json(response).await;
    assert_eq!(accepted["command"], "scale");
    assert_eq!(accepted["converging"], true);
    let session_id = accepted["sessionId"].as_u64().expect("session id is returned");

    let mut settled = None;
    for _ in 0..100 {
        if let Some(report) = state.sessions.get(&web()) {
            if report.state.is_terminal() {
                settled = Some(report);
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    let report = settled.expect("session should settle");
    assert_eq!(report.success, Some(true));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/sessions")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    let board = body_json(response).await;
    assert_eq!(board[0]["sessionId"], session_id);
    assert_eq!(board[0]["state"], "ready");
    assert_eq!(board[0]["status"], "Ready (4/4 ready)");
}

#[tokio::test]
async fn test_stream_index_lists_loaded_streams() {
    let (app, state, backend) = setup_test_app().await;
    state.reconciler.load(EntityKind::Node).await;
    state.reconciler.load(EntityKind::Deployment).await;
    backend.inventory_down.store(true, Ordering::SeqCst);
    state.reconciler.load(EntityKind::Node).await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/streams")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let index = body_json(response).await;
    let index = index.as_array().unwrap();
    assert_eq!(index.len(), 2);
    assert_eq!(index[0]["kind"], "deployment");
    assert_eq!(index[0]["entities"], 1);
    assert!(index[0].get("error").is_none());
    assert_eq!(index[1]["kind"], "node");
    assert_eq!(index[1]["epoch"], 1);
    assert!(index[1]["error"].as_str().unwrap().contains("inventory offline"));
}

#[tokio::test]
async fn test_events_feed_reports_commits() {
    let (app, state, _backend) = setup_test_app().await;

    let response = app
        .oneshot(
            Request::builder()
                .uri("/api/v1/events")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()["content-type"],
        "text/event-stream"
    );

    state.reconciler.load(EntityKind::Node).await;

    let mut body = response.into_body().into_data_stream();
    let chunk = tokio::time::timeout(Duration::from_secs(2), body.next())
        .await
        .expect("commit event should arrive")
        .unwrap()
        .unwrap();
    let text = String::from_utf8(chunk.to_vec()).unwrap();

    assert!(text.contains("event: commit"));
    assert!(text.contains(r#""kind":"node""#));
    assert!(text.contains(r#""entities":2"#));
}

#[tokio::test]
async fn test_protected_namespace_command_is_forbidden() {
    let (app, _state, _backend) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/commands",
            serde_json::json!({
                "identity": {"kind": "pod", "namespace": "kube-system", "name": "coredns-1"},
                "command": {"command": "delete"}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
    let body = body_json(response).await;
    assert_eq!(body["code"], "POLICY_DENIED");
}

#[tokio::test]
async fn test_unsupported_command_is_unprocessable() {
    let (app, _state, _backend) = setup_test_app().await;

    let response = app
        .oneshot(post_json(
            "/api/v1/commands",
            serde_json::json!({
                "identity": {"kind": "pod", "namespace": "shop", "name": "web-1"},
                "command": {"command": "scale", "replicas": 2}
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn test_readyz_after_first_load() {
    let (app, state, _backend) = setup_test_app().await;

    let response = app
        .clone()
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);

    state.reconciler.load(EntityKind::Node).await;

    let response = app
        .oneshot(Request::builder().uri("/readyz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_healthz_degraded_is_still_ok() {
    let (app, state, _backend) = setup_test_app().await;
    state
        .health_registry
        .set_degraded(components::LIVE_SOURCE, "slow")
        .await;

    let response = app
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let health = body_json(response).await;
    assert_eq!(health["status"], "degraded");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let (app, state, _backend) = setup_test_app().await;
    state.reconciler.load(EntityKind::Node).await;

    let response = app
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let text = String::from_utf8(body.to_vec()).unwrap();
    assert!(text.contains("fleet_console_stream_loads_total"));
}
