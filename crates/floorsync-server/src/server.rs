//! `HubServer`: Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::Router;
use axum::extract::State;
use axum::extract::ws::WebSocketUpgrade;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use floorsync_core::{ApplicationMessage, PresenceSnapshot};
use metrics::counter;
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::json;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::config::HubConfig;
use crate::errors::ServerError;
use crate::health::{self, HealthResponse};
use crate::hub::Hub;
use crate::metrics::WS_REJECTED_TOTAL;
use crate::shutdown::ShutdownCoordinator;
use crate::websocket::connection::run_ws_session;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    /// The hub.
    pub hub: Arc<Hub>,
    /// Shutdown token, plus tracking for per-socket tasks.
    pub shutdown: Arc<ShutdownCoordinator>,
    /// When the server started.
    pub start_time: Instant,
    /// Prometheus handle for `/metrics`.
    pub metrics: PrometheusHandle,
}

/// The floorsync hub server.
pub struct HubServer {
    config: HubConfig,
    hub: Arc<Hub>,
    shutdown: Arc<ShutdownCoordinator>,
    start_time: Instant,
    metrics: PrometheusHandle,
}

impl HubServer {
    /// Create a new server.
    pub fn new(config: HubConfig, metrics: PrometheusHandle) -> Self {
        Self {
            hub: Arc::new(Hub::new(config.clone())),
            config,
            shutdown: Arc::new(ShutdownCoordinator::new()),
            start_time: Instant::now(),
            metrics,
        }
    }

    /// Build the Axum router with all routes.
    pub fn router(&self) -> Router {
        let state = AppState {
            hub: Arc::clone(&self.hub),
            shutdown: Arc::clone(&self.shutdown),
            start_time: self.start_time,
            metrics: self.metrics.clone(),
        };

        Router::new()
            .route("/ws", get(ws_handler))
            .route("/events", post(events_handler))
            .route("/presence", get(presence_handler))
            .route("/health", get(health_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive())
    }

    /// Bind the listener and serve until shutdown.
    ///
    /// Returns the bound address (useful with port `0`) and the serve task.
    pub async fn listen(&self) -> Result<(SocketAddr, JoinHandle<()>), ServerError> {
        let bind = format!("{}:{}", self.config.host, self.config.port);
        let listener = TcpListener::bind((self.config.host.as_str(), self.config.port))
            .await
            .map_err(|source| ServerError::Bind {
                addr: bind.clone(),
                source,
            })?;
        let addr = listener.local_addr()?;
        let router = self.router();
        let token = self.shutdown.token();

        let handle = tokio::spawn(async move {
            let serve = axum::serve(listener, router)
                .with_graceful_shutdown(async move { token.cancelled().await });
            if let Err(e) = serve.await {
                error!(error = %e, "server loop failed");
            }
            info!("server stopped accepting connections");
        });

        info!(%addr, "floorsync hub listening");
        Ok((addr, handle))
    }

    /// The hub.
    pub fn hub(&self) -> &Arc<Hub> {
        &self.hub
    }

    /// Shutdown coordinator.
    pub fn shutdown(&self) -> &Arc<ShutdownCoordinator> {
        &self.shutdown
    }

    /// Server configuration.
    pub fn config(&self) -> &HubConfig {
        &self.config
    }
}

/// GET /ws
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> Response {
    if state.hub.at_capacity() {
        counter!(WS_REJECTED_TOTAL).increment(1);
        warn!(
            max_connections = state.hub.config().max_connections,
            "hub at capacity, refusing upgrade"
        );
        return (StatusCode::SERVICE_UNAVAILABLE, "hub at capacity").into_response();
    }

    let max_message_size = state.hub.config().max_message_size;
    let AppState { hub, shutdown, .. } = state;
    ws.max_message_size(max_message_size)
        .on_upgrade(move |socket| async move {
            let (session, outbound) = hub.open_session();
            let token = shutdown.token();
            // Tracked so graceful shutdown waits for the session to leave the registry.
            shutdown.track(tokio::spawn(run_ws_session(
                socket, hub, session, outbound, token,
            )));
        })
}

/// POST /events: the CRUD layer pushes an application message.
async fn events_handler(
    State(state): State<AppState>,
    Json(message): Json<ApplicationMessage>,
) -> Response {
    match state.hub.publish_event(&message) {
        Ok(outcome) => (
            StatusCode::ACCEPTED,
            Json(json!({ "recipients": outcome.recipients })),
        )
            .into_response(),
        Err(e) => {
            warn!(kind = %message.kind, error = %e, "rejected pushed event");
            (
                StatusCode::BAD_REQUEST,
                Json(json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /presence
async fn presence_handler(State(state): State<AppState>) -> Json<PresenceSnapshot> {
    Json(state.hub.presence_snapshot())
}

/// GET /health
async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let registry = state.hub.registry();
    Json(health::health_check(
        state.start_time,
        registry.len(),
        registry.announced_count(),
    ))
}

/// GET /metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    crate::metrics::render(&state.metrics)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use floorsync_core::{Identity, MessageKind};
    use tower::ServiceExt;

    fn make_server() -> HubServer {
        HubServer::new(HubConfig::default(), crate::metrics::detached_handle())
    }

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = axum::body::to_bytes(resp.into_body(), 64 * 1024)
            .await
            .unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    fn post_event(body: &str) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri("/events")
            .header("content-type", "application/json")
            .body(Body::from(body.to_owned()))
            .unwrap()
    }

    #[test]
    fn server_with_default_config() {
        let server = make_server();
        assert_eq!(server.config().host, "127.0.0.1");
        assert_eq!(server.config().port, 0);
        assert!(server.hub().registry().is_empty());
        assert!(!server.shutdown().is_shutting_down());
    }

    #[tokio::test]
    async fn health_endpoint_reports_counts() {
        let server = make_server();
        let (alice, _ra) = server.hub().open_session();
        let (_bob, _rb) = server.hub().open_session();
        assert!(
            server
                .hub()
                .registry()
                .set_identity(alice.id(), Identity::named("Alice"))
        );

        let req = Request::builder().uri("/health").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["status"], "ok");
        assert_eq!(parsed["connections"], 2);
        assert_eq!(parsed["announced"], 1);
        assert!(parsed["uptime_secs"].is_number());
    }

    #[tokio::test]
    async fn presence_endpoint_uses_wire_shape() {
        let server = make_server();
        let (carol, _rc) = server.hub().open_session();
        assert!(server.hub().registry().set_identity(
            carol.id(),
            Identity::named("Carol").with_avatar("https://img/c.png")
        ));

        let req = Request::builder().uri("/presence").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let parsed = body_json(resp).await;
        assert_eq!(parsed["count"], 1);
        assert_eq!(parsed["users"][0]["name"], "Carol");
        assert_eq!(parsed["users"][0]["photoUrl"], "https://img/c.png");
        assert!(parsed["users"][0]["connectedAt"].is_string());
    }

    #[tokio::test]
    async fn events_endpoint_relays_to_sessions() {
        let server = make_server();
        let (_s, mut rx) = server.hub().open_session();
        while rx.try_recv().is_ok() {}

        let body = r#"{"type":"NEW_ORDER","payload":{"tableId":4}}"#;
        let resp = server.router().oneshot(post_event(body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["recipients"], 1);

        let frame = rx.try_recv().unwrap();
        let msg = ApplicationMessage::parse(&frame).unwrap();
        assert_eq!(msg.kind, MessageKind::NewOrder);
        assert_eq!(msg.payload["tableId"], 4);
    }

    #[tokio::test]
    async fn events_endpoint_with_no_sessions() {
        let server = make_server();
        let resp = server
            .router()
            .oneshot(post_event(r#"{"type":"MENU_UPDATED"}"#))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::ACCEPTED);
        assert_eq!(body_json(resp).await["recipients"], 0);
    }

    #[tokio::test]
    async fn events_endpoint_rejects_hub_internal_kinds() {
        let server = make_server();
        for body in [
            r#"{"type":"CONNECTED_USERS","payload":{"count":0,"users":[]}}"#,
            r#"{"type":"USER_CONNECT","payload":{"name":"Mallory"}}"#,
        ] {
            let resp = server.router().oneshot(post_event(body)).await.unwrap();
            assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
            assert!(body_json(resp).await["error"].is_string());
        }
    }

    #[tokio::test]
    async fn events_endpoint_rejects_malformed_body() {
        let server = make_server();
        for body in ["not json", r#"{"payload":{}}"#] {
            let resp = server.router().oneshot(post_event(body)).await.unwrap();
            assert!(resp.status().is_client_error(), "{body} -> {}", resp.status());
        }
    }

    #[tokio::test]
    async fn metrics_endpoint_responds() {
        let server = make_server();
        let req = Request::builder().uri("/metrics").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn ws_endpoint_requires_upgrade() {
        let server = make_server();
        let req = Request::builder().uri("/ws").body(Body::empty()).unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert!(resp.status().is_client_error());
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let server = make_server();
        let req = Request::builder()
            .uri("/nonexistent")
            .body(Body::empty())
            .unwrap();
        let resp = server.router().oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn listen_binds_ephemeral_port_and_stops_on_shutdown() {
        let server = make_server();
        let (addr, handle) = server.listen().await.unwrap();
        assert_ne!(addr.port(), 0);

        server.shutdown().shutdown();
        tokio::time::timeout(std::time::Duration::from_secs(5), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
