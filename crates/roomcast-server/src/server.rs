use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use roomcast_hub::{start_room_sweep, RoomIndex};
use roomcast_telemetry::MetricsRecorder;
use serde::Deserialize;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::config::ServerConfig;
use crate::{session, subscription};

/// Shared application state passed to Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub rooms: Arc<RoomIndex>,
    pub metrics: Arc<MetricsRecorder>,
    pub config: Arc<ServerConfig>,
}

#[derive(Debug, Deserialize)]
struct RoomQuery {
    #[serde(rename = "roomId", default)]
    room_id: String,
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(chat_handler))
        .route("/subscription", get(subscription_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Create and start the server. Returns a handle to shut it down.
pub async fn start(
    config: ServerConfig,
    rooms: Arc<RoomIndex>,
    metrics: Arc<MetricsRecorder>,
) -> Result<ServerHandle, std::io::Error> {
    let config = Arc::new(config);
    let shutdown = CancellationToken::new();

    let sweep = config.sweep_idle_rooms.then(|| {
        start_room_sweep(
            Arc::clone(&rooms),
            Duration::from_secs(config.sweep_interval_secs),
            shutdown.clone(),
        )
    });

    let state = AppState {
        rooms,
        metrics,
        config: Arc::clone(&config),
    };
    let router = build_router(state);

    let addr = format!("{}:{}", config.host, config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "roomcast server started");

    let server_cancel = shutdown.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, router)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
            .ok();
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        shutdown,
        _server: server,
        _sweep: sweep,
    })
}

/// Handle returned by `start()` — keeps background tasks alive.
pub struct ServerHandle {
    pub port: u16,
    shutdown: CancellationToken,
    _server: tokio::task::JoinHandle<()>,
    _sweep: Option<tokio::task::JoinHandle<()>>,
}

impl ServerHandle {
    /// Stop accepting connections and end background tasks.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

/// Chat upgrade handler.
async fn chat_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| session::run_chat_session(socket, query.room_id, state))
}

/// Subscription upgrade handler.
async fn subscription_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<RoomQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| subscription::run_subscription(socket, query.room_id, state))
}

/// Health check HTTP endpoint.
async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "healthy",
        "rooms": state.rooms.room_count(),
        "connections": state.rooms.total_connections(),
    }))
}

/// Current metric values as JSON.
async fn metrics_handler(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.metrics.export())
}
