use anyhow::{Context, Result};
use axum::{
    extract::State,
    http::{HeaderValue, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use serde::Serialize;
use std::future::Future;
use std::time::Duration;
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowHeaders, AllowMethods, CorsLayer},
    trace::TraceLayer,
};

use super::registry::{Registry, RegistrySnapshot};
use super::websocket::handle_signaling_websocket;
use crate::config::ServerConfig;

/// Path of the signaling WebSocket endpoint
pub const SIGNALING_PATH: &str = "/ws/signaling";

/// Server state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub registry: Registry,
    pub heartbeat_interval: Duration,
}

/// Signaling relay server instance
pub struct SignalingServer {
    config: ServerConfig,
    registry: Registry,
}

/// Health check response
#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
}

#[derive(Serialize)]
struct RootResponse {
    message: String,
    version: String,
}

impl SignalingServer {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
        }
    }

    pub fn registry(&self) -> Registry {
        self.registry.clone()
    }

    /// Run until Ctrl-C
    pub async fn run(self) -> Result<()> {
        let addr = self.config.socket_addr()?;
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("Failed to bind to {}", addr))?;

        self.serve(listener, shutdown_signal()).await
    }

    /// Serve on an already bound listener until `shutdown` resolves
    pub async fn serve<F>(self, listener: TcpListener, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let local_addr = listener
            .local_addr()
            .context("Failed to read listener address")?;

        let state = AppState {
            registry: self.registry.clone(),
            heartbeat_interval: self.config.heartbeat_interval,
        };
        let app = create_router(state, &self.config.allowed_origins);

        tracing::info!("Signaling relay listening on {}", local_addr);
        tracing::info!("WebSocket endpoint: ws://{}{}", local_addr, SIGNALING_PATH);

        axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
            .context("Server error")?;

        tracing::info!("Signaling relay stopped");
        Ok(())
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        crate::log_error!(e, "install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Create the Axum router with all routes and middleware
pub fn create_router(state: AppState, allowed_origins: &[String]) -> Router {
    let api_routes = Router::new()
        .route("/health", get(health_handler))
        .route("/peers", get(peers_handler));

    Router::new()
        .route("/", get(root_handler))
        .route(SIGNALING_PATH, get(handle_signaling_websocket))
        .nest("/api", api_routes)
        .fallback(not_found_handler)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(allowed_origins)),
        )
}

fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!("Ignoring invalid CORS origin: {}", origin);
                None
            },
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_credentials(true)
        .allow_methods(AllowMethods::mirror_request())
        .allow_headers(AllowHeaders::mirror_request())
}

async fn root_handler() -> Json<RootResponse> {
    Json(RootResponse {
        message: "signal-relay is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: "signal-relay".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Connected peers
async fn peers_handler(State(state): State<AppState>) -> Json<RegistrySnapshot> {
    Json(state.registry.snapshot().await)
}

/// 404 Not Found handler
async fn not_found_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(serde_json::json!({
            "error": "Not found",
            "code": "NOT_FOUND"
        })),
    )
}
