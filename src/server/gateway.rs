//! HTTP + WebSocket gateway
//!
//! Routes health checks, game creation and WebSocket upgrades, and hands
//! upgraded connections to the session coordinator.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Bytes;
use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{ConnectInfo, Path, Request, State};
use axum::http::{HeaderMap, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Extension, Json, Router};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tower_http::trace::TraceLayer;
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use super::names::NamePolicy;
use crate::config::{ConfigError, GatewayConfig};
use crate::session::{AdmissionController, SessionCoordinator};

/// Errors that can occur while building or running the gateway
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Invalid configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("Invalid name pattern: {0}")]
    Pattern(#[from] regex::Error),
    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Body of `POST /games`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Response of `POST /games`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewGameResponse {
    pub name: String,
}

/// Client address as seen through proxies
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientAddr(pub String);

/// Shared state accessible from handlers
#[derive(Clone)]
pub struct AppState {
    config: Arc<GatewayConfig>,
    names: Arc<NamePolicy>,
    coordinator: SessionCoordinator,
    sessions: TaskTracker,
}

/// The gateway server
pub struct Gateway {
    config: Arc<GatewayConfig>,
    state: AppState,
    shutdown: CancellationToken,
}

impl Gateway {
    /// Validate the configuration and build the gateway
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let config = Arc::new(config);
        let names = Arc::new(NamePolicy::new(&config)?);
        let shutdown = CancellationToken::new();
        let coordinator = SessionCoordinator::new(
            Arc::new(AdmissionController::new(config.max_ws_connections)),
            config.queue_capacity,
            shutdown.clone(),
        );
        let state = AppState {
            config: Arc::clone(&config),
            names,
            coordinator,
            sessions: TaskTracker::new(),
        };
        Ok(Self {
            config,
            state,
            shutdown,
        })
    }

    /// Number of sessions currently holding an admission slot
    pub fn active_sessions(&self) -> usize {
        self.state.coordinator.admission().active()
    }

    /// Trigger shutdown: stop accepting and cancel every session
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    /// Build the router with all routes
    pub fn router(&self) -> Router {
        Router::new()
            .route("/health", get(health))
            .route("/games", post(new_game))
            .route("/ws/games/{game_name}/players/{player_name}", get(join_game))
            .with_state(self.state.clone())
            .layer(middleware::from_fn(real_ip))
            .layer(TraceLayer::new_for_http())
    }

    /// Bind the configured address and serve until shutdown
    pub async fn run(&self) -> Result<(), GatewayError> {
        let listener = TcpListener::bind(self.config.socket_addr()).await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shutdown
    pub async fn serve(&self, listener: TcpListener) -> Result<(), GatewayError> {
        info!(
            "Starting Server with MaxWsConnections: {}, WsReadBufferSize: {}, WsWriteBufferSize: {}",
            self.config.max_ws_connections,
            self.config.ws_read_buffer_size,
            self.config.ws_write_buffer_size
        );
        info!("Listening on {}", listener.local_addr()?);

        let shutdown = self.shutdown.clone();
        axum::serve(
            listener,
            self.router()
                .into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

        // Sessions share the shutdown token and are already cancelled
        let sessions = &self.state.sessions;
        sessions.close();
        if !sessions.is_empty() {
            info!("Waiting for {} active sessions to close...", sessions.len());
        }
        let timeout = Duration::from_secs(self.config.shutdown_timeout_secs);
        if tokio::time::timeout(timeout, sessions.wait()).await.is_err() {
            warn!("Shutdown timed out after {:?}, {} sessions still open", timeout, sessions.len());
        }
        Ok(())
    }
}

/// GET /health
async fn health() -> &'static str {
    "OK"
}

/// POST /games
async fn new_game(State(state): State<AppState>, body: Bytes) -> Response {
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        NewGameRequest::default()
    } else {
        match serde_json::from_slice::<NewGameRequest>(&body) {
            Ok(request) => request,
            Err(e) => {
                debug!("Invalid NewGameRequest: {}", e);
                return (StatusCode::BAD_REQUEST, "Unable to decode NewGameRequest").into_response();
            }
        }
    };

    let name = match request.name.filter(|name| !name.is_empty()) {
        Some(name) if !state.names.is_valid_game(&name) => {
            return (
                StatusCode::BAD_REQUEST,
                format!(
                    "Provided Game Name does not match expression {}",
                    state.names.game()
                ),
            )
                .into_response();
        }
        Some(name) => name,
        None => {
            let name = state.names.generate_game_name();
            info!("Received empty Game Name, generated name: {}", name);
            name
        }
    };

    info!("Creating new game with name: {}", name);
    Json(NewGameResponse { name }).into_response()
}

/// GET /ws/games/{game_name}/players/{player_name}
async fn join_game(
    State(state): State<AppState>,
    Path((game_name, player_name)): Path<(String, String)>,
    Extension(client): Extension<ClientAddr>,
    upgrade: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    if !state.names.is_valid_game(&game_name) {
        return (
            StatusCode::BAD_REQUEST,
            format!(
                "GameName does not match expected expression: {}",
                state.names.game()
            ),
        )
            .into_response();
    }
    if !state.names.is_valid_player(&player_name) {
        return (
            StatusCode::BAD_REQUEST,
            format!(
                "PlayerName does not match expected expression: {}",
                state.names.player()
            ),
        )
            .into_response();
    }
    let upgrade = match upgrade {
        Ok(upgrade) => upgrade,
        Err(rejection) => {
            debug!("Rejected upgrade: {}", rejection);
            return (StatusCode::BAD_REQUEST, "Expected WebSocket Upgrade request").into_response();
        }
    };

    info!("{} joining the game {} as {}", client.0, game_name, player_name);
    let span = info_span!(
        "session",
        id = %Uuid::new_v4(),
        game = %game_name,
        player = %player_name,
        peer = %client.0,
    );
    let coordinator = state.coordinator.clone();
    let sessions = state.sessions.clone();
    upgrade
        .read_buffer_size(state.config.ws_read_buffer_size)
        .write_buffer_size(state.config.ws_write_buffer_size)
        .on_upgrade(move |socket| {
            sessions.track_future(
                async move {
                    coordinator.handle_socket(socket).await;
                    info!("Handler for player {} game {} finished", player_name, game_name);
                }
                .instrument(span),
            )
        })
}

/// Resolve the client address from `X-Forwarded-For` or the TCP peer
async fn real_ip(mut request: Request, next: Next) -> Response {
    let peer = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|info| info.0);
    let client = client_addr(request.headers(), peer);
    request.extensions_mut().insert(ClientAddr(client));
    next.run(request).await
}

fn client_addr(headers: &HeaderMap, peer: Option<SocketAddr>) -> String {
    let forwarded = headers
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(forwarded) = forwarded {
        return forwarded.to_string();
    }
    match peer {
        Some(addr) if addr.is_ipv6() && addr.ip().is_loopback() => {
            format!("localhost:{}", addr.port())
        }
        Some(addr) => addr.to_string(),
        None => "unknown".to_string(),
    }
}
