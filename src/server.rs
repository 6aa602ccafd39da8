//! HTTP surface for the telemetry/UI collaborator.
//!
//! The dashboard polls status, commands calibration, and subscribes to the
//! live event stream:
//!
//! ```text
//! Dashboard ──→ GET  /status     (state, profile, threshold, progress)
//!           ──→ POST /calibrate  (start/restart a calibration session)
//!           ←── GET  /events     (SSE: sample / movement / calibration_done)
//! ```
//!
//! Handlers only touch the shared status cell, the command channel and the
//! broadcast sender; the pipeline itself never blocks on a slow client.

use crate::telemetry::{read_status, Command, SharedStatus, StatusReport, UiEvent};
use axum::{
    extract::State,
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tower_http::cors::{Any, CorsLayer};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Port to bind to (0 for random)
    pub port: u16,
}

impl ServerConfig {
    pub fn new(port: u16) -> Self {
        Self { port }
    }
}

/// Shared server state.
pub struct ServerState {
    /// Status cell written by the pipeline
    status: SharedStatus,
    /// Command channel into the pipeline
    commands: crossbeam_channel::Sender<Command>,
    /// Event fan-out from the pipeline
    events: broadcast::Sender<UiEvent>,
}

impl ServerState {
    pub fn new(
        status: SharedStatus,
        commands: crossbeam_channel::Sender<Command>,
        events: broadcast::Sender<UiEvent>,
    ) -> Self {
        Self {
            status,
            commands,
            events,
        }
    }
}

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response to a calibration command.
#[derive(Serialize)]
pub struct CalibrateResponse {
    pub msg: String,
}

/// Error response.
#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// GET /health
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// GET /status
async fn status(State(state): State<Arc<ServerState>>) -> Json<StatusReport> {
    Json(read_status(&state.status))
}

/// POST /calibrate
///
/// Idempotent: re-entry restarts the session and clears prior accumulation.
async fn calibrate(
    State(state): State<Arc<ServerState>>,
) -> Result<Json<CalibrateResponse>, (StatusCode, Json<ErrorResponse>)> {
    state
        .commands
        .send(Command::StartCalibration)
        .map_err(|_| {
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ErrorResponse {
                    error: "pipeline is not running".to_string(),
                    code: "PIPELINE_UNAVAILABLE".to_string(),
                }),
            )
        })?;

    Ok(Json(CalibrateResponse {
        msg: "Started".to_string(),
    }))
}

/// GET /events
///
/// Server-sent events; each message is named after the event kind and
/// carries the JSON payload.
async fn events(
    State(state): State<Arc<ServerState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = state.events.subscribe();

    let stream = BroadcastStream::new(receiver).filter_map(|msg| match msg {
        Ok(event) => {
            let name = event.name();
            match serde_json::to_string(&event) {
                Ok(data) => Some(Ok(Event::default().event(name).data(data))),
                Err(e) => {
                    tracing::error!("event serialization failed: {e}");
                    None
                }
            }
        }
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            tracing::warn!(skipped, "event subscriber lagging, messages dropped");
            None
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

/// Run the HTTP server.
pub async fn run(
    config: ServerConfig,
    state: ServerState,
) -> anyhow::Result<(SocketAddr, tokio::sync::oneshot::Sender<()>)> {
    let state = Arc::new(state);

    let app = Router::new()
        .route("/health", get(health))
        .route("/status", get(status))
        .route("/calibrate", post(calibrate))
        .route("/events", get(events))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state);

    let addr = SocketAddr::from(([127, 0, 0, 1], config.port));
    let listener = TcpListener::bind(addr).await?;
    let actual_addr = listener.local_addr()?;

    tracing::info!("telemetry server listening on http://{}", actual_addr);

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async {
                let _ = shutdown_rx.await;
                tracing::info!("server shutdown signal received");
            })
            .await
        {
            tracing::error!("server error: {}", e);
        }
    });

    Ok((actual_addr, shutdown_tx))
}
