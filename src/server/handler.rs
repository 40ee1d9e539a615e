// Axum request handlers: translate client HTTP requests into registry and gateway operations.

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Result;
use axum::{
    body::Bytes,
    extract::{Path, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use futures::future::join_all;
use serde_json::json;
use tokio::net::TcpListener;
use tracing::{debug, error, info, warn};

use super::models::{HealthResponse, StartRequest, StartResponse, TorrentInfo};
use super::stream::RangeStreamGateway;
use crate::config::SHUTDOWN_GRACE_SECS;
use crate::engine::magnet::is_magnet_uri;
use crate::engine::registry::SessionRegistry;
use crate::engine::session::Session;

pub struct AppState {
    registry: Arc<SessionRegistry>,
    gateway: RangeStreamGateway,
    started_at: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>) -> Self {
        Self {
            gateway: RangeStreamGateway::new(Arc::clone(&registry)),
            registry,
            started_at: Instant::now(),
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }
}

pub type SharedState = Arc<AppState>;

/// Build the API router over the given state.
pub fn router(state: SharedState) -> Router {
    Router::new()
        .route("/api/start", post(start_handler))
        .route(
            "/api/stream/{info_hash}/{file_index}",
            get(stream_handler).head(head_handler),
        )
        .route("/api/info/{info_hash}", get(info_handler))
        .route("/api/torrents", get(torrents_handler))
        .route("/api/health", get(health_handler))
        .with_state(state)
}

pub struct ApiServer {
    port: u16,
    state: SharedState,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
    task: tokio::task::JoinHandle<()>,
}

impl ApiServer {
    /// Bind `addr` (port 0 picks a free one) and start serving in the background.
    pub async fn start(state: SharedState, addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        let port = listener.local_addr()?.port();

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel::<()>();

        let app = router(state.clone());

        let task = tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
            {
                error!("api server error: {}", e);
            }
        });

        info!("api server listening on port {}", port);

        Ok(Self {
            port,
            state,
            shutdown_tx: Some(shutdown_tx),
            task,
        })
    }

    /// Get the port the server is listening on.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// Absolute loopback URL for an API path.
    pub fn url(&self, path: &str) -> String {
        format!("http://127.0.0.1:{}{}", self.port, path)
    }

    pub fn state(&self) -> &SharedState {
        &self.state
    }

    /// Stop accepting new connections. In-flight requests keep running.
    pub fn begin_shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }

    /// Stop accepting requests and give in-flight ones a grace period to finish.
    pub async fn shutdown(mut self) {
        self.begin_shutdown();
        let grace = Duration::from_secs(SHUTDOWN_GRACE_SECS);
        if tokio::time::timeout(grace, &mut self.task).await.is_err() {
            warn!("api server did not drain within {:?}, aborting", grace);
            self.task.abort();
        }
    }
}

fn error_response(status: StatusCode, message: &str) -> Response {
    (status, Json(json!({ "error": message }))).into_response()
}

/// POST /api/start: resolve a magnet link and register its session.
async fn start_handler(State(state): State<SharedState>, body: Bytes) -> Response {
    let request: StartRequest = serde_json::from_slice(&body).unwrap_or_default();

    let Some(magnet_uri) = request.magnet_uri.filter(|m| !m.is_empty()) else {
        return error_response(StatusCode::BAD_REQUEST, "Magnet URI is required");
    };
    if !is_magnet_uri(&magnet_uri) {
        return error_response(StatusCode::BAD_REQUEST, "Invalid magnet URI format");
    }

    let preview: String = magnet_uri.chars().take(50).collect();
    info!("starting torrent for magnet: {}...", preview);

    match state.registry.get_or_create(&magnet_uri).await {
        Ok(session) => Json(StartResponse::from(session.as_ref())).into_response(),
        Err(e) => {
            error!("error starting torrent: {}", e);
            e.into_response()
        }
    }
}

/// The Range header value, if present. A value that is not visible ASCII
/// comes back empty so it resolves as malformed rather than absent.
fn range_header(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(header::RANGE)
        .map(|v| v.to_str().unwrap_or_default())
}

/// GET /api/stream/{info_hash}/{file_index}: serve file content with Range support.
async fn stream_handler(
    State(state): State<SharedState>,
    Path((info_hash, file_index)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let Ok(file_index) = file_index.parse::<usize>() else {
        return error_response(StatusCode::NOT_FOUND, "File not found");
    };
    let range = range_header(&headers);
    debug!(
        "stream request hash={} file={} range={:?}",
        info_hash, file_index, range
    );

    match state.gateway.serve(&info_hash, file_index, range).await {
        Ok(directive) => directive.into_response(),
        Err(e) => e.into_response(),
    }
}

/// HEAD /api/stream/{info_hash}/{file_index}: return headers only.
async fn head_handler(
    State(state): State<SharedState>,
    Path((info_hash, file_index)): Path<(String, String)>,
    headers: HeaderMap,
) -> Response {
    let Ok(file_index) = file_index.parse::<usize>() else {
        return StatusCode::NOT_FOUND.into_response();
    };
    match state
        .gateway
        .plan(&info_hash, file_index, range_header(&headers))
    {
        Ok(plan) => plan.into_head().into_response(),
        Err(e) => e.into_response(),
    }
}

async fn torrent_info(registry: &SessionRegistry, session: Arc<Session>) -> TorrentInfo {
    let stats = registry.refresh_stats(&session).await;
    TorrentInfo::new(&session, &stats)
}

/// GET /api/info/{info_hash}
async fn info_handler(
    State(state): State<SharedState>,
    Path(info_hash): Path<String>,
) -> Response {
    match state.registry.get(&info_hash) {
        Some(session) => Json(torrent_info(&state.registry, session).await).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "Torrent not found"),
    }
}

/// GET /api/torrents
async fn torrents_handler(State(state): State<SharedState>) -> Response {
    let sessions = state.registry.sessions();
    let infos: Vec<TorrentInfo> = join_all(
        sessions
            .into_iter()
            .map(|session| torrent_info(&state.registry, session)),
    )
    .await;
    Json(infos).into_response()
}

/// GET /api/health
async fn health_handler(State(state): State<SharedState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        active_torrents: state.registry.len(),
        uptime: state.started_at.elapsed().as_secs_f64(),
    })
}
