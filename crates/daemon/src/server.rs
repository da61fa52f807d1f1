//! HTTP surface for tvsync
//!
//! Read endpoints over the series directory plus write endpoints that drive
//! the download lifecycle of one episode.

use crate::directory::SharedDirectory;
use crate::episode::{Episode, EpisodeKey};
use crate::lifecycle::{DownloadController, LifecycleError};
use crate::reconcile::Reconciler;
use crate::series::Series;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use thiserror::Error;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

/// Errors that can occur when running the HTTP server
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Failed to bind to {addr}: {source}")]
    Bind {
        addr: String,
        source: std::io::Error,
    },

    #[error("Server error: {0}")]
    Serve(#[from] std::io::Error),
}

/// Error returned by request handlers, rendered as `{"error": "..."}`
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Upstream(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Upstream(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        let message = e.to_string();
        match e {
            LifecycleError::NotFound(_) => ApiError::NotFound(message),
            LifecycleError::AlreadyExists(_)
            | LifecycleError::InvalidState { .. }
            | LifecycleError::NoHandle(_)
            | LifecycleError::NoLink(_) => ApiError::Conflict(message),
            LifecycleError::Daemon(_) => ApiError::Upstream(message),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(json!({ "error": self.to_string() }))).into_response()
    }
}

/// State shared by all handlers
#[derive(Clone)]
pub struct AppState {
    pub directory: SharedDirectory,
    pub controller: DownloadController,
    pub reconciler: Reconciler,
}

fn parse_id(raw: &str) -> Result<u64, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::BadRequest(format!("invalid series id '{}'", raw)))
}

fn parse_key(raw: &str) -> Result<EpisodeKey, ApiError> {
    raw.parse()
        .map_err(|e: crate::episode::ParseKeyError| ApiError::BadRequest(e.to_string()))
}

fn parse_record(id: &str, key: &str) -> Result<(u64, EpisodeKey), ApiError> {
    Ok((parse_id(id)?, parse_key(key)?))
}

/// GET /series
async fn list_series(State(state): State<AppState>) -> Json<Vec<Series>> {
    Json(state.directory.get_all().await)
}

/// GET /series/:id
async fn get_series(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Series>, ApiError> {
    let id = parse_id(&id)?;
    state
        .directory
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("series {} not found", id)))
}

/// POST /series/:id/refresh
///
/// Re-reconciles the folder behind a stored series. An unmatched result
/// leaves the stored entry as it was; a pass without an episode listing
/// keeps the stored episodes.
async fn refresh_series(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<Series>, ApiError> {
    let id = parse_id(&id)?;
    let stored = state
        .directory
        .get(id)
        .await
        .ok_or_else(|| ApiError::NotFound(format!("series {} not found", id)))?;

    let fresh = state
        .reconciler
        .reconcile(&stored.local_name, &stored.local_path)
        .await;
    if !fresh.matched {
        return Err(ApiError::Upstream(format!(
            "metadata lookup for '{}' failed, keeping stored series",
            stored.local_name
        )));
    }

    let new_id = if fresh.id == id {
        state.directory.merge(fresh).await
    } else {
        info!(old_id = id, new_id = fresh.id, "Series resolved to a different id");
        state.controller.rehome_series(id, fresh).await
    };

    state
        .directory
        .get(new_id)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("series {} not found", new_id)))
}

/// GET /series/:id/episodes/:key
async fn get_episode(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    let (id, key) = parse_record(&id, &key)?;
    state
        .directory
        .episode(id, key)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::NotFound(format!("episode {}/{} not found", id, key)))
}

/// POST /series/:id/episodes/:key/start
async fn start_episode(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    let (id, key) = parse_record(&id, &key)?;
    Ok(Json(state.controller.start(id, key).await?))
}

/// POST /series/:id/episodes/:key/pause
async fn pause_episode(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    let (id, key) = parse_record(&id, &key)?;
    Ok(Json(state.controller.pause(id, key).await?))
}

/// POST /series/:id/episodes/:key/stop
async fn stop_episode(
    State(state): State<AppState>,
    Path((id, key)): Path<(String, String)>,
) -> Result<Json<Episode>, ApiError> {
    let (id, key) = parse_record(&id, &key)?;
    Ok(Json(state.controller.stop(id, key).await?))
}

/// Creates the axum Router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/series", get(list_series))
        .route("/series/:id", get(get_series))
        .route("/series/:id/refresh", post(refresh_series))
        .route("/series/:id/episodes/:key", get(get_episode))
        .route("/series/:id/episodes/:key/start", post(start_episode))
        .route("/series/:id/episodes/:key/pause", post(pause_episode))
        .route("/series/:id/episodes/:key/stop", post(stop_episode))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Runs the HTTP server on `bind` until it fails
pub async fn run_server(state: AppState, bind: &str) -> Result<(), ServerError> {
    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(bind)
        .await
        .map_err(|source| ServerError::Bind {
            addr: bind.to_string(),
            source,
        })?;
    info!(addr = %bind, "HTTP server listening");

    axum::serve(listener, app).await?;
    Ok(())
}
