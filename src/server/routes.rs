//! HTTP routes
//!
//! | Method | Path | Description |
//! |--------|------|-------------|
//! | POST | `/stream/start/{name}` | Start a live stream |
//! | POST | `/stream/data/{name}` | Push one chunk (request body) |
//! | POST | `/stream/stop/{name}` | Stop, persist and unregister |
//! | GET | `/stream/listen/{name}` | Chunked `audio/mpeg` relay of the live stream |
//! | GET | `/stream/stats/{name}` | Channel statistics |
//! | GET | `/streams` | Names of live streams |
//! | GET | `/audio/{filename}` | A stored recording |
//! | GET | `/list`, `/list/{name}` | Stored recordings, optionally for one stream |
//! | GET | `/names` | Stream names with stored recordings |

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{Body, Bytes},
    extract::{DefaultBodyLimit, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use tower_http::trace::TraceLayer;

use crate::registry::{ChannelStats, Recv, RegistryError, StopOutcome, StreamRegistry};
use crate::storage::{RecordingCatalog, StorageError};

const AUDIO_MPEG: &str = "audio/mpeg";

/// Shared state passed to all request handlers
#[derive(Clone)]
pub struct AppState {
    registry: Arc<StreamRegistry>,
    catalog: RecordingCatalog,
    receive_timeout: Duration,
}

impl AppState {
    /// Bundle the registry and catalog for the router
    pub fn new(
        registry: Arc<StreamRegistry>,
        catalog: RecordingCatalog,
        receive_timeout: Duration,
    ) -> Self {
        Self {
            registry,
            catalog,
            receive_timeout,
        }
    }

    /// Stream registry behind the routes
    pub fn registry(&self) -> &Arc<StreamRegistry> {
        &self.registry
    }
}

/// Build the router with every relay endpoint
pub fn router(state: AppState, max_chunk_size: usize) -> Router {
    Router::new()
        .route("/", get(index))
        .route("/stream/start/{name}", post(start_stream))
        .route("/stream/data/{name}", post(push_chunk))
        .route("/stream/stop/{name}", post(stop_stream))
        .route("/stream/listen/{name}", get(listen))
        .route("/stream/stats/{name}", get(stream_stats))
        .route("/streams", get(list_streams))
        .route("/audio/{filename}", get(get_recording))
        .route("/list", get(list_recordings))
        .route("/list/{name}", get(list_recordings_for))
        .route("/names", get(list_names))
        .layer(DefaultBodyLimit::max(max_chunk_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

impl IntoResponse for RegistryError {
    fn into_response(self) -> Response {
        let status = match &self {
            RegistryError::AlreadyActive(_) | RegistryError::PersistencePending(_) => {
                StatusCode::CONFLICT
            }
            RegistryError::NotFound(_) => StatusCode::NOT_FOUND,
            RegistryError::NotActive(_) => StatusCode::GONE,
            RegistryError::EmptyPayload => StatusCode::BAD_REQUEST,
            RegistryError::Persistence { .. } | RegistryError::StopInterrupted(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

impl IntoResponse for StorageError {
    fn into_response(self) -> Response {
        let status = match &self {
            StorageError::NotFound(_) => StatusCode::NOT_FOUND,
            StorageError::InvalidFilename(_) => StatusCode::BAD_REQUEST,
            StorageError::Io(_) | StorageError::NameExhausted(_) => {
                tracing::error!(error = %self, "Storage request failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, self.to_string()).into_response()
    }
}

async fn index() -> &'static str {
    "Audio relay server is running"
}

async fn start_stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, RegistryError> {
    state.registry.start(&name).await?;
    Ok(format!("Stream {} started", name))
}

async fn push_chunk(
    State(state): State<AppState>,
    Path(name): Path<String>,
    body: Bytes,
) -> Result<&'static str, RegistryError> {
    state.registry.write(&name, body).await?;
    Ok("Chunk received")
}

async fn stop_stream(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<String, RegistryError> {
    match state.registry.stop(&name).await? {
        StopOutcome::Saved(file) => Ok(file),
        StopOutcome::NothingToSave => Ok("no data".to_string()),
    }
}

/// Relay a live stream as a chunked body
///
/// The body ends when the stream stops: either the queue reports end-of-stream,
/// or a receive times out and the channel is seen stopped. A client that hangs
/// up drops the body, which drops and detaches the listener.
async fn listen(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Response, RegistryError> {
    let listener = state.registry.subscribe(&name).await?;
    let timeout = state.receive_timeout;

    let chunks = futures::stream::unfold(listener, move |mut listener| async move {
        loop {
            match listener.receive(timeout).await {
                Recv::Chunk(chunk) => return Some((Ok::<_, std::io::Error>(chunk), listener)),
                Recv::Timeout if !listener.is_channel_stopped() => continue,
                Recv::Timeout | Recv::Ended => {
                    tracing::debug!(
                        stream = %listener.stream_name(),
                        listener = listener.id(),
                        dropped = listener.dropped_chunks(),
                        "Listen stream finished"
                    );
                    listener.detach().await;
                    return None;
                }
            }
        }
    });

    Ok((
        [
            (header::CONTENT_TYPE, AUDIO_MPEG),
            (header::CACHE_CONTROL, "no-cache"),
        ],
        Body::from_stream(chunks),
    )
        .into_response())
}

async fn stream_stats(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<ChannelStats>, RegistryError> {
    Ok(Json(state.registry.stats(&name).await?))
}

async fn list_streams(State(state): State<AppState>) -> Json<Vec<String>> {
    Json(state.registry.list_active().await)
}

async fn get_recording(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, StorageError> {
    let data = state.catalog.read(&filename).await?;
    Ok(([(header::CONTENT_TYPE, AUDIO_MPEG)], data).into_response())
}

async fn list_recordings(
    State(state): State<AppState>,
) -> Result<Json<Vec<String>>, StorageError> {
    Ok(Json(state.catalog.list().await?))
}

async fn list_recordings_for(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Vec<String>>, StorageError> {
    Ok(Json(state.catalog.list_for(&name).await?))
}

async fn list_names(State(state): State<AppState>) -> Result<Json<Vec<String>>, StorageError> {
    Ok(Json(state.catalog.names().await?))
}
