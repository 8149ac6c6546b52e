//! HTTP interface over the request pipelines.

use crate::{
    app::{HeadPoseApp, PoseOutcome},
    config::ServerConfig,
    direction::Direction,
    types::EulerAngles,
    Error,
};
use axum::body::Bytes;
use axum::extract::{DefaultBodyLimit, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use log::{error, info};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::limit::RequestBodyLimitLayer;

/// Shared handler state
pub type AppState = Arc<HeadPoseApp>;

pub type ApiResult<T> = std::result::Result<T, ApiError>;

/// Errors reported to HTTP clients
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        if err.is_client_error() {
            Self::BadRequest(err.to_string())
        } else {
            Self::Internal(err.to_string())
        }
    }
}

#[derive(Serialize)]
struct ErrorResponse {
    detail: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        if status.is_server_error() {
            error!("{self}");
        }
        (status, Json(ErrorResponse { detail: self.to_string() })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct ImageRequest {
    img: String,
}

#[derive(Debug, Deserialize)]
struct SaveRequest {
    img: String,
    user: Option<String>,
}

/// Pose endpoint body, tagged by `status`
#[derive(Debug, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PoseResponse {
    Ok { direction: Direction, angles: EulerAngles },
    NoFace { message: &'static str },
}

impl From<PoseOutcome> for PoseResponse {
    fn from(outcome: PoseOutcome) -> Self {
        match outcome {
            PoseOutcome::NoFace => Self::NoFace {
                message: "Face not found",
            },
            PoseOutcome::Estimated { direction, angles } => Self::Ok { direction, angles },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct PeopleResponse {
    pub people: usize,
}

#[derive(Debug, Serialize)]
pub struct SaveResponse {
    pub path: String,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// JSON bodies are accepted whatever the declared content type
fn parse_json<T: DeserializeOwned>(body: &Bytes) -> ApiResult<T> {
    serde_json::from_slice(body).map_err(|e| ApiError::BadRequest(format!("Invalid JSON body: {e}")))
}

/// Run a pipeline on the blocking pool
async fn run_blocking<T, F>(app: &AppState, task: F) -> ApiResult<T>
where
    T: Send + 'static,
    F: FnOnce(&HeadPoseApp) -> crate::Result<T> + Send + 'static,
{
    let app = Arc::clone(app);
    tokio::task::spawn_blocking(move || task(&app))
        .await
        .map_err(|e| ApiError::Internal(format!("Worker task failed: {e}")))?
        .map_err(ApiError::from)
}

/// Liveness probe
async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn predict_pose(State(app): State<AppState>, body: Bytes) -> ApiResult<Json<PoseResponse>> {
    let request: ImageRequest = parse_json(&body)?;
    let outcome = run_blocking(&app, move |app| app.predict_pose(&request.img)).await?;
    Ok(Json(outcome.into()))
}

async fn predict_people(State(app): State<AppState>, body: Bytes) -> ApiResult<Json<PeopleResponse>> {
    let request: ImageRequest = parse_json(&body)?;
    let people = run_blocking(&app, move |app| app.count_people(&request.img)).await?;
    Ok(Json(PeopleResponse { people }))
}

async fn save_img(State(app): State<AppState>, body: Bytes) -> ApiResult<Json<SaveResponse>> {
    let request: SaveRequest = parse_json(&body)?;
    let path = run_blocking(&app, move |app| app.save_image(&request.img, request.user.as_deref())).await?;
    Ok(Json(SaveResponse {
        path: path.display().to_string(),
    }))
}

/// Build the router with CORS and the request body limit applied
pub fn router(app: AppState, max_body_bytes: usize) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/predict_pose", post(predict_pose))
        .route("/predict_people", post(predict_people))
        .route("/save_img", post(save_img))
        .layer(DefaultBodyLimit::disable())
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(CorsLayer::permissive())
        .with_state(app)
}

/// Serve until Ctrl+C or SIGTERM
///
/// # Errors
///
/// Returns an error if the address is invalid or the listener fails
pub async fn serve(app: HeadPoseApp, config: &ServerConfig) -> crate::Result<()> {
    let addr: SocketAddr = format!("{}:{}", config.host, config.port)
        .parse()
        .map_err(|e| Error::ConfigError(format!("Invalid bind address {}:{}: {e}", config.host, config.port)))?;

    let routes = router(Arc::new(app), config.max_body_bytes);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on {addr}");

    axum::serve(listener, routes)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
    info!("Received shutdown signal");
}
