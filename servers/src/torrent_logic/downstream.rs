use crate::torrent_logic::config::Settings;
use crate::torrent_logic::state::AppState;
use axum::{
    Json, Router,
    body::Body,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use lib_common::core::PollStatus;
use lib_common::history::HistoryResolution;
use lib_common::push::{DEFAULT_CLIENT_ID, open_activity_stream};
use lib_common::utils::{current_datetime_rfc9557, now_millis};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

/// Errors surfaced to HTTP clients.
#[derive(Debug)]
pub enum AppError {
    BadRequest(String),
    Internal(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            AppError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            AppError::Internal(message) => {
                tracing::error!(%message, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, message)
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub history_snapshot: Option<String>,
    pub client_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct HistoryParams {
    pub snapshot: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PollReport {
    phase: &'static str,
    consecutive_errors: u32,
    next_delay_ms: u64,
    last_success_ms: Option<u64>,
    last_error: Option<String>,
}

impl PollReport {
    fn from_status(status: Option<watch::Receiver<PollStatus>>) -> Option<Self> {
        let status = status?.borrow().clone();
        Some(Self {
            phase: status.phase.as_str(),
            consecutive_errors: status.consecutive_errors,
            next_delay_ms: status.next_delay.as_millis() as u64,
            last_success_ms: status.last_success_ms,
            last_error: status.last_error,
        })
    }
}

pub fn router(app_state: AppState) -> Router {
    Router::new()
        .route("/api/activity-stream", get(activity_stream_handler))
        .route("/api/history", get(history_handler))
        .route("/health", get(health_handler))
        .with_state(app_state)
}

/// Serves HTTP until `shutdown` fires. Open activity streams are ended first
/// so the graceful shutdown doesn't wait on them.
pub async fn run(settings: Settings, app_state: AppState, shutdown: CancellationToken) -> anyhow::Result<()> {
    let registry = app_state.registry.clone();
    let app = router(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.port));
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Downstream server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            shutdown.cancelled().await;
            registry.release_all();
            tracing::info!("Downstream server shutting down.");
        })
        .await?;

    Ok(())
}

fn parse_resolution(raw: Option<&str>) -> Result<HistoryResolution, AppError> {
    match raw {
        None | Some("") => Ok(HistoryResolution::default()),
        Some(name) => name.parse().map_err(|e: lib_common::UnknownResolution| AppError::BadRequest(e.to_string())),
    }
}

async fn activity_stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamParams>,
) -> Result<Response, AppError> {
    let resolution = parse_resolution(params.history_snapshot.as_deref())?;
    let client_id = params.client_id.as_deref().filter(|id| !id.is_empty()).unwrap_or(DEFAULT_CLIENT_ID);

    let stream = open_activity_stream(&state.services, &state.registry, client_id, resolution)
        .map_err(|e| AppError::Internal(e.to_string()))?;

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, "text/event-stream")
        .header(header::CACHE_CONTROL, "no-cache")
        .header(header::CONNECTION, "keep-alive")
        .body(Body::from_stream(stream.into_body_stream()))
        .map_err(|e| AppError::Internal(e.to_string()))
}

/// Unknown resolutions answer with empty arrays.
async fn history_handler(State(state): State<AppState>, Query(params): Query<HistoryParams>) -> impl IntoResponse {
    let snapshot = params
        .snapshot
        .as_deref()
        .filter(|name| !name.is_empty())
        .unwrap_or(HistoryResolution::default().as_str());
    let history = state
        .services
        .transfer
        .get_history(snapshot, now_millis())
        .unwrap_or_default();
    Json(history)
}

async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let services = &state.services;
    Json(json!({
        "status": "ok",
        "time": current_datetime_rfc9557(),
        "sessions": state.registry.session_count(),
        "historySamples": services.transfer.history_size(),
        "torrentList": PollReport::from_status(services.torrents.poll_status()),
        "transferSummary": PollReport::from_status(services.transfer.poll_status()),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::to_bytes;
    use axum::http::Request;
    use lib_common::configs::EngineConfig;
    use lib_common::ingestors::{TorrentDetails, TransferSummary};
    use tower::ServiceExt;

    fn app_state() -> AppState {
        AppState::new(&EngineConfig::default()).unwrap()
    }

    async fn get(app: Router, uri: &str) -> Response {
        app.oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_history_endpoint() {
        let state = app_state();
        state.services.transfer.apply_summary(
            TransferSummary {
                up_rate: 1,
                down_rate: 2,
                ..Default::default()
            },
            now_millis(),
        );

        let response = get(router(state.clone()), "/api/history?snapshot=fiveMin").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["download"], json!([2.0]));

        let response = get(router(state), "/api/history?snapshot=decade").await;
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body, json!({"timestamps": [], "download": [], "upload": []}));
    }

    #[tokio::test]
    async fn test_activity_stream_headers_and_first_event() {
        let state = app_state();
        state.services.torrents.apply_list(
            9,
            vec![TorrentDetails {
                hash: "A".to_string(),
                ..Default::default()
            }],
        );

        let response = get(router(state.clone()), "/api/activity-stream?clientId=tab-1").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "text/event-stream");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "no-cache");
        assert_eq!(state.registry.session_count(), 1);

        // Replacing the session ends this body once the full updates are drained.
        let _other = open_activity_stream(&state.services, &state.registry, "tab-1", HistoryResolution::FiveMin).unwrap();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with(':'));
        assert!(text.contains("id:9\nevent:TORRENT_LIST_FULL_UPDATE\n"));
        assert!(text.contains("event:TRANSFER_HISTORY_FULL_UPDATE\n"));
    }

    #[tokio::test]
    async fn test_unknown_stream_resolution_is_rejected() {
        let response = get(router(app_state()), "/api/activity-stream?historySnapshot=decade").await;
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_health() {
        let response = get(router(app_state()), "/health").await;
        assert_eq!(response.status(), StatusCode::OK);
        let body: serde_json::Value =
            serde_json::from_slice(&to_bytes(response.into_body(), usize::MAX).await.unwrap()).unwrap();
        assert_eq!(body["status"], "ok");
        assert_eq!(body["torrentList"], serde_json::Value::Null);
    }
}
