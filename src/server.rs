//! HTTP surface: health check and the two websocket streams.

use axum::Router;
use axum::extract::ws::WebSocketUpgrade;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, header};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use serde::Serialize;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::Instrument;

use crate::config::{OriginPolicy, StreamConfig};
use crate::error::ConnectError;
use crate::model::LineId;
use crate::store::ScheduleStore;
use crate::stream::{HeartbeatFeed, PositionFeed, serve_socket};

/// Shared by every request. The store is read-only, so streams never coordinate.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn ScheduleStore>,
    pub config: Arc<StreamConfig>,
}

impl AppState {
    pub fn new(store: Arc<dyn ScheduleStore>, config: StreamConfig) -> Self {
        Self {
            store,
            config: Arc::new(config),
        }
    }
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/routes/realtime", get(serve_heartbeat))
        .route("/v1/estimate/simulate/{line_id}", get(serve_positions))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

#[derive(Serialize)]
struct Health {
    status: &'static str,
    version: &'static str,
}

async fn health() -> Json<Health> {
    Json(Health {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

async fn serve_heartbeat(
    State(state): State<AppState>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ConnectError> {
    check_origin(&state.config.origin_policy, &headers)?;

    let settings = state.config.heartbeat();
    let span = tracing::info_span!("heartbeat_stream");
    Ok(ws
        .on_failed_upgrade(|err| tracing::warn!(error = %err, "Websocket upgrade failed"))
        .on_upgrade(move |socket| serve_socket(socket, HeartbeatFeed, settings).instrument(span))
        .into_response())
}

async fn serve_positions(
    State(state): State<AppState>,
    Path(raw_line_id): Path<String>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<Response, ConnectError> {
    check_origin(&state.config.origin_policy, &headers)?;
    let line_id = parse_line_id(&raw_line_id)?;

    let feed = PositionFeed::new(Arc::clone(&state.store), line_id);
    let settings = state.config.positions();
    let span = tracing::info_span!("position_stream", line_id);
    Ok(ws
        .on_failed_upgrade(move |err| {
            tracing::warn!(line_id, error = %err, "Websocket upgrade failed")
        })
        .on_upgrade(move |socket| serve_socket(socket, feed, settings).instrument(span))
        .into_response())
}

fn check_origin(policy: &OriginPolicy, headers: &HeaderMap) -> Result<(), ConnectError> {
    let origin = headers
        .get(header::ORIGIN)
        .map(|v| v.to_str().unwrap_or_default());

    if policy.permits(origin) {
        Ok(())
    } else {
        let origin = origin.unwrap_or_default().to_string();
        tracing::warn!(%origin, "Rejected stream from disallowed origin");
        Err(ConnectError::OriginNotAllowed(origin))
    }
}

fn parse_line_id(raw: &str) -> Result<LineId, ConnectError> {
    raw.trim()
        .parse()
        .map_err(|_| ConnectError::InvalidLineId(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_parse_line_id() {
        assert_eq!(parse_line_id("6").unwrap(), 6);
        assert!(matches!(parse_line_id("six"), Err(ConnectError::InvalidLineId(_))));
        assert!(matches!(parse_line_id(""), Err(ConnectError::InvalidLineId(_))));
    }

    #[test]
    fn test_check_origin_against_allow_list() {
        let policy = OriginPolicy::from_origins(vec!["http://localhost:5173".to_string()]);

        let mut headers = HeaderMap::new();
        assert!(check_origin(&policy, &headers).is_ok());

        headers.insert(header::ORIGIN, HeaderValue::from_static("http://localhost:5173"));
        assert!(check_origin(&policy, &headers).is_ok());

        headers.insert(header::ORIGIN, HeaderValue::from_static("https://elsewhere.example"));
        assert!(matches!(
            check_origin(&policy, &headers),
            Err(ConnectError::OriginNotAllowed(o)) if o == "https://elsewhere.example"
        ));
    }

    #[test]
    fn test_connect_errors_map_to_status() {
        use axum::http::StatusCode;
        let forbidden = ConnectError::OriginNotAllowed("x".into()).into_response();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);
        let bad = ConnectError::InvalidLineId("x".into()).into_response();
        assert_eq!(bad.status(), StatusCode::BAD_REQUEST);
    }
}
