//! Error taxonomy for the realtime stream.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use std::time::Duration;
use thiserror::Error;

use crate::model::LineId;

/// Failures while turning schedule data into active runs. Fatal to the tick
/// that hit them; nothing is retried.
#[derive(Error, Debug)]
pub enum ResolveError {
    #[error("schedule data unavailable: {0}")]
    DataUnavailable(#[from] sqlx::Error),

    #[error("malformed route geometry for line {line_id}: {reason}")]
    MalformedGeometry { line_id: LineId, reason: String },

    #[error("malformed timetable entry {value:?} on departure {run_id}")]
    MalformedTimetable { run_id: i64, value: String },
}

/// Why a streaming session ended abnormally.
#[derive(Error, Debug)]
pub enum StreamError {
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("failed to transmit frame: {0}")]
    Transmit(#[from] axum::Error),

    #[error("client did not accept frame within {0:?}")]
    SendTimeout(Duration),
}

/// Rejections that happen before a connection is upgraded, so the session
/// never starts streaming.
#[derive(Error, Debug)]
pub enum ConnectError {
    #[error("origin {0:?} is not allowed")]
    OriginNotAllowed(String),

    #[error("invalid line id {0:?}")]
    InvalidLineId(String),
}

impl IntoResponse for ConnectError {
    fn into_response(self) -> Response {
        let status = match self {
            ConnectError::OriginNotAllowed(_) => StatusCode::FORBIDDEN,
            ConnectError::InvalidLineId(_) => StatusCode::BAD_REQUEST,
        };
        (status, self.to_string()).into_response()
    }
}
