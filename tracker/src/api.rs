use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::store::StoreError;
use crate::token::InvalidTrackingId;

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub enum TrackerResponseCode {
    Ok = 1,
}

#[derive(Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct TrackerResponse {
    pub status: TrackerResponseCode,
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("missing tracking id")]
    MissingTrackingId,
    #[error("tracking id is not valid: {0}")]
    InvalidTrackingId(#[from] InvalidTrackingId),
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("failed to parse request: {0}")]
    RequestParsingError(#[from] serde_json::Error),

    #[error("no message registered for this tracking id")]
    UnknownTrackingId,

    // Details are logged where the failure happens; callers get a
    // generic message.
    #[error("storage operation failed")]
    StoreUnavailable,
}

impl From<StoreError> for TrackerError {
    fn from(_: StoreError) -> Self {
        TrackerError::StoreUnavailable
    }
}

impl IntoResponse for TrackerError {
    fn into_response(self) -> Response {
        match self {
            TrackerError::MissingTrackingId
            | TrackerError::InvalidTrackingId(_)
            | TrackerError::MissingField(_)
            | TrackerError::RequestParsingError(_) => (StatusCode::BAD_REQUEST, self.to_string()),

            TrackerError::UnknownTrackingId => (StatusCode::NOT_FOUND, self.to_string()),

            TrackerError::StoreUnavailable => {
                (StatusCode::INTERNAL_SERVER_ERROR, self.to_string())
            }
        }
        .into_response()
    }
}
