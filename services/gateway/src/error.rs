use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use shared::PublishError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("missing caller identity")]
    Unauthorized,
    #[error("{0}")]
    BadRequest(String),
    #[error(transparent)]
    Publish(#[from] PublishError),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Publish(PublishError::Broker(_)) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Publish(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        // Broker details stay in the logs.
        let message = match &self {
            ApiError::Publish(PublishError::Broker(_)) => "command broker unavailable".to_string(),
            ApiError::Publish(_) => "failed to submit command".to_string(),
            other => other.to_string(),
        };
        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}
