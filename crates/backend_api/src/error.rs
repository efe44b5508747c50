use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use database::{QueryError, StoreError};
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    Conflict(String),

    #[error("Chat is unavailable: ANTHROPIC_API_KEY is not configured")]
    ChatUnavailable,

    #[error("Database did not respond in time")]
    StoreTimeout,

    #[error("Database error: {0}")]
    Store(StoreError),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(what) => ApiError::Conflict(what),
            StoreError::Invalid(why) => ApiError::BadRequest(why),
            other => ApiError::Store(other),
        }
    }
}

impl From<QueryError> for ApiError {
    fn from(err: QueryError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::ChatUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::StoreTimeout => StatusCode::GATEWAY_TIMEOUT,
            ApiError::Store(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_map_to_status() {
        let cases = [
            (StoreError::NotFound("category Travel".into()), StatusCode::NOT_FOUND),
            (StoreError::Conflict("category Gas".into()), StatusCode::CONFLICT),
            (StoreError::Invalid("negative".into()), StatusCode::BAD_REQUEST),
            (StoreError::Poisoned, StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn test_query_errors_are_bad_requests() {
        let err = ApiError::from(QueryError::InvalidMonth("2026-13".into()));
        assert_eq!(err.to_string(), "Invalid month '2026-13': expected YYYY-MM");
        assert_eq!(err.into_response().status(), StatusCode::BAD_REQUEST);
    }
}
