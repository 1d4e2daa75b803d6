use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use ingest::IngestError;
use serde_json::json;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ApiError>;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("No bank access token stored for user {0}")]
    MissingBankToken(String),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::Upstream(format!("{err:#}"))
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::UserNotFound(user_id) => ApiError::NotFound(format!("User {user_id}")),
            IngestError::MissingBankToken(user_id) => ApiError::MissingBankToken(user_id),
            IngestError::Upstream(err) => ApiError::Upstream(format!("{err:#}")),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            ApiError::MissingParameter(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, self.to_string()),
            ApiError::MissingBankToken(_) => (StatusCode::BAD_REQUEST, self.to_string()),
            ApiError::Upstream(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
            ApiError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, self.to_string()),
        };

        let body = Json(json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_follow_the_api_convention() {
        let cases = [
            (ApiError::MissingParameter("user_id"), StatusCode::BAD_REQUEST),
            (ApiError::BadRequest("bad".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::NotFound("User u-1".to_string()), StatusCode::NOT_FOUND),
            (ApiError::MissingBankToken("u-1".to_string()), StatusCode::BAD_REQUEST),
            (ApiError::Upstream("bank down".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
            (ApiError::Internal("boom".to_string()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, expected) in cases {
            assert_eq!(err.into_response().status(), expected);
        }
    }

    #[test]
    fn test_ingest_errors_map_to_typed_api_errors() {
        let err: ApiError = IngestError::MissingBankToken("u-1".to_string()).into();
        assert!(matches!(err, ApiError::MissingBankToken(_)));

        let err: ApiError = IngestError::UserNotFound("u-1".to_string()).into();
        assert!(matches!(err, ApiError::NotFound(_)));
    }
}
