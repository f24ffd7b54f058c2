use axum::extract::rejection::JsonRejection;
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, ServiceError>;
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Failures reported by the account store.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("a user with this email already exists")]
    DuplicateEmail,
    #[error("confirmation code already exists")]
    DuplicateCode,
    #[error("redis error: {0}")]
    Redis(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("corrupt record: {0}")]
    Corrupt(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Redis(err.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("rate limit exceeded, retry after {retry_after}s")]
    RateLimitExceeded { retry_after: u64 },
    #[error("validation error: {0}")]
    Validation(String),
    #[error("email already registered")]
    EmailTaken,
    #[error("user not found")]
    UserNotFound,
    #[error("invalid or already used confirmation code")]
    InvalidOrUsedCode,
    #[error("invalid email or password")]
    InvalidCredentials,
    #[error("account is not activated")]
    AccountInactive,
    #[error("invalid request body: {message}")]
    InvalidBody { status: StatusCode, message: String },
    #[error("request body too large")]
    PayloadTooLarge,
    #[error("unsupported content type")]
    UnsupportedContentType,
    #[error("resource not found")]
    NotFound,
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("internal error: {0}")]
    Internal(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<JsonRejection> for ServiceError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => ServiceError::PayloadTooLarge,
            status => ServiceError::InvalidBody {
                status,
                message: rejection.body_text(),
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub message: String,
    pub code: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

impl ErrorResponse {
    pub fn new(error: &str, message: &str, code: StatusCode) -> Self {
        Self {
            error: error.to_string(),
            message: message.to_string(),
            code: code.as_u16(),
            retry_after: None,
        }
    }

    /// Builds the client-facing body. Internal details never leave the process.
    pub fn from_service_error(err: &ServiceError) -> Self {
        match err {
            ServiceError::RateLimitExceeded { retry_after } => Self {
                retry_after: Some(*retry_after),
                ..Self::new(
                    "rate_limit_exceeded",
                    "Request rate limit exceeded, try again later",
                    StatusCode::TOO_MANY_REQUESTS,
                )
            },
            ServiceError::Validation(msg) => {
                Self::new("validation_error", msg, StatusCode::BAD_REQUEST)
            }
            ServiceError::EmailTaken => Self::new(
                "validation_error",
                "A user with this email already exists",
                StatusCode::BAD_REQUEST,
            ),
            // Both confirmation failures share one body.
            ServiceError::UserNotFound | ServiceError::InvalidOrUsedCode => Self::new(
                "invalid_confirmation",
                "Invalid email or confirmation code",
                StatusCode::BAD_REQUEST,
            ),
            ServiceError::InvalidCredentials => Self::new(
                "invalid_credentials",
                "Invalid email or password",
                StatusCode::BAD_REQUEST,
            ),
            ServiceError::AccountInactive => Self::new(
                "account_inactive",
                "User is not activated",
                StatusCode::BAD_REQUEST,
            ),
            ServiceError::InvalidBody { status, message } => {
                Self::new("validation_error", message, *status)
            }
            ServiceError::PayloadTooLarge => Self::new(
                "payload_too_large",
                "Request body is too large",
                StatusCode::PAYLOAD_TOO_LARGE,
            ),
            ServiceError::UnsupportedContentType => Self::new(
                "unsupported_content_type",
                "Unsupported Content-Type, use application/json",
                StatusCode::BAD_REQUEST,
            ),
            ServiceError::NotFound => {
                Self::new("not_found", "Resource not found", StatusCode::NOT_FOUND)
            }
            ServiceError::Store(StoreError::Redis(_)) | ServiceError::Store(StoreError::Unavailable(_)) => {
                Self::new(
                    "service_unavailable",
                    "Storage is temporarily unavailable",
                    StatusCode::SERVICE_UNAVAILABLE,
                )
            }
            ServiceError::Configuration(_) | ServiceError::Internal(_) | ServiceError::Store(_) => {
                Self::new(
                    "internal_error",
                    "Internal server error",
                    StatusCode::INTERNAL_SERVER_ERROR,
                )
            }
        }
    }

    pub fn status(&self) -> StatusCode {
        StatusCode::from_u16(self.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorResponse::from_service_error(&self);
        let status = body.status();

        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }

        let retry_after = body.retry_after;
        let mut response = (status, Json(body)).into_response();
        if let Some(secs) = retry_after {
            response
                .headers_mut()
                .insert(header::RETRY_AFTER, HeaderValue::from(secs));
        }
        response
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confirmation_failures_share_body() {
        let not_found = ErrorResponse::from_service_error(&ServiceError::UserNotFound);
        let bad_code = ErrorResponse::from_service_error(&ServiceError::InvalidOrUsedCode);

        assert_eq!(not_found.error, bad_code.error);
        assert_eq!(not_found.message, bad_code.message);
        assert_eq!(not_found.code, 400);
    }

    #[test]
    fn test_rate_limit_response_carries_retry_after() {
        let response = ServiceError::RateLimitExceeded { retry_after: 60 }.into_response();

        assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(response.headers()[header::RETRY_AFTER], "60");
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let body = ErrorResponse::from_service_error(&ServiceError::Internal(
            "code generation exhausted".to_string(),
        ));

        assert_eq!(body.code, 500);
        assert!(!body.message.contains("exhausted"));
    }

    #[test]
    fn test_store_outage_maps_to_503() {
        let body = ErrorResponse::from_service_error(&ServiceError::Store(StoreError::Redis(
            "connection refused".to_string(),
        )));

        assert_eq!(body.code, 503);
        assert_eq!(body.error, "service_unavailable");
    }

    #[test]
    fn test_body_errors_use_envelope() {
        let invalid = ErrorResponse::from_service_error(&ServiceError::InvalidBody {
            status: StatusCode::UNPROCESSABLE_ENTITY,
            message: "missing field".to_string(),
        });
        assert_eq!(invalid.error, "validation_error");
        assert_eq!(invalid.code, 422);

        let too_large = ServiceError::PayloadTooLarge.into_response();
        assert_eq!(too_large.status(), StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(
            too_large.headers()[header::CONTENT_TYPE],
            "application/json"
        );
    }

    #[test]
    fn test_rate_limit_body_serialization() {
        let body = ErrorResponse::from_service_error(&ServiceError::RateLimitExceeded {
            retry_after: 60,
        });
        let json = serde_json::to_value(&body).unwrap();

        assert_eq!(json["retry_after"], 60);
        assert_eq!(json["code"], 429);
    }
}
