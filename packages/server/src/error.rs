use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use common::storage::BlobError;
use sea_orm::DbErr;
use serde::Serialize;
use utoipa::ToSchema;

/// Standard error body returned by every API endpoint.
///
/// `code` is a stable machine-readable identifier; `message` is free text
/// meant for humans and may change between releases.
#[derive(Debug, Serialize, ToSchema)]
pub struct ErrorBody {
    /// Stable error code, e.g. `NOT_FOUND` or `QUOTA_EXCEEDED`.
    pub code: &'static str,
    /// Human-readable description.
    pub message: String,
}

#[derive(Debug)]
pub enum AppError {
    /// Request shape or field contents failed validation.
    Validation(String),
    /// No `Authorization: Bearer` header on a protected route.
    TokenMissing,
    /// The bearer token failed signature or expiry checks.
    TokenInvalid,
    /// Unknown email or wrong password; deliberately indistinct.
    InvalidCredentials,
    /// The account exists but the email was never verified.
    AccountNotVerified,
    /// Authenticated, but not allowed to touch this resource.
    PermissionDenied,
    NotFound(String),
    Conflict(String),
    /// Registration hit the unique constraint on `user.email`.
    EmailTaken,
    /// Admission check failed: the upload would push usage past the ceiling.
    QuotaExceeded {
        used_mb: f64,
        limit_mb: f64,
        requested_mb: f64,
    },
    /// The blob store or the catalog database could not be reached.
    StoreUnavailable(String),
    Internal(String),
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message,
                },
            ),
            AppError::TokenMissing => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_MISSING",
                    message: "Missing authorization token".into(),
                },
            ),
            AppError::TokenInvalid => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "TOKEN_INVALID",
                    message: "Invalid or expired token".into(),
                },
            ),
            AppError::InvalidCredentials => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    code: "INVALID_CREDENTIALS",
                    message: "Invalid email or password".into(),
                },
            ),
            AppError::AccountNotVerified => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "ACCOUNT_NOT_VERIFIED",
                    message: "Account email has not been verified".into(),
                },
            ),
            AppError::PermissionDenied => (
                StatusCode::FORBIDDEN,
                ErrorBody {
                    code: "PERMISSION_DENIED",
                    message: "You do not have permission to perform this action".into(),
                },
            ),
            AppError::NotFound(message) => (
                StatusCode::NOT_FOUND,
                ErrorBody {
                    code: "NOT_FOUND",
                    message,
                },
            ),
            AppError::Conflict(message) => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "CONFLICT",
                    message,
                },
            ),
            AppError::EmailTaken => (
                StatusCode::CONFLICT,
                ErrorBody {
                    code: "EMAIL_TAKEN",
                    message: "An account with this email already exists".into(),
                },
            ),
            AppError::QuotaExceeded {
                used_mb,
                limit_mb,
                requested_mb,
            } => (
                StatusCode::INSUFFICIENT_STORAGE,
                ErrorBody {
                    code: "QUOTA_EXCEEDED",
                    message: format!(
                        "Storage quota exceeded: {used_mb:.2} MB used of {limit_mb:.2} MB, upload needs {requested_mb:.2} MB"
                    ),
                },
            ),
            AppError::StoreUnavailable(message) => {
                tracing::error!("storage backend unavailable: {message}");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    ErrorBody {
                        code: "STORE_UNAVAILABLE",
                        message: "Storage backend is temporarily unavailable".into(),
                    },
                )
            }
            AppError::Internal(message) => {
                tracing::error!("internal error: {message}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ErrorBody {
                        code: "INTERNAL_ERROR",
                        message: "Internal server error".into(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        (status, Json(body)).into_response()
    }
}

impl From<DbErr> for AppError {
    fn from(err: DbErr) -> Self {
        AppError::StoreUnavailable(err.to_string())
    }
}

impl From<BlobError> for AppError {
    fn from(err: BlobError) -> Self {
        match err {
            BlobError::NotFound(key) => {
                AppError::NotFound(format!("File content missing from storage ({key})"))
            }
            BlobError::TooLarge { actual, limit } => AppError::Validation(format!(
                "File is too large: {actual} bytes exceeds the {limit} byte limit"
            )),
            BlobError::InvalidKey(msg) => AppError::Internal(format!("corrupt blob key: {msg}")),
            BlobError::Io(err) => AppError::StoreUnavailable(err.to_string()),
        }
    }
}
