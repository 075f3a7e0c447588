use crate::services::{
    access_control::AccessError, account_store::AccountError, folder_service::FolderError,
    image_service::ImageError, pin_auth::PinAuthError,
};
use axum::{
    Json,
    extract::{multipart::MultipartError, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Map, Value, json};
use std::fmt;

/// API error carried back to clients as
/// `{"success": false, "error", "code", "status", ...extra}`.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub code: &'static str,
    pub message: String,
    pub extra: Map<String, Value>,
}

impl AppError {
    /// Create a new AppError with a specific status, code and message.
    pub fn new(status: StatusCode, code: &'static str, msg: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: msg.into(),
            extra: Map::new(),
        }
    }

    /// Attach an extra top-level field to the JSON body.
    pub fn with_extra(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.extra.insert(key.to_string(), value.into());
        self
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg)
    }

    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, "INVALID_REQUEST", msg)
    }

    pub fn auth_required() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "AUTH_REQUIRED", "Authentication required")
    }

    pub fn session_expired() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            "SESSION_EXPIRED",
            "Session expired, please log in again",
        )
    }

    pub fn forbidden() -> Self {
        Self::new(StatusCode::FORBIDDEN, "FORBIDDEN", "Insufficient permissions")
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.code, "{}", self.message);
        }

        let mut body = self.extra;
        body.insert("success".into(), json!(false));
        body.insert("error".into(), json!(self.message));
        body.insert("code".into(), json!(self.code));
        body.insert("status".into(), json!(self.status.as_u16()));

        (self.status, Json(Value::Object(body))).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<AccessError> for AppError {
    fn from(err: AccessError) -> Self {
        let (status, code) = match &err {
            AccessError::NoImagesFound => (StatusCode::NOT_FOUND, "NO_IMAGES_FOUND"),
            AccessError::AccessRestricted => (StatusCode::FORBIDDEN, "ACCESS_RESTRICTED"),
            AccessError::FolderEmpty(_) => (StatusCode::NOT_FOUND, "FOLDER_EMPTY"),
        };
        AppError::new(status, code, err.to_string())
    }
}

impl From<AccountError> for AppError {
    fn from(err: AccountError) -> Self {
        match err {
            AccountError::DuplicatePin => {
                AppError::new(StatusCode::BAD_REQUEST, "DUPLICATE_PIN", err.to_string())
            }
            AccountError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "ACCOUNT_NOT_FOUND", err.to_string())
            }
            AccountError::MissingFields | AccountError::InvalidPinFormat => {
                AppError::bad_request(err.to_string())
            }
            AccountError::Io(_) | AccountError::Json(_) => {
                AppError::internal(format!("account storage error: {}", err))
            }
        }
    }
}

impl From<PinAuthError> for AppError {
    fn from(err: PinAuthError) -> Self {
        match err {
            PinAuthError::RateLimited { remaining_minutes } => AppError::new(
                StatusCode::TOO_MANY_REQUESTS,
                "RATE_LIMITED",
                err.to_string(),
            )
            .with_extra("remainingTime", remaining_minutes),
            PinAuthError::InvalidPin { attempts_remaining } => {
                AppError::new(StatusCode::UNAUTHORIZED, "INVALID_PIN", err.to_string())
                    .with_extra("attemptsRemaining", attempts_remaining)
            }
            PinAuthError::MissingPin => AppError::bad_request(err.to_string()),
            PinAuthError::Store(inner) => inner.into(),
        }
    }
}

impl From<ImageError> for AppError {
    fn from(err: ImageError) -> Self {
        match err {
            ImageError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "IMAGE_NOT_FOUND", err.to_string())
            }
            ImageError::InvalidPath
            | ImageError::InvalidAngle(_)
            | ImageError::EmptyBatch
            | ImageError::UnsupportedType(_) => AppError::bad_request(err.to_string()),
            ImageError::TooLarge { .. } => {
                AppError::new(StatusCode::PAYLOAD_TOO_LARGE, "FILE_TOO_LARGE", err.to_string())
            }
            ImageError::Decode(_) => {
                AppError::new(StatusCode::BAD_REQUEST, "INVALID_IMAGE", err.to_string())
            }
            ImageError::Io(_) => AppError::internal(format!("image storage error: {}", err)),
        }
    }
}

impl From<FolderError> for AppError {
    fn from(err: FolderError) -> Self {
        match err {
            FolderError::NotFound(_) => {
                AppError::new(StatusCode::NOT_FOUND, "FOLDER_NOT_FOUND", err.to_string())
            }
            FolderError::AlreadyExists(_) => {
                AppError::new(StatusCode::CONFLICT, "FOLDER_EXISTS", err.to_string())
            }
            FolderError::InvalidPath => AppError::bad_request(err.to_string()),
            FolderError::NoThumbnail(_) => {
                AppError::new(StatusCode::NOT_FOUND, "THUMBNAIL_NOT_FOUND", err.to_string())
            }
            FolderError::Image(inner) => inner.into(),
            FolderError::Io(_) => AppError::internal(format!("folder storage error: {}", err)),
        }
    }
}

impl From<MultipartError> for AppError {
    fn from(err: MultipartError) -> Self {
        let status = err.status();
        let code = if status == StatusCode::PAYLOAD_TOO_LARGE {
            "FILE_TOO_LARGE"
        } else {
            "INVALID_REQUEST"
        };
        AppError::new(status, code, err.body_text())
    }
}

/// Malformed or mistyped JSON bodies keep the error envelope.
impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::new(rejection.status(), "INVALID_REQUEST", rejection.body_text())
    }
}
