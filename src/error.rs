//! Error types for the Libros Reader server

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

use crate::epub::ParseError;

/// Application-wide result type
pub type Result<T> = std::result::Result<T, AppError>;

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Application error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Load error: {0}")]
    Load(#[from] LoadError),

    #[error("Input error: {0}")]
    Input(#[from] InputError),
}

/// Storage-specific errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("S3 connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Object not found: {0}")]
    ObjectNotFound(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("An object named {0} already exists")]
    KeyExists(String),

    #[error("Failed to presign {key}: {reason}")]
    PresignFailed { key: String, reason: String },

    #[error("S3 SDK error: {0}")]
    SdkError(String),
}

/// Failures of the rendering engine or of the reader view holding it
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Invalid document URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to fetch document: {0}")]
    Fetch(String),

    #[error("Document too large: {size} bytes (max: {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Failed to parse EPUB: {0}")]
    Parse(ParseError),

    #[error("Document has no readable sections")]
    EmptyDocument,

    #[error("Reader view not found: {0}")]
    ViewNotFound(Uuid),

    #[error("Reader view closed: {0}")]
    ViewClosed(Uuid),

    #[error("Load superseded for reader view {0}")]
    Abandoned(Uuid),

    #[error("No document loaded in reader view {0}")]
    NotLoaded(Uuid),

    #[error("Rendition has been disposed")]
    Disposed,

    #[error("Rendering task failed: {0}")]
    Render(String),
}

impl From<ParseError> for LoadError {
    /// An inflated entry over the cap is a size failure like an oversized download
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::EntryTooLarge { size, max, .. } => Self::TooLarge {
                size: usize::try_from(size).unwrap_or(usize::MAX),
                max: usize::try_from(max).unwrap_or(usize::MAX),
            },
            other => Self::Parse(other),
        }
    }
}

/// Invalid landing-page or upload input
#[derive(Error, Debug)]
pub enum InputError {
    #[error("Enter an EPUB URL or choose a file")]
    Empty,

    #[error("Invalid file name: {0:?}")]
    InvalidFileName(String),

    #[error("File too large (max: {max} bytes)")]
    TooLarge { max: usize },

    #[error("Malformed form data: {0}")]
    Multipart(String),
}

impl AppError {
    /// HTTP status for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Storage(e) => match e {
                StorageError::ObjectNotFound(_) => StatusCode::NOT_FOUND,
                StorageError::AccessDenied(_) => StatusCode::FORBIDDEN,
                StorageError::KeyExists(_) => StatusCode::CONFLICT,
                _ => StatusCode::BAD_GATEWAY,
            },
            Self::Load(e) => match e {
                LoadError::InvalidUrl(_) => StatusCode::BAD_REQUEST,
                LoadError::Fetch(_) => StatusCode::BAD_GATEWAY,
                LoadError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                LoadError::Parse(ParseError::ResourceNotFound(_)) => StatusCode::NOT_FOUND,
                LoadError::Parse(_) | LoadError::EmptyDocument => StatusCode::UNPROCESSABLE_ENTITY,
                LoadError::ViewNotFound(_) => StatusCode::NOT_FOUND,
                LoadError::ViewClosed(_) | LoadError::Disposed => StatusCode::GONE,
                LoadError::Abandoned(_) | LoadError::NotLoaded(_) => StatusCode::CONFLICT,
                LoadError::Render(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Input(e) => match e {
                InputError::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
                _ => StatusCode::BAD_REQUEST,
            },
        }
    }

    fn error_type(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::BadRequest(_) => "bad_request",
            Self::Internal(_) => "internal_error",
            Self::Storage(StorageError::ObjectNotFound(_)) => "not_found",
            Self::Storage(StorageError::AccessDenied(_)) => "access_denied",
            Self::Storage(StorageError::KeyExists(_)) => "key_exists",
            Self::Storage(_) => "storage_error",
            Self::Load(_) => "load_error",
            Self::Input(_) => "input_error",
        }
    }

    /// Message safe to show to a reader
    pub fn user_message(&self) -> String {
        match self {
            Self::Internal(_) => "An internal error occurred".to_string(),
            Self::Storage(StorageError::ObjectNotFound(key)) => format!("Book not found: {}", key),
            Self::Storage(StorageError::KeyExists(key)) => {
                format!("A book named {} is already uploaded", key)
            }
            Self::Storage(StorageError::AccessDenied(_)) => "Storage access denied".to_string(),
            Self::Storage(_) => "The book storage is unavailable. Please try again.".to_string(),
            Self::Load(_) => {
                "Error loading the e-book. Please check the URL and try again.".to_string()
            }
            Self::NotFound(msg) | Self::BadRequest(msg) => msg.clone(),
            Self::Input(e) => e.to_string(),
        }
    }

    /// Log at a level matching the severity
    pub fn log(&self) {
        if self.status_code().is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::warn!(error = %self, "Request rejected");
        }
    }
}

/// Error response body
#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<String>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let body = Json(ErrorResponse {
            error: self.error_type().to_string(),
            message: self.user_message(),
            details: if cfg!(debug_assertions) {
                Some(self.to_string())
            } else {
                None
            },
        });

        (self.status_code(), body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_status_codes() {
        let not_found = AppError::from(StorageError::ObjectNotFound("a.epub".into()));
        assert_eq!(not_found.status_code(), StatusCode::NOT_FOUND);

        let exists = AppError::from(StorageError::KeyExists("a.epub".into()));
        assert_eq!(exists.status_code(), StatusCode::CONFLICT);

        let sdk = AppError::from(StorageError::SdkError("timeout".into()));
        assert_eq!(sdk.status_code(), StatusCode::BAD_GATEWAY);
    }

    #[test]
    fn test_load_errors_hide_details_from_readers() {
        let err = AppError::from(LoadError::Fetch("connection refused".into()));
        assert_eq!(err.status_code(), StatusCode::BAD_GATEWAY);
        assert!(!err.user_message().contains("connection refused"));
    }

    #[test]
    fn test_missing_resource_is_not_found() {
        let err = AppError::from(LoadError::Parse(ParseError::ResourceNotFound("a.png".into())));
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);

        let err = AppError::from(LoadError::Parse(ParseError::OpenError("bad zip".into())));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_oversized_entry_is_too_large() {
        let err = LoadError::from(ParseError::EntryTooLarge {
            name: "OEBPS/ch1.xhtml".into(),
            size: 2048,
            max: 1024,
        });
        assert!(matches!(err, LoadError::TooLarge { size: 2048, max: 1024 }));
        assert_eq!(AppError::from(err).status_code(), StatusCode::PAYLOAD_TOO_LARGE);
    }

    #[test]
    fn test_internal_message_is_generic() {
        let err = AppError::Internal("lock poisoned".into());
        assert_eq!(err.user_message(), "An internal error occurred");
    }
}
