// Error handling module
// Defines the error kinds surfaced by the request pipeline and token refresh

use reqwest::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use thiserror::Error;

/// Machine-readable classification of a failed call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    NetworkError,
    TimeoutError,
    Unauthorized,
    Forbidden,
    NotFound,
    ValidationError,
    RateLimit,
    ServerError,
    HttpError,
}

impl ErrorKind {
    /// Classify a non-success HTTP status
    pub fn from_status(status: u16) -> Self {
        match status {
            401 => ErrorKind::Unauthorized,
            403 => ErrorKind::Forbidden,
            404 => ErrorKind::NotFound,
            422 => ErrorKind::ValidationError,
            429 => ErrorKind::RateLimit,
            s if s >= 500 => ErrorKind::ServerError,
            _ => ErrorKind::HttpError,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NetworkError => "NETWORK_ERROR",
            ErrorKind::TimeoutError => "TIMEOUT_ERROR",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Forbidden => "FORBIDDEN",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::ValidationError => "VALIDATION_ERROR",
            ErrorKind::RateLimit => "RATE_LIMIT",
            ErrorKind::ServerError => "SERVER_ERROR",
            ErrorKind::HttpError => "HTTP_ERROR",
        }
    }

    /// Kinds that are terminal for the retry loop
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ErrorKind::Unauthorized | ErrorKind::Forbidden | ErrorKind::NotFound
        )
    }

    /// Default user-facing message, used when the error body carries none.
    /// `HttpError` has no fixed message; see [`ApiError::from_status`].
    fn default_message(&self) -> Option<&'static str> {
        match self {
            ErrorKind::NetworkError => Some("Network error. Please check your connection."),
            ErrorKind::TimeoutError => Some("Request timeout. Please try again."),
            ErrorKind::Unauthorized => Some("Authentication required. Please login again."),
            ErrorKind::Forbidden => Some("You do not have permission to perform this action."),
            ErrorKind::NotFound => Some("The requested resource was not found."),
            ErrorKind::ValidationError => Some("Validation error. Please check your input."),
            ErrorKind::RateLimit => Some("Too many requests. Please try again later."),
            ErrorKind::ServerError => Some("Server error. Please try again later."),
            ErrorKind::HttpError => None,
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single field-level validation failure reported by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

/// Errors surfaced by the API client
#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport failure, no response received
    #[error("Network error. Please check your connection. ({0})")]
    Network(String),

    /// The request timeout elapsed before a response arrived
    #[error("Request timeout. Please try again.")]
    Timeout,

    /// The backend answered with a non-success status
    #[error("{message}")]
    Http {
        status: u16,
        kind: ErrorKind,
        message: String,
        body: Option<Value>,
    },

    /// Credentials could not be refreshed; the caller should show the login surface
    #[error("Session expired. Please login again.")]
    SessionExpired,

    /// Authentication failed locally (e.g. malformed token response)
    #[error("Authentication failed: {0}")]
    AuthError(String),

    /// The credential storage backend failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Internal error (body encoding, response decoding)
    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    /// Build a structured error from a non-success response.
    /// The body's `detail` or `message` string wins over the generic message.
    pub fn from_status(status: StatusCode, body: Option<Value>) -> Self {
        let code = status.as_u16();
        let kind = ErrorKind::from_status(code);

        let body_message = body.as_ref().and_then(|b| {
            b.get("detail")
                .and_then(Value::as_str)
                .or_else(|| b.get("message").and_then(Value::as_str))
                .map(str::to_string)
        });

        let message = body_message.unwrap_or_else(|| match kind.default_message() {
            Some(msg) => msg.to_string(),
            None => format!(
                "Error {}: {}",
                code,
                status.canonical_reason().unwrap_or("Unknown Status")
            ),
        });

        ApiError::Http {
            status: code,
            kind,
            message,
            body,
        }
    }

    /// Machine-readable kind, if this error came from the transport or the backend
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::Network(_) => Some(ErrorKind::NetworkError),
            ApiError::Timeout => Some(ErrorKind::TimeoutError),
            ApiError::Http { kind, .. } => Some(*kind),
            ApiError::SessionExpired | ApiError::AuthError(_) => Some(ErrorKind::Unauthorized),
            ApiError::Storage(_) | ApiError::Internal(_) => None,
        }
    }

    /// HTTP status associated with the error
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Http { status, .. } => Some(*status),
            ApiError::SessionExpired => Some(401),
            _ => None,
        }
    }

    /// Whether the retry loop may try again after this error.
    /// Local failures are never retried.
    pub fn is_retryable(&self) -> bool {
        match self.kind() {
            Some(kind) => !kind.is_terminal(),
            None => false,
        }
    }

    /// Parsed error body, when the backend sent one
    pub fn body(&self) -> Option<&Value> {
        match self {
            ApiError::Http { body, .. } => body.as_ref(),
            _ => None,
        }
    }

    /// Field-level detail from a validation failure.
    ///
    /// Understands both `{"errors": {"field": "msg"}}` and the
    /// `{"detail": [{"loc": [...], "msg": "..."}]}` shape.
    pub fn field_errors(&self) -> Vec<FieldError> {
        let Some(body) = self.body() else {
            return Vec::new();
        };

        if let Some(errors) = body.get("errors").and_then(Value::as_object) {
            return errors
                .iter()
                .map(|(field, msg)| FieldError {
                    field: field.clone(),
                    message: msg
                        .as_str()
                        .map(str::to_string)
                        .unwrap_or_else(|| msg.to_string()),
                })
                .collect();
        }

        let Some(details) = body.get("detail").and_then(Value::as_array) else {
            return Vec::new();
        };

        details
            .iter()
            .filter_map(|item| {
                let message = item.get("msg").and_then(Value::as_str)?.to_string();
                // "loc" is e.g. ["body", "email"]; the request section prefix is dropped
                let field = item
                    .get("loc")
                    .and_then(Value::as_array)
                    .map(|loc| {
                        loc.iter()
                            .skip_while(|part| {
                                matches!(part.as_str(), Some("body" | "query" | "path"))
                            })
                            .map(|part| match part {
                                Value::String(s) => s.clone(),
                                other => other.to_string(),
                            })
                            .collect::<Vec<_>>()
                            .join(".")
                    })
                    .unwrap_or_default();
                Some(FieldError { field, message })
            })
            .collect()
    }

    /// Structured representation for UI presentation
    pub fn to_json(&self) -> Value {
        json!({
            "error": {
                "message": self.to_string(),
                "type": self.kind().map(|k| k.as_str()).unwrap_or("INTERNAL_ERROR"),
                "status": self.status(),
                "errors": self.field_errors(),
                "data": self.body(),
            }
        })
    }
}

/// Failure of a token refresh.
///
/// Cloneable so one failure can be delivered to every caller waiting on the
/// same in-flight refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RefreshError {
    #[error("No refresh token available")]
    NoRefreshToken,

    #[error("Token refresh failed: {status} - {message}")]
    Rejected { status: u16, message: String },

    #[error("Token refresh request failed: {0}")]
    Transport(String),

    #[error("Token refresh timed out")]
    Timeout,

    #[error("Invalid token refresh response: {0}")]
    InvalidResponse(String),

    #[error("Failed to persist refreshed tokens: {0}")]
    Storage(String),
}

/// Result type alias for API operations
pub type Result<T> = std::result::Result<T, ApiError>;
