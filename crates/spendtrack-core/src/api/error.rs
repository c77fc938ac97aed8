use reqwest::StatusCode;
use thiserror::Error;

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Unauthorized - session may have expired: {}", truncate_body(.body))]
    Unauthorized { body: String },

    #[error("Access denied: {}", truncate_body(.body))]
    AccessDenied { body: String },

    #[error("Resource not found: {}", truncate_body(.body))]
    NotFound { body: String },

    #[error("Rate limited - please wait before retrying")]
    RateLimited { body: String },

    #[error("Server error ({status}): {}", truncate_body(.body))]
    ServerError { status: StatusCode, body: String },

    #[error("Request failed ({status}): {}", truncate_body(.body))]
    Status { status: StatusCode, body: String },

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Token storage error: {0}")]
    Storage(String),
}

/// Truncate a response body to avoid logging excessive data
fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LENGTH {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LENGTH;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
}

impl ApiError {
    /// Map a non-success status and its body to an error, keeping the body intact.
    pub fn from_status(status: StatusCode, body: impl Into<String>) -> Self {
        let body = body.into();
        match status.as_u16() {
            401 => ApiError::Unauthorized { body },
            403 => ApiError::AccessDenied { body },
            404 => ApiError::NotFound { body },
            429 => ApiError::RateLimited { body },
            500..=599 => ApiError::ServerError { status, body },
            _ => ApiError::Status { status, body },
        }
    }

    /// HTTP status of the failed response, if one was received.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            ApiError::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            ApiError::AccessDenied { .. } => Some(StatusCode::FORBIDDEN),
            ApiError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            ApiError::RateLimited { .. } => Some(StatusCode::TOO_MANY_REQUESTS),
            ApiError::ServerError { status, .. } | ApiError::Status { status, .. } => Some(*status),
            ApiError::Network(e) => e.status(),
            _ => None,
        }
    }

    /// Original, untruncated response body.
    pub fn body(&self) -> Option<&str> {
        match self {
            ApiError::Unauthorized { body }
            | ApiError::AccessDenied { body }
            | ApiError::NotFound { body }
            | ApiError::RateLimited { body }
            | ApiError::ServerError { body, .. }
            | ApiError::Status { body, .. } => Some(body),
            _ => None,
        }
    }

    /// True for a 401 that survived the client's single refresh-and-retry.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ApiError::Unauthorized { .. })
    }
}
