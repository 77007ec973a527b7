use serde::Deserialize;
use thiserror::Error;

/// Error code the data service returns when a single-row request matched no rows.
pub const ROW_NOT_FOUND_CODE: &str = "PGRST116";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Unauthorized - token may be expired")]
    Unauthorized,

    #[error("{0}")]
    InvalidCredentials(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No rows matched the requested object")]
    RowNotFound,

    #[error("Rate limited - please wait before retrying")]
    RateLimited,

    #[error("Server error: {0}")]
    ServerError(String),

    #[error("Network error: {0}")]
    NetworkError(#[from] reqwest::Error),

    #[error("Request timed out")]
    Timeout,

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("No active session")]
    NoSession,
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

/// Error body shape shared by the auth and table endpoints.
/// Auth uses `msg`/`error_description`, tables use `code`/`message`.
#[derive(Debug, Default, Deserialize)]
struct ServiceErrorBody {
    code: Option<serde_json::Value>,
    message: Option<String>,
    msg: Option<String>,
    error_description: Option<String>,
    error: Option<String>,
}

impl ServiceErrorBody {
    fn parse(body: &str) -> Self {
        serde_json::from_str(body).unwrap_or_default()
    }

    fn code(&self) -> Option<String> {
        match &self.code {
            Some(serde_json::Value::String(s)) => Some(s.clone()),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        }
    }

    fn message(&self) -> Option<String> {
        self.msg
            .clone()
            .or_else(|| self.error_description.clone())
            .or_else(|| self.message.clone())
            .or_else(|| self.error.clone())
    }
}

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            body.to_string()
        } else {
            let mut end = MAX_ERROR_BODY_LENGTH;
            while !body.is_char_boundary(end) {
                end -= 1;
            }
            format!("{}... (truncated, {} total bytes)", &body[..end], body.len())
        }
    }

    pub fn from_status(status: reqwest::StatusCode, body: &str) -> Self {
        let parsed = ServiceErrorBody::parse(body);
        if parsed.code().as_deref() == Some(ROW_NOT_FOUND_CODE) {
            return ApiError::RowNotFound;
        }

        let truncated = Self::truncate_body(body);
        match status.as_u16() {
            401 => ApiError::Unauthorized,
            403 => ApiError::AccessDenied(truncated),
            404 => ApiError::NotFound(truncated),
            429 => ApiError::RateLimited,
            500..=599 => ApiError::ServerError(truncated),
            _ => ApiError::InvalidResponse(format!("Status {}: {}", status, truncated)),
        }
    }

    /// Map a failed password or refresh grant. Any 4xx from the token endpoint
    /// means the service rejected the credentials.
    pub fn from_auth_status(status: reqwest::StatusCode, body: &str) -> Self {
        if status.is_client_error() && status.as_u16() != 429 {
            let message = ServiceErrorBody::parse(body)
                .message()
                .unwrap_or_else(|| "Invalid login credentials".to_string());
            return ApiError::InvalidCredentials(message);
        }
        Self::from_status(status, body)
    }

    /// Convert a transport error, separating timeouts from other failures.
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ApiError::Timeout
        } else {
            ApiError::NetworkError(err)
        }
    }

    pub fn is_row_not_found(&self) -> bool {
        matches!(self, ApiError::RowNotFound)
    }
}
