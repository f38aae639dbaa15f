use ddm_core::{ServiceError, ValidationError};
use thiserror::Error;

pub const FALLBACK_ERROR_MESSAGE: &str = "An unexpected error occurred.";

/// Failure of one API call. Cloneable so it can live inside a published
/// `RequestState`.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ApiError {
    #[error("network failure: {message}")]
    Network { message: String },
    #[error("request timed out after {seconds}s")]
    Timeout { seconds: u64 },
    #[error("client error {status}: {message}")]
    Client { status: u16, message: String },
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },
    #[error("invalid input: {0}")]
    Validation(#[from] ValidationError),
    #[error("unexpected response body: {message}")]
    Decode { message: String },
}

impl ApiError {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    /// Classifies a non-2xx response. `body` is the raw response text, which
    /// may or may not be a JSON service error.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ServiceError>(body)
            .ok()
            .and_then(|err| err.message)
            .filter(|message| !message.trim().is_empty())
            .unwrap_or_else(|| {
                let text = body.trim();
                if text.is_empty() || text.starts_with('{') {
                    default_reason(status).to_string()
                } else {
                    text.to_string()
                }
            });
        if status >= 500 {
            Self::Server { status, message }
        } else {
            Self::Client { status, message }
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Client { status, .. } | Self::Server { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status() == Some(401)
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    pub fn is_network(&self) -> bool {
        matches!(self, Self::Network { .. } | Self::Timeout { .. })
    }

    /// Only failures where repeating an idempotent read can help.
    pub fn is_retryable(&self) -> bool {
        self.is_network() || matches!(self, Self::Server { .. })
    }

    /// Machine-usable code for callers that branch on the failure kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network { .. } => "network",
            Self::Timeout { .. } => "timeout",
            Self::Client { status: 401, .. } => "unauthorized",
            Self::Client { status: 404, .. } => "not_found",
            Self::Client { .. } => "client",
            Self::Server { .. } => "server",
            Self::Validation(_) => "validation",
            Self::Decode { .. } => "decode",
        }
    }

    /// Text suitable for a transient user notification.
    pub fn message(&self) -> String {
        let text = match self {
            Self::Client { message, .. } | Self::Server { message, .. } => message.clone(),
            Self::Validation(err) => err.message.clone(),
            Self::Network { .. } | Self::Timeout { .. } | Self::Decode { .. } => String::new(),
        };
        if text.trim().is_empty() {
            FALLBACK_ERROR_MESSAGE.to_string()
        } else {
            text
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Decode {
                message: err.to_string(),
            };
        }
        if let Some(status) = err.status() {
            return Self::from_status(status.as_u16(), "");
        }
        Self::network(err.to_string())
    }
}

fn default_reason(status: u16) -> &'static str {
    match status {
        400 => "Bad request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not found",
        409 => "Conflict",
        422 => "Unprocessable entity",
        500 => "Internal server error",
        502 => "Bad gateway",
        503 => "Service unavailable",
        _ => "Request failed",
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("'{0}' not populated")]
    Missing(&'static str),
    #[error("invalid url for {key}: {source}")]
    InvalidUrl {
        key: &'static str,
        #[source]
        source: url::ParseError,
    },
    #[error("invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

#[derive(Debug, Error)]
pub enum PushError {
    #[error("push connect failed: {0}")]
    Connect(String),
    #[error("push transport failed: {0}")]
    Transport(String),
}

impl From<tokio_tungstenite::tungstenite::Error> for PushError {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_error_message_is_preferred() {
        let err = ApiError::from_status(422, r#"{"status":422,"message":"Invalid password"}"#);
        assert_eq!(
            err,
            ApiError::Client {
                status: 422,
                message: "Invalid password".to_string()
            }
        );
        assert_eq!(err.message(), "Invalid password");
        assert_eq!(err.code(), "client");
    }

    #[test]
    fn empty_bodies_fall_back_to_reason() {
        let err = ApiError::from_status(503, "");
        assert_eq!(err.status(), Some(503));
        assert!(err.is_retryable());
        assert_eq!(err.message(), "Service unavailable");

        let unauthorized = ApiError::from_status(401, "{}");
        assert!(unauthorized.is_unauthorized());
        assert_eq!(unauthorized.code(), "unauthorized");
        assert!(!unauthorized.is_retryable());
    }

    #[test]
    fn plain_text_bodies_become_the_message() {
        let err = ApiError::from_status(404, "no such brand");
        assert!(err.is_not_found());
        assert_eq!(err.message(), "no such brand");
    }

    #[test]
    fn transport_failures_use_generic_message() {
        let err = ApiError::network("connection refused");
        assert!(err.is_network());
        assert_eq!(err.status(), None);
        assert_eq!(err.message(), FALLBACK_ERROR_MESSAGE);
        assert_eq!(ApiError::Timeout { seconds: 20 }.message(), FALLBACK_ERROR_MESSAGE);
    }
}
