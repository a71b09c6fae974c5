use permit_desk_core::ValidationError;
use serde::Serialize;

/// Shown when the backend fails without a message of its own.
pub const GENERIC_FAILURE_MESSAGE: &str = "The request could not be completed. Please try again.";

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },
    #[error("backend reported failure: {0}")]
    Backend(String),
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("not authorized to change application status")]
    Unauthorized,
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("invalid endpoint URL: {0}")]
    InvalidUrl(String),
}

#[derive(Debug, Clone, Copy, Serialize, Eq, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Network,
    Validation,
    Backend,
    Unauthorized,
    InvalidResponse,
}

impl ApiError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport(_) | Self::Http { .. } => ErrorKind::Network,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Backend(_) => ErrorKind::Backend,
            Self::Unauthorized => ErrorKind::Unauthorized,
            Self::InvalidResponse(_) | Self::InvalidUrl(_) => ErrorKind::InvalidResponse,
        }
    }

    /// Whether offering the user a retry control makes sense. Nothing retries automatically.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Transport(_) => true,
            Self::Http { status, .. } => *status >= 500 || matches!(status, 408 | 429),
            _ => false,
        }
    }

    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Transport(err) if err.is_timeout() => {
                "The permit server took too long to respond.".to_string()
            }
            Self::Transport(_) => {
                "Could not reach the permit server. Check your connection and try again.".to_string()
            }
            Self::Http { message, .. } | Self::Backend(message) => message.clone(),
            Self::Validation(err) => err.to_string(),
            Self::Unauthorized => "You do not have permission to change application status.".to_string(),
            Self::InvalidResponse(_) | Self::InvalidUrl(_) => {
                "The permit server returned an unexpected response.".to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_errors_are_network_and_retryable_when_transient() {
        let unavailable = ApiError::Http { status: 503, message: "down".to_string() };
        assert_eq!(unavailable.kind(), ErrorKind::Network);
        assert!(unavailable.is_retryable());
        let not_found = ApiError::Http { status: 404, message: "missing".to_string() };
        assert!(!not_found.is_retryable());
        assert_eq!(not_found.user_message(), "missing");
    }

    #[test]
    fn validation_errors_never_retry() {
        let err = ApiError::from(ValidationError::MissingReason { status: "rejected" });
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(!err.is_retryable());
        assert_eq!(err.user_message(), "a reason is required when setting status to rejected");
    }
}
