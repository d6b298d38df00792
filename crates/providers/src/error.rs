//! Provider failure classification.

/// A failure from an external collaborator, classified for retry.
///
/// Transient failures (timeouts, rate limits, 5xx) are eligible for
/// in-stage retry; permanent failures halt the stage immediately.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("Transient provider failure: {0}")]
    Transient(String),

    #[error("Permanent provider failure: {0}")]
    Permanent(String),
}

impl ProviderError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            return Self::Transient(err.to_string());
        }
        if let Some(status) = err.status() {
            if status.is_server_error() || status.as_u16() == 429 {
                return Self::Transient(err.to_string());
            }
            return Self::Permanent(err.to_string());
        }
        // Request/body construction problems will not heal on retry.
        Self::Permanent(err.to_string())
    }
}

impl From<std::io::Error> for ProviderError {
    fn from(err: std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound | std::io::ErrorKind::PermissionDenied => {
                Self::Permanent(err.to_string())
            }
            _ => Self::Transient(err.to_string()),
        }
    }
}
