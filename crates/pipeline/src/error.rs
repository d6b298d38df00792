//! Stage failure classification.

use triage_providers::ProviderError;

/// An error raised by a stage handler.
///
/// Transient errors are retried per the stage's policy; permanent errors
/// halt the sequence and fail the job. Exhausted retries convert
/// transient into permanent at the executor.
#[derive(Debug, thiserror::Error)]
pub enum StageError {
    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Permanent(String),
}

impl StageError {
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

impl From<ProviderError> for StageError {
    fn from(err: ProviderError) -> Self {
        match err {
            ProviderError::Transient(msg) => Self::Transient(msg),
            ProviderError::Permanent(msg) => Self::Permanent(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_classification_carries_over() {
        assert!(StageError::from(ProviderError::Transient("t".into())).is_transient());
        assert!(!StageError::from(ProviderError::Permanent("p".into())).is_transient());
    }
}
