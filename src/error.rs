use thiserror::Error;

/// Errors surfaced by settlement operations.
///
/// `NotFound` and `InvalidState` are final answers and are never retried.
/// `UpstreamUnavailable` means the backing store failed or timed out; a
/// caller may retry, and every write in this crate is safe to retry.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SettlementError {
    #[error("{kind} '{id}' not found for tenant '{tenant}'")]
    NotFound {
        kind: &'static str,
        id: String,
        tenant: String,
    },

    #[error("cannot {action} {kind} '{id}': status is {status}")]
    InvalidState {
        kind: &'static str,
        id: String,
        action: &'static str,
        status: String,
    },

    #[error("validation failed: {0}")]
    Validation(String),

    #[error("backing store unavailable during {operation}: {reason}")]
    UpstreamUnavailable { operation: String, reason: String },
}

impl SettlementError {
    pub fn validation(message: impl Into<String>) -> Self {
        SettlementError::Validation(message.into())
    }

    pub fn is_upstream(&self) -> bool {
        matches!(self, SettlementError::UpstreamUnavailable { .. })
    }
}

pub type SettlementResult<T> = Result<T, SettlementError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message() {
        let err = SettlementError::NotFound {
            kind: "settlement",
            id: "abc".into(),
            tenant: "acme".into(),
        };
        assert_eq!(err.to_string(), "settlement 'abc' not found for tenant 'acme'");
    }

    #[test]
    fn test_invalid_state_message() {
        let err = SettlementError::InvalidState {
            kind: "settlement",
            id: "abc".into(),
            action: "finalize",
            status: "FINAL".into(),
        };
        assert_eq!(err.to_string(), "cannot finalize settlement 'abc': status is FINAL");
    }
}
