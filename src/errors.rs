use thiserror::Error;

pub type GatewayResult<T> = Result<T, GatewayError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    #[error("{operation} failed: {message}")]
    Provider {
        operation: &'static str,
        message: String,
    },
    #[error("session budget of {limit} provider calls exhausted")]
    QuotaExceeded { limit: u32 },
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    #[error("{0}")]
    Config(String),
    #[error("gateway dropped the request before it resolved")]
    Closed,
}

impl GatewayError {
    pub fn provider(operation: &'static str, message: impl Into<String>) -> Self {
        GatewayError::Provider {
            operation,
            message: message.into(),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, GatewayError::Provider { .. })
    }

    pub fn is_quota_exceeded(&self) -> bool {
        matches!(self, GatewayError::QuotaExceeded { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_provider_failures_are_retryable() {
        assert!(GatewayError::provider("reverse geocode", "timeout").is_retryable());
        assert!(!GatewayError::QuotaExceeded { limit: 100 }.is_retryable());
        assert!(!GatewayError::InvalidRequest("empty".into()).is_retryable());
        assert!(GatewayError::QuotaExceeded { limit: 3 }.is_quota_exceeded());
    }
}
