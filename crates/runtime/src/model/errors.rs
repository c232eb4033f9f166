use thiserror::Error;

/// Errors from LLM provider calls.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ModelError {
    /// The request never produced an HTTP response.
    #[error("network: {0}")]
    Network(String),

    /// The provider answered with a non-success status.
    #[error("provider api ({status}): {message}")]
    Api { status: u16, message: String },

    /// The provider response could not be parsed.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

impl ModelError {
    /// Whether the provider rejected the call for rate or capacity reasons.
    pub fn is_overloaded(&self) -> bool {
        matches!(self, Self::Api { status, .. } if *status == 429 || *status == 503)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limits_count_as_overload() {
        let api = |status| ModelError::Api {
            status,
            message: String::new(),
        };
        assert!(api(429).is_overloaded());
        assert!(api(503).is_overloaded());
        assert!(!api(400).is_overloaded());
        assert!(!ModelError::Network("reset".into()).is_overloaded());
    }
}
