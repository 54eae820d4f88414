use thiserror::Error;

/// Error type produced by endpoint request functions.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("no handler registered for endpoint type `{kind}`")]
    MissingHandler { kind: String },
    #[error("no endpoint registered under `{name}`")]
    MissingEndpoint { name: String },
    #[error("argument tuple for `{name}` has no structural form: {source}")]
    Key {
        name: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("value cannot be converted into an argument tuple: {0}")]
    Args(#[source] serde_json::Error),
    #[error("request for `{name}` failed: {source}")]
    Request {
        name: String,
        #[source]
        source: BoxError,
    },
}

impl CacheError {
    pub fn missing_handler(kind: impl Into<String>) -> Self {
        Self::MissingHandler { kind: kind.into() }
    }

    pub fn missing_endpoint(name: impl Into<String>) -> Self {
        Self::MissingEndpoint { name: name.into() }
    }

    pub fn request(name: impl Into<String>, source: BoxError) -> Self {
        Self::Request {
            name: name.into(),
            source,
        }
    }

    /// True for configuration mistakes made by the caller, as opposed to
    /// failures of the endpoint itself.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::MissingHandler { .. } | Self::MissingEndpoint { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn request_error_keeps_source() {
        let source: BoxError = "connection reset".into();
        let error = CacheError::request("user", source);

        assert_eq!(
            error.to_string(),
            "request for `user` failed: connection reset"
        );
        assert_eq!(
            error.source().map(ToString::to_string).as_deref(),
            Some("connection reset")
        );
        assert!(!error.is_configuration());
    }

    #[test]
    fn configuration_errors_are_flagged() {
        assert!(CacheError::missing_handler("query").is_configuration());
        assert!(CacheError::missing_endpoint("user").is_configuration());
    }
}
