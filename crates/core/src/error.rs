use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SearchFailure {
    #[error("network failure: {message}")]
    Network { message: String },

    #[error("server responded with {status}: {message}")]
    Server { status: u16, message: String },

    #[error("could not decode search response: {message}")]
    Decode { message: String },
}

impl SearchFailure {
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }

    pub fn server(status: u16, message: impl Into<String>) -> Self {
        Self::Server {
            status,
            message: message.into(),
        }
    }

    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Whether re-issuing the same request may succeed.
    ///
    /// A malformed payload reproduces on retry, and so does a 4xx.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network { .. } => true,
            Self::Server { status, .. } => *status >= 500,
            Self::Decode { .. } => false,
        }
    }
}

impl From<reqwest::Error> for SearchFailure {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            return Self::decode(error.to_string());
        }
        match error.status() {
            Some(status) => Self::server(status.as_u16(), error.to_string()),
            None => Self::network(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for SearchFailure {
    fn from(error: serde_json::Error) -> Self {
        Self::decode(error.to_string())
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing configuration value: {0}")]
    Missing(&'static str),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("endpoint cannot carry a path: {0}")]
    NotABase(String),

    #[error("http client error: {0}")]
    Client(#[from] reqwest::Error),
}

pub type Result<T, E = SearchFailure> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::SearchFailure;

    #[test]
    fn only_transient_failures_are_retryable() {
        assert!(SearchFailure::network("connection reset").is_retryable());
        assert!(SearchFailure::server(503, "unavailable").is_retryable());
        assert!(!SearchFailure::server(404, "no such index").is_retryable());
        assert!(!SearchFailure::decode("missing field `hits`").is_retryable());
    }

    #[test]
    fn json_errors_classify_as_decode() {
        let error = serde_json::from_str::<serde_json::Value>("{not json")
            .expect_err("payload is malformed");
        assert!(matches!(SearchFailure::from(error), SearchFailure::Decode { .. }));
    }
}
