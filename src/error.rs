//! Error taxonomy for the sync layer.
//!
//! None of these errors are fatal. Fetch errors mean "no update this
//! cycle"; callback errors are contained to the subscriber that raised
//! them.

/// Failure of a single snapshot fetch.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    /// Connection failure, timeout, or a non-2xx HTTP status.
    #[error("transport error fetching {url}: {reason}")]
    Transport { url: String, reason: String },

    /// The body was not JSON of the expected snapshot shape.
    #[error("decode error for {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },
}

impl FetchError {
    /// Stable short code, used in log lines and metrics.
    pub fn error_code(&self) -> &'static str {
        match self {
            FetchError::Transport { .. } => "TRANSPORT",
            FetchError::Decode { .. } => "DECODE",
        }
    }
}

/// A subscriber's own fault, caught by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum CallbackError {
    #[error("subscriber '{key}' failed: {cause:#}")]
    Failed { key: String, cause: anyhow::Error },

    #[error("subscriber '{key}' panicked: {message}")]
    Panicked { key: String, message: String },
}

impl CallbackError {
    /// The subscription key (display form) of the offending subscriber.
    pub fn key(&self) -> &str {
        match self {
            CallbackError::Failed { key, .. } | CallbackError::Panicked { key, .. } => key,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_error_display_and_code() {
        let err = FetchError::Transport {
            url: "http://127.0.0.1:8000/monitor/all".to_string(),
            reason: "HTTP 503 Service Unavailable".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "transport error fetching http://127.0.0.1:8000/monitor/all: HTTP 503 Service Unavailable"
        );
        assert_eq!(err.error_code(), "TRANSPORT");

        let source = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err = FetchError::Decode { url: "u".to_string(), source };
        assert_eq!(err.error_code(), "DECODE");
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn callback_error_keeps_key() {
        let err = CallbackError::Failed {
            key: "workflow-7".to_string(),
            cause: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.key(), "workflow-7");
        assert_eq!(err.to_string(), "subscriber 'workflow-7' failed: boom");
    }
}
