//! Error taxonomy shared by the actions, the detectors and the count stores.

use std::fmt;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Detector unreachable, timed out or returned something unusable
    #[error("Detection error: {0}")]
    Detection(#[from] DetectionError),

    /// A single count store could not be reached or rejected the operation
    #[error("Store {store} unavailable: {message}")]
    StoreUnavailable { store: String, message: String },

    /// One or more stores failed while applying a batch of deltas
    #[error("Persistence error: {}", StoreFailures(.failures))]
    Persistence { failures: Vec<StoreFailure> },

    /// Input rejected before any collaborator was called
    #[error("Validation error: {0}")]
    Validation(String),

    /// Bad configuration value
    #[error("Config error: {0}")]
    Config(String),
}

impl Error {
    pub fn store_unavailable(store: impl Into<String>, message: impl fmt::Display) -> Self {
        Error::StoreUnavailable {
            store: store.into(),
            message: message.to_string(),
        }
    }

    /// Names of the stores a write failed on, empty for other errors.
    pub fn failed_stores(&self) -> Vec<&str> {
        match self {
            Error::StoreUnavailable { store, .. } => vec![store.as_str()],
            Error::Persistence { failures } => failures.iter().map(|f| f.store.as_str()).collect(),
            _ => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreFailure {
    pub store: String,
    pub message: String,
}

impl fmt::Display for StoreFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.store, self.message)
    }
}

struct StoreFailures<'a>(&'a [StoreFailure]);

impl fmt::Display for StoreFailures<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", failure)?;
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum DetectionError {
    #[error("detector request timed out")]
    Timeout,

    #[error("detector unreachable: {0}")]
    Transport(String),

    #[error("detector returned HTTP {0}")]
    Status(u16),

    #[error("malformed detector output: {0}")]
    Malformed(String),

    #[error("could not decode image: {0}")]
    Image(String),
}

impl From<reqwest::Error> for DetectionError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            DetectionError::Timeout
        } else if err.is_decode() {
            DetectionError::Malformed(err.to_string())
        } else {
            DetectionError::Transport(err.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_persistence_error_lists_every_store() {
        let err = Error::Persistence {
            failures: vec![
                StoreFailure {
                    store: "mysql://db:3306/prod.counter".to_string(),
                    message: "timed out".to_string(),
                },
                StoreFailure {
                    store: "mongodb://db:27017/prod".to_string(),
                    message: "refused".to_string(),
                },
            ],
        };
        let text = err.to_string();
        assert!(text.contains("mysql://db:3306/prod.counter: timed out"));
        assert!(text.contains("mongodb://db:27017/prod: refused"));
        assert_eq!(
            err.failed_stores(),
            vec!["mysql://db:3306/prod.counter", "mongodb://db:27017/prod"]
        );
    }

    #[test]
    fn test_non_store_errors_have_no_failed_stores() {
        let err = Error::Validation("empty".to_string());
        assert!(err.failed_stores().is_empty());
        let err = Error::from(DetectionError::Timeout);
        assert!(err.failed_stores().is_empty());
    }
}
