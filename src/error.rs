use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

use crate::types::Level;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Send(#[from] SendError),
    #[error("no tokio runtime available to drive the flush worker")]
    Runtime,
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read configuration file {path}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration: {0}")]
    Parse(String),
    #[error("missing required configuration field: {field}")]
    MissingField { field: &'static str },
    #[error("invalid configuration for {field}: {message}")]
    InvalidField {
        field: &'static str,
        message: String,
    },
    #[error("configuration error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to build HTTP client")]
    Client {
        #[source]
        source: reqwest::Error,
    },
    #[error("request failed: {source}")]
    Request {
        #[source]
        source: reqwest::Error,
    },
    #[error("transport has been closed")]
    Closed,
    #[error("transport error: {0}")]
    Other(String),
}

/// Failure of a single webhook post.
#[derive(Debug, Error)]
pub enum SendError {
    #[error("failed to serialize message card")]
    Payload {
        #[source]
        source: serde_json::Error,
    },
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("unexpected HTTP status {status}: {body}")]
    HttpStatus {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error("not posted: shutdown drain exceeded {}ms", timeout.as_millis())]
    ShutdownTimeout { timeout: std::time::Duration },
}

impl From<reqwest::Error> for TransportError {
    fn from(source: reqwest::Error) -> Self {
        Self::Request { source }
    }
}

impl From<serde_json::Error> for SendError {
    fn from(source: serde_json::Error) -> Self {
        Self::Payload { source }
    }
}

/// One record of a flushed batch whose post failed.
#[derive(Debug)]
pub struct RecordFailure {
    /// Position of the record inside its batch.
    pub position: usize,
    pub level: Level,
    pub message: String,
    pub error: SendError,
}

impl fmt::Display for RecordFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{}] {:?}: {}",
            self.position, self.level, self.message, self.error
        )
    }
}

/// Aggregate of every failed post within one flushed batch.
#[derive(Debug)]
pub struct BatchFailure {
    pub attempted: usize,
    pub failures: Vec<RecordFailure>,
}

impl BatchFailure {
    #[must_use]
    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    #[must_use]
    pub fn positions(&self) -> Vec<usize> {
        self.failures.iter().map(|f| f.position).collect()
    }
}

impl fmt::Display for BatchFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} webhook posts failed",
            self.failures.len(),
            self.attempted
        )?;
        for failure in &self.failures {
            write!(f, "; {failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for BatchFailure {}

impl Error {
    /// Configuration problems are reported synchronously and are never transient.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}

#[cfg(test)]
mod tests {
    use super::{BatchFailure, RecordFailure, SendError, TransportError};
    use crate::types::Level;

    #[test]
    fn batch_failure_names_every_failed_send() {
        let failure = BatchFailure {
            attempted: 3,
            failures: vec![
                RecordFailure {
                    position: 0,
                    level: Level::Error,
                    message: "r1".to_string(),
                    error: SendError::Transport(TransportError::Closed),
                },
                RecordFailure {
                    position: 2,
                    level: Level::Warning,
                    message: "r3".to_string(),
                    error: SendError::HttpStatus {
                        status: reqwest::StatusCode::BAD_REQUEST,
                        body: "bad card".to_string(),
                    },
                },
            ],
        };

        let text = failure.to_string();
        assert!(text.starts_with("2 of 3 webhook posts failed"));
        assert!(text.contains("#0 [Error] \"r1\""));
        assert!(text.contains("#2 [Warning] \"r3\""));
        assert!(text.contains("400 Bad Request"));
        assert_eq!(failure.positions(), vec![0, 2]);
    }
}
