//! Error types for the voxchat speech engine

use thiserror::Error;

/// Result type alias for voxchat core operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur while running a chat turn
#[derive(Debug, Error)]
pub enum Error {
    /// LLM backend failed (request rejected, stream broken, bad payload)
    #[error("Generation error: {0}")]
    Generation(String),

    /// Speech synthesis backend failed
    #[error("Synthesis error: {0}")]
    Synthesis(String),

    /// Audio sink failed, or a playback execution unit panicked / was aborted
    #[error("Playback error: {0}")]
    Playback(String),

    /// A previous job failed; the remaining queue will never start
    #[error("Playback queue abandoned after job {failed_ordinal} failed")]
    QueueAbandoned {
        /// Ordinal of the job whose failure abandoned the queue
        failed_ordinal: usize,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML config / prompt file error
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Short category name used in turn logs
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Generation(_) => "generation",
            Error::Synthesis(_) => "synthesis",
            Error::Playback(_) | Error::QueueAbandoned { .. } => "playback",
            Error::Config(_) => "config",
            Error::Io(_) => "io",
            Error::Serialization(_) | Error::Yaml(_) => "serialization",
            Error::Other(_) => "other",
        }
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::Other(err.to_string())
    }
}

impl From<tokio::task::JoinError> for Error {
    fn from(err: tokio::task::JoinError) -> Self {
        if err.is_cancelled() {
            Error::Playback("execution unit was aborted".to_string())
        } else {
            Error::Playback(format!("execution unit panicked: {}", err))
        }
    }
}
