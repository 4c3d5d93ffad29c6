//! Error types and handling for the GEPA optimizer
//!
//! Configuration errors are fatal and raised before any metric call is spent;
//! adapter and reflection errors are operational and handled by the engine's
//! isolate-and-continue / abandon-iteration paths.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for GEPA operations
pub type GepaResult<T> = std::result::Result<T, GepaError>;

/// Error types for GEPA operations
#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum GepaError {
    /// Caller configuration errors (invalid budget, empty datasets, etc.)
    #[error("Configuration error: {parameter}: {message}")]
    Configuration { parameter: String, message: String },

    /// Adapter contract violations or adapter-level failures
    #[error("Adapter error: {stage}: {message}")]
    Adapter { stage: String, message: String },

    /// Reflection model failures (unreachable LM, unusable response)
    #[error("Reflection error: {message}")]
    Reflection { message: String },

    /// Evaluation and scoring errors
    #[error("Evaluation error: {message}")]
    Evaluation { message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {context}: {message}")]
    Serialization { context: String, message: String },

    /// HTTP transport errors from LM endpoints
    #[error("HTTP error: {message}")]
    Http { message: String },

    /// IO errors (run directory persistence)
    #[error("IO error: {message}")]
    Io { message: String },
}

impl GepaError {
    /// Create a new configuration error
    pub fn configuration<S: Into<String>>(parameter: S, message: S) -> Self {
        Self::Configuration {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create a new adapter error
    pub fn adapter<S: Into<String>>(stage: S, message: S) -> Self {
        Self::Adapter {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// Create a new reflection error
    pub fn reflection<S: Into<String>>(message: S) -> Self {
        Self::Reflection {
            message: message.into(),
        }
    }

    /// Create a new evaluation error
    pub fn evaluation<S: Into<String>>(message: S) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    /// Create a new serialization error
    pub fn serialization<S: Into<String>>(context: S, message: S) -> Self {
        Self::Serialization {
            context: context.into(),
            message: message.into(),
        }
    }

    /// Create a new HTTP error
    pub fn http<S: Into<String>>(message: S) -> Self {
        Self::Http {
            message: message.into(),
        }
    }

    /// Create a new IO error
    pub fn io<S: Into<String>>(message: S) -> Self {
        Self::Io {
            message: message.into(),
        }
    }

    /// Get the error category for logging and monitoring
    pub fn category(&self) -> &'static str {
        match self {
            Self::Configuration { .. } => "configuration",
            Self::Adapter { .. } => "adapter",
            Self::Reflection { .. } => "reflection",
            Self::Evaluation { .. } => "evaluation",
            Self::Serialization { .. } => "serialization",
            Self::Http { .. } => "http",
            Self::Io { .. } => "io",
        }
    }

    /// Check if the error is recoverable by the engine
    ///
    /// Reflection and HTTP errors abandon the current iteration; everything
    /// else propagates out of the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Reflection { .. } | Self::Http { .. })
    }
}

impl From<serde_json::Error> for GepaError {
    fn from(error: serde_json::Error) -> Self {
        Self::serialization("json", &error.to_string())
    }
}

impl From<std::io::Error> for GepaError {
    fn from(error: std::io::Error) -> Self {
        Self::io(error.to_string())
    }
}

impl From<reqwest::Error> for GepaError {
    fn from(error: reqwest::Error) -> Self {
        Self::http(error.to_string())
    }
}
