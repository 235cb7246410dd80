//! # Gallery Common
//!
//! Common error types and logging configuration for the Gallery client
//! runtime crates.
//!
//! ## Features
//!
//! - Unified error type with categorized variants
//! - Logging configuration and setup
//! - Result extension traits

use std::time::Duration;
use thiserror::Error;

pub mod logging;

pub use logging::{init_logging, LogConfig, LogFormat};

/// Unified error type for the Gallery client runtime.
#[derive(Error, Debug)]
pub enum GalleryError {
    /// Network-related errors.
    #[error("Network error: {message}")]
    Network {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Configuration errors.
    #[error("Config error: {message}")]
    Config {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Invalid lifecycle state for the requested operation.
    #[error("State error: {0}")]
    State(String),

    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Internal error (unexpected).
    #[error("Internal error: {message}")]
    Internal {
        message: String,
        backtrace: Option<backtrace::Backtrace>,
    },
}

impl GalleryError {
    /// Create a network error.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            source: None,
        }
    }

    /// Create a network error with source.
    pub fn network_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Network {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a config error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config {
            message: message.into(),
            source: None,
        }
    }

    /// Create a config error with source.
    pub fn config_with_source<E: std::error::Error + Send + Sync + 'static>(
        message: impl Into<String>,
        source: E,
    ) -> Self {
        Self::Config {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create a state error.
    pub fn state(message: impl Into<String>) -> Self {
        Self::State(message.into())
    }

    /// Create an internal error with backtrace.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            backtrace: Some(backtrace::Backtrace::new()),
        }
    }

    /// Check if this error came from the network.
    pub fn is_network(&self) -> bool {
        matches!(self, GalleryError::Network { .. } | GalleryError::Timeout(_))
    }

    /// Get the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            GalleryError::Network { .. } => "network",
            GalleryError::Config { .. } => "config",
            GalleryError::State(_) => "state",
            GalleryError::Timeout(_) => "timeout",
            GalleryError::Internal { .. } => "internal",
        }
    }
}

/// Result type alias for Gallery client operations.
pub type Result<T> = std::result::Result<T, GalleryError>;

/// Extension trait for Result.
pub trait ResultExt<T> {
    /// Add context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;
}

impl<T, E: std::error::Error + Send + Sync + 'static> ResultExt<T> for std::result::Result<T, E> {
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| GalleryError::Internal {
            message: format!("{}: {}", message.into(), e),
            backtrace: Some(backtrace::Backtrace::new()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_categories() {
        assert_eq!(GalleryError::network("test").category(), "network");
        assert_eq!(GalleryError::state("test").category(), "state");
        assert_eq!(
            GalleryError::Timeout(Duration::from_secs(1)).category(),
            "timeout"
        );
    }

    #[test]
    fn test_is_network() {
        assert!(GalleryError::network("test").is_network());
        assert!(GalleryError::Timeout(Duration::from_secs(1)).is_network());
        assert!(!GalleryError::config("test").is_network());
    }

    #[test]
    fn test_result_context() {
        let failed: std::result::Result<(), std::io::Error> =
            Err(std::io::Error::new(std::io::ErrorKind::Other, "boom"));
        let err = failed.context("reading manifest").unwrap_err();
        assert_eq!(err.category(), "internal");
        assert!(err.to_string().contains("reading manifest"));
    }
}
