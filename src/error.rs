//! Error types for Tributary.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;

/// Result type alias using Tributary's Error.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Tributary operations.
///
/// Errors are cheap to clone so that a single failure can be delivered to
/// every subscriber of a multicast stage.
#[derive(Error, Debug, Clone)]
pub enum Error {
    /// A stage or producer was built with arguments it cannot honour.
    #[error("construction error: {0}")]
    Construction(String),

    /// A value or end was pushed after the producer closed.
    #[error("producer is closed")]
    ClosedProducer,

    /// A value was pushed while nothing was subscribed to the channel.
    #[error("producer has no active subscriber")]
    Inactive,

    /// No value arrived within the configured interval.
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// A composition transform refused to build its stage.
    #[error("transform failed: {0}")]
    UserTransform(String),

    /// A failure raised by user code while the stream was running.
    #[error("stream failure: {0}")]
    Failure(String),

    /// Wrapped foreign error.
    #[error("{0}")]
    Other(Arc<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Create a stream failure from a message.
    pub fn failure(message: impl Into<String>) -> Self {
        Self::Failure(message.into())
    }

    /// Wrap any error type.
    pub fn other<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Other(Arc::new(error))
    }

    /// Whether this is a timeout.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    /// Whether this error was caused by pushing into a closed producer.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClosedProducer)
    }
}
