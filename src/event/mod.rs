//! Events that flow through streams.
//!
//! Every delivery carries either a value or the end of the stream. An end is
//! terminal: a stage that has delivered one never delivers anything again.
//!
//! # Example
//!
//! ```rust
//! use tributary::event::{Event, StreamEnd};
//!
//! let value: Event<u32> = Event::Value(7);
//! assert_eq!(value.map(|v| v * 2).into_value(), Some(14));
//!
//! let end: Event<u32> = Event::End(StreamEnd::Complete);
//! assert!(end.is_end());
//! ```

use crate::error::Error;

// ============================================================================
// Stream End
// ============================================================================

/// The reason a stream stopped delivering values.
#[derive(Debug, Clone)]
pub enum StreamEnd {
    /// The producer closed normally.
    Complete,

    /// The producer went away without closing (handle dropped, attempt
    /// abandoned).
    Cancelled,

    /// The stream terminated with an error.
    Failed(Error),
}

impl StreamEnd {
    /// Whether the stream closed normally.
    pub fn is_complete(&self) -> bool {
        matches!(self, Self::Complete)
    }

    /// Whether the stream was cancelled.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Whether the stream terminated with an error.
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Failed(_))
    }

    /// The error, if this end is a failure.
    pub fn error(&self) -> Option<&Error> {
        match self {
            Self::Failed(err) => Some(err),
            _ => None,
        }
    }
}

impl From<Error> for StreamEnd {
    fn from(err: Error) -> Self {
        Self::Failed(err)
    }
}

// ============================================================================
// Event
// ============================================================================

/// A single delivery on a stream.
#[derive(Debug, Clone)]
pub enum Event<T> {
    /// A value.
    Value(T),

    /// The terminal event.
    End(StreamEnd),
}

impl<T> Event<T> {
    /// Shorthand for a failure end.
    pub fn failed(err: Error) -> Self {
        Self::End(StreamEnd::Failed(err))
    }

    /// Shorthand for a normal end.
    pub fn complete() -> Self {
        Self::End(StreamEnd::Complete)
    }

    /// Whether this event is terminal.
    pub fn is_end(&self) -> bool {
        matches!(self, Self::End(_))
    }

    /// Borrow the value, if any.
    pub fn value(&self) -> Option<&T> {
        match self {
            Self::Value(v) => Some(v),
            Self::End(_) => None,
        }
    }

    /// Take the value, if any.
    pub fn into_value(self) -> Option<T> {
        match self {
            Self::Value(v) => Some(v),
            Self::End(_) => None,
        }
    }

    /// Borrow the end, if any.
    pub fn end(&self) -> Option<&StreamEnd> {
        match self {
            Self::Value(_) => None,
            Self::End(end) => Some(end),
        }
    }

    /// Transform the value, leaving an end untouched.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Event<U> {
        match self {
            Self::Value(v) => Event::Value(f(v)),
            Self::End(end) => Event::End(end),
        }
    }
}

impl<T> From<crate::error::Result<T>> for Event<T> {
    fn from(result: crate::error::Result<T>) -> Self {
        match result {
            Ok(v) => Self::Value(v),
            Err(err) => Self::failed(err),
        }
    }
}
