//! Stream descriptions and the engine that activates them.
//!
//! A [`Stream`] is a single-pass description of a push-based event source.
//! Nothing happens until it is activated with an [`Emitter`]; activation
//! returns a [`Subscription`] that tears the chain down again. Operators
//! consume a stream and return a new one, so a stage can only ever feed one
//! downstream. Use a [`MultiStream`] to fan out.
//!
//! # Example
//!
//! ```rust
//! use tributary::{Context, Stream};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _sub = Stream::from_values(1..=4)
//!     .map(|x| x * 10)
//!     .subscribe_values(&Context::Direct, move |v| sink.lock().unwrap().push(v));
//! assert_eq!(*seen.lock().unwrap(), vec![10, 20, 30, 40]);
//! ```

pub(crate) mod emitter;
mod junction;
mod multi;
pub(crate) mod outlet;
mod subscription;
mod terminal;

pub use emitter::Emitter;
pub use junction::{Capture, Junction};
pub use multi::{MultiStream, Snapshot};
pub use subscription::Subscription;
pub use terminal::EventStream;

use crate::error::Error;

type Connect<T> = Box<dyn FnOnce(Emitter<T>) -> Subscription + Send>;

// ============================================================================
// Stage
// ============================================================================

/// A composable tail stage: either a [`Stream`] or a [`MultiStream`].
pub trait Stage: Send + Sized + 'static {
    /// The value type delivered by this stage.
    type Item: Send + 'static;

    /// View this stage as a single-pass stream.
    fn into_stream(self) -> Stream<Self::Item>;
}

// ============================================================================
// Stream
// ============================================================================

/// A single-pass description of a push-based event source.
#[must_use = "streams do nothing until activated or subscribed"]
pub struct Stream<T> {
    connect: Connect<T>,
}

impl<T: Send + 'static> Stream<T> {
    /// Build a stream from its activation function.
    ///
    /// `connect` receives the downstream emitter when the stream is
    /// activated and returns whatever must be released on cancellation.
    pub fn from_fn<F>(connect: F) -> Self
    where
        F: FnOnce(Emitter<T>) -> Subscription + Send + 'static,
    {
        Self {
            connect: Box::new(connect),
        }
    }

    /// Activate the stream, delivering into `emitter`.
    pub fn activate(self, emitter: Emitter<T>) -> Subscription {
        (self.connect)(emitter)
    }

    /// Derive a stream by wrapping the downstream emitter.
    ///
    /// `wrap` turns the emitter of the new stage into the emitter this
    /// stream delivers to. Every single-input operator is built this way.
    pub fn lift<U, F>(self, wrap: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnOnce(Emitter<U>) -> Emitter<T> + Send + 'static,
    {
        Stream::from_fn(move |downstream| self.activate(wrap(downstream)))
    }

    /// A stream of one value followed by a normal end.
    pub fn just(value: T) -> Self {
        Self::from_fn(move |mut emitter| {
            emitter.send(value);
            emitter.complete();
            Subscription::empty()
        })
    }

    /// A stream of every value in `values`, then a normal end.
    pub fn from_values<I>(values: I) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let values: Vec<T> = values.into_iter().collect();
        Self::from_fn(move |mut emitter| {
            for value in values {
                if !emitter.send(value) {
                    break;
                }
            }
            emitter.complete();
            Subscription::empty()
        })
    }

    /// A stream that ends immediately.
    pub fn empty() -> Self {
        Self::from_fn(|mut emitter| {
            emitter.complete();
            Subscription::empty()
        })
    }

    /// A stream that never delivers anything.
    pub fn never() -> Self {
        Self::from_fn(Subscription::hold)
    }

    /// A stream that fails immediately.
    pub fn failed(err: Error) -> Self {
        Self::from_fn(move |mut emitter| {
            emitter.fail(err);
            Subscription::empty()
        })
    }
}

impl<T: Send + 'static> FromIterator<T> for Stream<T> {
    fn from_iter<I: IntoIterator<Item = T>>(iter: I) -> Self {
        Self::from_values(iter)
    }
}

impl<T: Send + 'static> Stage for Stream<T> {
    type Item = T;

    fn into_stream(self) -> Stream<T> {
        self
    }
}

impl<T> std::fmt::Debug for Stream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stream")
            .field("item", &std::any::type_name::<T>())
            .finish()
    }
}


#[cfg(test)]
mod tests {
    use super::testing::Recorder;
    use super::*;

    #[test]
    fn test_just_and_from_values() {
        let rec = Recorder::attach(Stream::just(5));
        assert_eq!(rec.values(), vec![5]);
        assert!(rec.end().unwrap().is_complete());

        let rec = Recorder::attach((1..=3).collect::<Stream<_>>());
        assert_eq!(rec.values(), vec![1, 2, 3]);
    }

    #[test]
    fn test_failed_and_empty() {
        let rec = Recorder::attach(Stream::<u8>::failed(Error::failure("nope")));
        assert!(rec.values().is_empty());
        assert!(rec.end().unwrap().is_failure());

        let rec = Recorder::attach(Stream::<u8>::empty());
        assert_eq!(rec.end_count(), 1);
    }

    #[test]
    fn test_never_stays_open() {
        let rec = Recorder::attach(Stream::<u8>::never());
        assert!(rec.end().is_none());
    }

    #[test]
    fn test_lift_wraps_downstream() {
        let doubled = Stream::from_values(vec![1, 2]).lift(|mut down: Emitter<i32>| {
            Emitter::new(move |event: crate::event::Event<i32>| {
                down.emit(event.map(|v| v * 2));
            })
        });
        let rec = Recorder::attach(doubled);
        assert_eq!(rec.values(), vec![2, 4]);
    }
}
