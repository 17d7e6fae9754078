//! Exclusive and fixed-multi producer handles.

use std::sync::Arc;

use super::{BindTarget, ChannelCore, ChannelId};
use crate::error::{Error, Result};
use crate::event::StreamEnd;
use crate::stream::{Stream, Subscription};

/// The write side of a channel.
///
/// Only the operations every capability shares live here. Attaching and
/// detaching streams is specific to [`MergedInput`](super::MergedInput).
pub trait Producer: Send + Sync + 'static {
    /// The value type this producer pushes.
    type Item: Send + 'static;

    /// Deliver a value.
    fn push(&self, value: Self::Item) -> Result<()>;

    /// Deliver an end. Every later push fails with
    /// [`Error::ClosedProducer`].
    fn end(&self, end: StreamEnd) -> Result<()>;

    /// End normally.
    fn close(&self) -> Result<()> {
        self.end(StreamEnd::Complete)
    }

    /// End with a failure.
    fn fail(&self, err: Error) -> Result<()> {
        self.end(StreamEnd::Failed(err))
    }

    /// Identity of the underlying channel.
    fn channel_id(&self) -> ChannelId;

    /// Whether the producer has ended.
    fn is_closed(&self) -> bool;

    /// Whether a subscriber is currently receiving pushes.
    fn is_active(&self) -> bool;
}

/// Ends the channel with [`StreamEnd::Cancelled`] when the last handle goes.
pub(crate) struct ProducerGuard<T: Send + 'static> {
    pub(crate) core: Arc<ChannelCore<T>>,
}

impl<T: Send + 'static> Drop for ProducerGuard<T> {
    fn drop(&mut self) {
        if self.core.finish(StreamEnd::Cancelled) {
            tracing::debug!(channel = %self.core.id(), "producer dropped without closing");
        }
    }
}

// ============================================================================
// Exclusive
// ============================================================================

/// An exclusive producer handle.
///
/// `Input` cannot be cloned, so exactly one place in the program can push.
/// Dropping it without closing ends the stream with
/// [`StreamEnd::Cancelled`].
///
/// Streams cannot be attached to an exclusive input:
///
/// ```rust,compile_fail
/// use tributary::Stream;
/// use tributary::channel::channel;
///
/// let (input, _stream) = channel::<i32>();
/// input.attach(Stream::just(1));
/// ```
///
/// Nor can it be cloned:
///
/// ```rust,compile_fail
/// use tributary::channel::channel;
///
/// let (input, _stream) = channel::<i32>();
/// let _copy = input.clone();
/// ```
pub struct Input<T: Send + 'static> {
    guard: ProducerGuard<T>,
}

/// Open a channel with an exclusive producer.
pub fn channel<T: Send + 'static>() -> (Input<T>, Stream<T>) {
    let core = ChannelCore::open();
    let stream = core.output();
    (
        Input {
            guard: ProducerGuard { core },
        },
        stream,
    )
}

impl<T: Send + 'static> Producer for Input<T> {
    type Item = T;

    fn push(&self, value: T) -> Result<()> {
        self.guard.core.push(value)
    }

    fn end(&self, end: StreamEnd) -> Result<()> {
        self.guard.core.end(end)
    }

    fn channel_id(&self) -> ChannelId {
        self.guard.core.id()
    }

    fn is_closed(&self) -> bool {
        self.guard.core.is_closed()
    }

    fn is_active(&self) -> bool {
        self.guard.core.is_active()
    }
}

impl<T: Send + 'static> BindTarget<T> for Input<T> {
    fn bind_stream(&self, stream: Stream<T>) -> Subscription {
        self.guard.core.bind(stream)
    }
}

impl<T: Send + 'static> std::fmt::Debug for Input<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Input")
            .field("channel", &self.guard.core.id())
            .field("closed", &self.guard.core.is_closed())
            .finish()
    }
}

// ============================================================================
// Fixed Multi
// ============================================================================

/// A cloneable producer handle.
///
/// Every clone pushes into the same channel. Pushes from one clone arrive
/// in order; pushes from different clones interleave. The channel ends
/// with [`StreamEnd::Cancelled`] once every clone is dropped without an
/// explicit end.
pub struct MultiInput<T: Send + 'static> {
    guard: Arc<ProducerGuard<T>>,
}

/// Open a channel whose producer handle can be cloned.
pub fn multi_channel<T: Send + 'static>() -> (MultiInput<T>, Stream<T>) {
    let core = ChannelCore::open();
    let stream = core.output();
    (
        MultiInput {
            guard: Arc::new(ProducerGuard { core }),
        },
        stream,
    )
}

impl<T: Send + 'static> Clone for MultiInput<T> {
    fn clone(&self) -> Self {
        Self {
            guard: self.guard.clone(),
        }
    }
}

impl<T: Send + 'static> Producer for MultiInput<T> {
    type Item = T;

    fn push(&self, value: T) -> Result<()> {
        self.guard.core.push(value)
    }

    fn end(&self, end: StreamEnd) -> Result<()> {
        self.guard.core.end(end)
    }

    fn channel_id(&self) -> ChannelId {
        self.guard.core.id()
    }

    fn is_closed(&self) -> bool {
        self.guard.core.is_closed()
    }

    fn is_active(&self) -> bool {
        self.guard.core.is_active()
    }
}

impl<T: Send + 'static> BindTarget<T> for MultiInput<T> {
    fn bind_stream(&self, stream: Stream<T>) -> Subscription {
        self.guard.core.bind(stream)
    }
}

impl<T: Send + 'static> std::fmt::Debug for MultiInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MultiInput")
            .field("channel", &self.guard.core.id())
            .field("handles", &Arc::strong_count(&self.guard))
            .finish()
    }
}
