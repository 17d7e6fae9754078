//! Channels: the write side of a stream.
//!
//! Opening a channel yields a producer handle and the [`Stream`] it feeds.
//! The handle's type fixes what the producer can do:
//!
//! | Constructor | Handle | Capability |
//! |-------------|--------|------------|
//! | [`channel`] | [`Input`] | One exclusive producer |
//! | [`multi_channel`] | [`MultiInput`] | Cloneable, every clone pushes |
//! | [`merged_channel`] | [`MergedInput`] | Cloneable, streams attach and detach at runtime |
//!
//! A channel's stream is single-pass and holds at most one activation.
//! Pushing while nothing is subscribed fails with [`Error::Inactive`];
//! pushing after an end fails with [`Error::ClosedProducer`]. An end pushed
//! before activation is kept and delivered when the stream activates.
//!
//! # Example
//!
//! ```rust
//! use tributary::channel::{Producer, channel};
//! use tributary::Context;
//! use std::sync::{Arc, Mutex};
//!
//! let (input, stream) = channel::<u32>();
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//! let _sub = stream.subscribe_values(&Context::Direct, move |v| sink.lock().unwrap().push(v));
//!
//! input.push(1).unwrap();
//! input.push(2).unwrap();
//! input.close().unwrap();
//! assert!(input.push(3).is_err());
//! assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
//! ```

mod merged;
mod producer;

pub use merged::{AttachmentId, ClosePropagation, MergePolicy, MergedInput, merged_channel};
pub use producer::{Input, MultiInput, Producer, channel, multi_channel};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::error::{Error, Result};
use crate::event::{Event, StreamEnd};
use crate::observability::{self, RejectReason};
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

static NEXT_CHANNEL_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a channel allocation.
///
/// Two producer handles report the same id exactly when they write into the
/// same channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChannelId(u64);

impl ChannelId {
    fn next() -> Self {
        Self(NEXT_CHANNEL_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// The raw id.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for ChannelId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ch{}", self.0)
    }
}

// ============================================================================
// Bind Target
// ============================================================================

/// A producer side that another stream can be bound into.
///
/// Values of the bound stream are pushed into the target; its end ends the
/// target (for [`MergedInput`], subject to the merge policy). Dropping the
/// returned subscription unbinds.
pub trait BindTarget<T> {
    /// Activate `stream` and feed it into this target.
    fn bind_stream(&self, stream: Stream<T>) -> Subscription;
}

// ============================================================================
// Channel Core
// ============================================================================

pub(crate) struct ChannelCore<T> {
    id: ChannelId,
    state: Mutex<CoreState<T>>,
}

struct CoreState<T> {
    closed: bool,
    pending_end: Option<StreamEnd>,
    outlet: Option<Arc<Outlet<T>>>,
}

impl<T: Send + 'static> ChannelCore<T> {
    pub(crate) fn open() -> Arc<Self> {
        let id = ChannelId::next();
        tracing::debug!(channel = %id, "channel opened");
        Arc::new(Self {
            id,
            state: Mutex::new(CoreState {
                closed: false,
                pending_end: None,
                outlet: None,
            }),
        })
    }

    pub(crate) fn id(&self) -> ChannelId {
        self.id
    }

    /// The stream this channel feeds.
    pub(crate) fn output(self: &Arc<Self>) -> Stream<T> {
        let core = self.clone();
        Stream::from_fn(move |emitter| core.activate(emitter))
    }

    fn activate(self: &Arc<Self>, emitter: Emitter<T>) -> Subscription {
        let outlet = Outlet::new(emitter);
        {
            let mut state = lock(&self.state);
            match state.pending_end.take() {
                Some(end) => {
                    outlet.push(Event::End(end));
                }
                None if state.closed => {}
                None => state.outlet = Some(outlet.clone()),
            }
        }
        outlet.drain();

        let core: Weak<Self> = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(core) = core.upgrade() {
                core.deactivate();
            }
        })
    }

    fn deactivate(&self) {
        let outlet = lock(&self.state).outlet.take();
        if let Some(outlet) = outlet {
            tracing::debug!(channel = %self.id, "channel deactivated");
            outlet.detach();
        }
    }

    pub(crate) fn push(&self, value: T) -> Result<()> {
        let outlet = {
            let state = lock(&self.state);
            if state.closed {
                return Err(self.reject(RejectReason::Closed));
            }
            match &state.outlet {
                Some(outlet) if outlet.push(Event::Value(value)) => outlet.clone(),
                _ => return Err(self.reject(RejectReason::Inactive)),
            }
        };
        observability::record_value_pushed();
        outlet.drain();
        Ok(())
    }

    pub(crate) fn end(&self, end: StreamEnd) -> Result<()> {
        if self.finish(end) {
            Ok(())
        } else {
            Err(self.reject(RejectReason::Closed))
        }
    }

    /// End the channel unless it already ended. Returns whether this call
    /// ended it.
    pub(crate) fn finish(&self, end: StreamEnd) -> bool {
        let outlet = {
            let mut state = lock(&self.state);
            if state.closed {
                return false;
            }
            state.closed = true;
            match state.outlet.take() {
                Some(outlet) => {
                    outlet.push(Event::End(end));
                    Some(outlet)
                }
                None => {
                    state.pending_end = Some(end);
                    None
                }
            }
        };
        if let Some(outlet) = outlet {
            outlet.drain();
        }
        true
    }

    pub(crate) fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }

    pub(crate) fn is_active(&self) -> bool {
        lock(&self.state)
            .outlet
            .as_ref()
            .is_some_and(|outlet| !outlet.is_closed())
    }

    /// Feed `stream` into this channel, propagating its end.
    pub(crate) fn bind(self: &Arc<Self>, stream: Stream<T>) -> Subscription {
        let core = Arc::downgrade(self);
        stream.activate(Emitter::new(move |event| {
            let Some(core) = core.upgrade() else {
                return;
            };
            match event {
                Event::Value(value) => {
                    let _ = core.push(value);
                }
                Event::End(end) => {
                    core.finish(end);
                }
            }
        }))
    }

    fn reject(&self, reason: RejectReason) -> Error {
        tracing::trace!(channel = %self.id, reason = reason.as_str(), "push rejected");
        observability::record_push_rejected(reason);
        match reason {
            RejectReason::Inactive => Error::Inactive,
            RejectReason::Closed => Error::ClosedProducer,
        }
    }
}
