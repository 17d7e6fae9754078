//! Fan-out stages that replay cached state to late subscribers.
//!
//! A [`MultiStream`] activates its upstream as soon as it is created and
//! folds every event into a [`Snapshot`]. Each subscriber first receives
//! the snapshot, then live events. What the snapshot keeps is decided by
//! the operator that built the stage:
//!
//! | Operator | Snapshot |
//! |----------|----------|
//! | `multicast` | Nothing but the end |
//! | `continuous` / `continuous_with` | The latest value |
//! | `playback` | Every value |
//! | `cache_until_active` | Every value until the first subscriber, then nothing |
//! | `custom_activation` | Whatever the user fold keeps |

use std::sync::{Arc, Mutex, Weak};

use super::outlet::Outlet;
use super::{Emitter, Stage, Stream, Subscription};
use crate::context::Context;
use crate::event::{Event, StreamEnd};
use crate::sync::lock;

// ============================================================================
// Snapshot
// ============================================================================

/// Cached state handed to a subscriber when it activates.
#[derive(Debug, Clone)]
pub struct Snapshot<T> {
    /// Values replayed in order.
    pub values: Vec<T>,
    /// An end replayed after the values.
    pub end: Option<StreamEnd>,
}

impl<T> Snapshot<T> {
    /// An empty snapshot.
    pub fn new() -> Self {
        Self {
            values: Vec::new(),
            end: None,
        }
    }

    /// A snapshot holding `values`.
    pub fn from_values(values: impl IntoIterator<Item = T>) -> Self {
        Self {
            values: values.into_iter().collect(),
            end: None,
        }
    }

    /// Record an end.
    pub fn with_end(mut self, end: StreamEnd) -> Self {
        self.end = Some(end);
        self
    }

    /// Whether there is nothing to replay.
    pub fn is_empty(&self) -> bool {
        self.values.is_empty() && self.end.is_none()
    }
}

impl<T> Default for Snapshot<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Core
// ============================================================================

type Fold<T> = Box<dyn FnMut(&mut Snapshot<T>, &Event<T>) + Send>;

enum Replay<T> {
    None,
    Latest,
    All,
    UntilActive { released: bool },
    Custom(Fold<T>),
}

struct MultiCore<T> {
    state: Mutex<MultiState<T>>,
    upstream: Mutex<Option<Subscription>>,
}

struct MultiState<T> {
    snapshot: Snapshot<T>,
    replay: Replay<T>,
    subscribers: Vec<(u64, Arc<Outlet<T>>)>,
    next_id: u64,
    end: Option<StreamEnd>,
}

impl<T: Clone + Send + 'static> MultiCore<T> {
    fn dispatch(&self, event: Event<T>) {
        let (outlets, finished) = {
            let mut state = lock(&self.state);
            if state.end.is_some() {
                return;
            }
            let MultiState {
                snapshot,
                replay,
                subscribers,
                ..
            } = &mut *state;
            match (replay, &event) {
                (Replay::Custom(fold), _) => fold(snapshot, &event),
                (_, Event::End(end)) => snapshot.end = Some(end.clone()),
                (Replay::Latest, Event::Value(v)) => {
                    snapshot.values.clear();
                    snapshot.values.push(v.clone());
                }
                (Replay::All, Event::Value(v)) => snapshot.values.push(v.clone()),
                (Replay::UntilActive { released: false }, Event::Value(v)) => {
                    snapshot.values.push(v.clone());
                }
                _ => {}
            }

            for (_, outlet) in subscribers.iter() {
                outlet.push(event.clone());
            }

            match event {
                Event::End(end) => {
                    state.end = Some(end);
                    (std::mem::take(&mut state.subscribers), true)
                }
                Event::Value(_) => (state.subscribers.clone(), false),
            }
        };

        for (_, outlet) in &outlets {
            outlet.drain();
        }
        if finished {
            let upstream = lock(&self.upstream).take();
            drop(upstream);
        }
    }

    fn attach(self: &Arc<Self>, emitter: Emitter<T>) -> Subscription {
        let outlet = Outlet::new(emitter);
        let registered = {
            let mut guard = lock(&self.state);
            let state = &mut *guard;
            let values = match &mut state.replay {
                Replay::UntilActive { released } if !*released => {
                    *released = true;
                    std::mem::take(&mut state.snapshot.values)
                }
                _ => state.snapshot.values.clone(),
            };
            for value in values {
                outlet.push(Event::Value(value));
            }

            match state.end.clone() {
                Some(end) => {
                    let end = state.snapshot.end.clone().unwrap_or(end);
                    outlet.push(Event::End(end));
                    None
                }
                None => {
                    let id = state.next_id;
                    state.next_id += 1;
                    state.subscribers.push((id, outlet.clone()));
                    Some(id)
                }
            }
        };
        outlet.drain();

        match registered {
            Some(id) => {
                let core = self.clone();
                Subscription::new(move || core.detach(id))
            }
            None => Subscription::empty(),
        }
    }

    fn detach(&self, id: u64) {
        let removed = {
            let mut state = lock(&self.state);
            let index = state.subscribers.iter().position(|(sid, _)| *sid == id);
            index.map(|i| state.subscribers.remove(i))
        };
        if let Some((_, outlet)) = removed {
            outlet.detach();
        }
    }
}

// ============================================================================
// MultiStream
// ============================================================================

/// A cloneable stage that many subscribers can activate.
///
/// Clones share one upstream activation. The upstream is released when the
/// last clone and the last subscriber are gone, or when it ends.
pub struct MultiStream<T> {
    core: Arc<MultiCore<T>>,
}

impl<T: Clone + Send + 'static> MultiStream<T> {
    fn with_replay(upstream: Stream<T>, replay: Replay<T>, initial: Snapshot<T>) -> Self {
        let core = Arc::new(MultiCore {
            state: Mutex::new(MultiState {
                snapshot: initial,
                replay,
                subscribers: Vec::new(),
                next_id: 0,
                end: None,
            }),
            upstream: Mutex::new(None),
        });

        let weak: Weak<MultiCore<T>> = Arc::downgrade(&core);
        let subscription = upstream.activate(Emitter::new(move |event| {
            if let Some(core) = weak.upgrade() {
                core.dispatch(event);
            }
        }));
        if lock(&core.state).end.is_none() {
            *lock(&core.upstream) = Some(subscription);
        }
        Self { core }
    }

    /// A new single-pass view of this stage.
    pub fn stream(&self) -> Stream<T> {
        let core = self.core.clone();
        Stream::from_fn(move |emitter| core.attach(emitter))
    }

    /// Subscribe directly.
    pub fn subscribe<H>(&self, ctx: &Context, handler: H) -> Subscription
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        self.stream().subscribe(ctx, handler)
    }

    /// A copy of the current snapshot.
    pub fn snapshot(&self) -> Snapshot<T> {
        lock(&self.core.state).snapshot.clone()
    }

    /// Number of active subscribers.
    pub fn subscriber_count(&self) -> usize {
        lock(&self.core.state).subscribers.len()
    }

    /// Whether the upstream has ended.
    pub fn is_ended(&self) -> bool {
        lock(&self.core.state).end.is_some()
    }
}

impl<T> Clone for MultiStream<T> {
    fn clone(&self) -> Self {
        Self {
            core: self.core.clone(),
        }
    }
}

impl<T: Clone + Send + 'static> Stage for MultiStream<T> {
    type Item = T;

    fn into_stream(self) -> Stream<T> {
        self.stream()
    }
}

impl<T> std::fmt::Debug for MultiStream<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = lock(&self.core.state);
        f.debug_struct("MultiStream")
            .field("subscribers", &state.subscribers.len())
            .field("cached", &state.snapshot.values.len())
            .field("ended", &state.end.is_some())
            .finish()
    }
}

// ============================================================================
// Operators
// ============================================================================

impl<T: Clone + Send + 'static> Stream<T> {
    /// Share one activation between many subscribers, with no replay.
    ///
    /// Subscribers that arrive after the end still receive the end.
    pub fn multicast(self) -> MultiStream<T> {
        MultiStream::with_replay(self, Replay::None, Snapshot::new())
    }

    /// Share, replaying the latest value to each new subscriber.
    pub fn continuous(self) -> MultiStream<T> {
        MultiStream::with_replay(self, Replay::Latest, Snapshot::new())
    }

    /// Like [`Stream::continuous`] with a value to replay until the
    /// upstream produces one.
    pub fn continuous_with(self, initial: T) -> MultiStream<T> {
        MultiStream::with_replay(self, Replay::Latest, Snapshot::from_values([initial]))
    }

    /// Share, replaying every value to each new subscriber.
    pub fn playback(self) -> MultiStream<T> {
        MultiStream::with_replay(self, Replay::All, Snapshot::new())
    }

    /// Buffer values until the first subscriber, hand it the buffer, then
    /// pass through.
    pub fn cache_until_active(self) -> MultiStream<T> {
        MultiStream::with_replay(
            self,
            Replay::UntilActive { released: false },
            Snapshot::new(),
        )
    }

    /// Share, with a caller-defined snapshot.
    ///
    /// `fold` sees every event, including the end, and updates the snapshot
    /// that new subscribers receive. If the fold leaves `end` unset, a
    /// subscriber arriving after the upstream ended still receives the
    /// actual end.
    ///
    /// ```rust
    /// use tributary::{Context, Snapshot, Stream};
    /// use tributary::event::Event;
    ///
    /// // Keep the two most recent values.
    /// let multi = Stream::from_values(1..=5).custom_activation(
    ///     Snapshot::new(),
    ///     |snapshot, event| {
    ///         if let Event::Value(v) = event {
    ///             snapshot.values.push(*v);
    ///             if snapshot.values.len() > 2 {
    ///                 snapshot.values.remove(0);
    ///             }
    ///         }
    ///     },
    /// );
    /// assert_eq!(multi.snapshot().values, vec![4, 5]);
    /// ```
    pub fn custom_activation<F>(self, initial: Snapshot<T>, fold: F) -> MultiStream<T>
    where
        F: FnMut(&mut Snapshot<T>, &Event<T>) + Send + 'static,
    {
        MultiStream::with_replay(self, Replay::Custom(Box::new(fold)), initial)
    }
}
