//! Terminal operations: the points where a stream is activated.

use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context as TaskContext, Poll};

use futures::StreamExt as _;
use futures::channel::mpsc;

use super::{Emitter, Stream, Subscription};
use crate::channel::BindTarget;
use crate::context::Context;
use crate::event::{Event, StreamEnd};
use crate::observability;
use crate::sync::lock;

impl<T: Send + 'static> Stream<T> {
    /// Activate the stream, running `handler` in `ctx` for every event.
    pub fn subscribe<H>(self, ctx: &Context, handler: H) -> Subscription
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        let mut handler = handler;
        let emitter = Emitter::from_boxed(ctx.bind_handler(move |event: Event<T>| {
            if let Event::End(StreamEnd::Failed(_)) = &event {
                observability::record_failure_delivered();
            }
            handler(event);
        }));

        observability::record_subscription_opened();
        self.activate(emitter)
            .merge(Subscription::new(observability::record_subscription_closed))
    }

    /// Subscribe to values only; the end is ignored.
    pub fn subscribe_values<H>(self, ctx: &Context, handler: H) -> Subscription
    where
        H: FnMut(T) + Send + 'static,
    {
        let mut handler = handler;
        self.subscribe(ctx, move |event| {
            if let Event::Value(v) = event {
                handler(v);
            }
        })
    }

    /// Subscribe until `handler` returns `false`.
    ///
    /// Returning `false` releases the upstream immediately; no further events
    /// are delivered.
    pub fn subscribe_while<H>(self, ctx: &Context, handler: H) -> Subscription
    where
        H: FnMut(Event<T>) -> bool + Send + 'static,
    {
        let slot: Arc<Mutex<WhileSlot>> = Arc::new(Mutex::new(WhileSlot::default()));
        let stop = Arc::downgrade(&slot);
        let mut handler = handler;
        let mut running = true;

        let subscription = self.subscribe(ctx, move |event| {
            if !running {
                return;
            }
            if !handler(event) {
                running = false;
                if let Some(slot) = stop.upgrade() {
                    let taken = {
                        let mut slot = lock(&slot);
                        slot.stopped = true;
                        slot.subscription.take()
                    };
                    drop(taken);
                }
            }
        });

        {
            let mut state = lock(&slot);
            if state.stopped {
                drop(state);
                drop(subscription);
                return Subscription::empty();
            }
            state.subscription = Some(subscription);
        }

        Subscription::new(move || {
            let taken = lock(&slot).subscription.take();
            drop(taken);
        })
    }

    /// Subscribe and keep the subscription alive until the stream ends.
    pub fn subscribe_until_end<H>(self, ctx: &Context, handler: H)
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        let slot: Arc<Mutex<WhileSlot>> = Arc::new(Mutex::new(WhileSlot::default()));
        let keep = slot.clone();
        let mut handler = handler;

        let subscription = self.subscribe(ctx, move |event| {
            let end = event.is_end();
            handler(event);
            if end {
                let taken = {
                    let mut slot = lock(&keep);
                    slot.stopped = true;
                    slot.subscription.take()
                };
                drop(taken);
            }
        });

        let mut state = lock(&slot);
        if !state.stopped {
            state.subscription = Some(subscription);
        }
    }

    /// Feed this stream into another channel's producer side.
    pub fn bind_to<B>(self, target: &B) -> Subscription
    where
        B: BindTarget<T> + ?Sized,
    {
        target.bind_stream(self)
    }

    /// Bridge into async code as a [`futures::Stream`] of events.
    pub fn into_events(self) -> EventStream<T> {
        let (tx, receiver) = mpsc::unbounded();
        let subscription = self.subscribe(&Context::Direct, move |event| {
            let _ = tx.unbounded_send(event);
        });
        EventStream {
            receiver,
            _subscription: subscription,
        }
    }
}

#[derive(Default)]
struct WhileSlot {
    subscription: Option<Subscription>,
    stopped: bool,
}

/// Async view of a stream's events.
///
/// Yields every event including the end, then `None`. Dropping it cancels
/// the underlying subscription.
pub struct EventStream<T> {
    receiver: mpsc::UnboundedReceiver<Event<T>>,
    _subscription: Subscription,
}

impl<T> futures::Stream for EventStream<T> {
    type Item = Event<T>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut TaskContext<'_>) -> Poll<Option<Event<T>>> {
        self.get_mut().receiver.poll_next_unpin(cx)
    }
}
