//! Hand-off primitives for bridging a stream into another graph.
//!
//! - [`Junction`]: a re-bindable connection point. The upstream is activated
//!   on first bind and stays active across disconnect/bind cycles.
//! - [`Capture`]: activates the upstream immediately and holds what arrives
//!   until the caller decides where the rest of the stream goes.

use std::sync::{Arc, Mutex};

use super::outlet::Outlet;
use super::{Emitter, Stream, Subscription};
use crate::channel::BindTarget;
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Event, StreamEnd};
use crate::sync::lock;

// ============================================================================
// Junction
// ============================================================================

/// A connection point that can be bound, disconnected and re-bound.
///
/// Events that arrive while the junction is disconnected are dropped. An
/// end that arrives while disconnected is kept and delivered to the next
/// binding.
pub struct Junction<T> {
    relay: Arc<Mutex<Relay<T>>>,
    upstream: Option<Stream<T>>,
    upstream_subscription: Option<Subscription>,
    binding: Option<Subscription>,
}

struct Relay<T> {
    outlet: Option<Arc<Outlet<T>>>,
    end: Option<StreamEnd>,
}

impl<T: Send + 'static> Junction<T> {
    pub(crate) fn new(upstream: Stream<T>) -> Self {
        Self {
            relay: Arc::new(Mutex::new(Relay {
                outlet: None,
                end: None,
            })),
            upstream: Some(upstream),
            upstream_subscription: None,
            binding: None,
        }
    }

    /// Bind the junction's output to a producer side.
    ///
    /// Fails with [`Error::Construction`] if the junction is already bound.
    pub fn bind<B>(&mut self, target: &B) -> Result<()>
    where
        B: BindTarget<T> + ?Sized,
    {
        if self.binding.is_some() {
            return Err(Error::Construction("junction is already bound".into()));
        }

        let relay = self.relay.clone();
        let output = Stream::from_fn(move |emitter| {
            let outlet = Outlet::new(emitter);
            {
                let mut relay = lock(&relay);
                if let Some(end) = relay.end.clone() {
                    outlet.push(Event::End(end));
                }
                relay.outlet = Some(outlet.clone());
            }
            outlet.drain();
            Subscription::new(move || {
                let previous = lock(&relay).outlet.take();
                if let Some(previous) = previous {
                    previous.detach();
                }
            })
        });
        self.binding = Some(target.bind_stream(output));

        if let Some(upstream) = self.upstream.take() {
            let relay = self.relay.clone();
            self.upstream_subscription = Some(upstream.activate(Emitter::new(move |event| {
                let outlet = {
                    let mut relay = lock(&relay);
                    if let Event::End(end) = &event {
                        relay.end = Some(end.clone());
                    }
                    relay.outlet.clone()
                };
                if let Some(outlet) = outlet {
                    outlet.emit(event);
                }
            })));
        }
        Ok(())
    }

    /// Detach from the current target. Returns `false` if not bound.
    pub fn disconnect(&mut self) -> bool {
        self.binding.take().is_some()
    }

    /// Whether the junction currently feeds a target.
    pub fn is_bound(&self) -> bool {
        self.binding.is_some()
    }
}

impl<T> std::fmt::Debug for Junction<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Junction")
            .field("bound", &self.binding.is_some())
            .field("activated", &self.upstream.is_none())
            .finish()
    }
}

// ============================================================================
// Capture
// ============================================================================

/// An activated stream whose output has not been routed yet.
///
/// Everything that arrives before [`Capture::resume`] is held: values in
/// order, plus the end if there was one.
pub struct Capture<T> {
    state: Arc<Mutex<CaptureState<T>>>,
    upstream: Subscription,
}

struct CaptureState<T> {
    captured: Vec<T>,
    end: Option<StreamEnd>,
    outlet: Option<Arc<Outlet<T>>>,
}

impl<T: Send + 'static> Capture<T> {
    pub(crate) fn new(upstream: Stream<T>) -> Self {
        let state = Arc::new(Mutex::new(CaptureState {
            captured: Vec::new(),
            end: None,
            outlet: None,
        }));
        let sink = state.clone();
        let upstream = upstream.activate(Emitter::new(move |event| {
            let outlet = {
                let mut state = lock(&sink);
                match &state.outlet {
                    Some(outlet) => outlet.clone(),
                    None => {
                        match event {
                            Event::Value(v) => state.captured.push(v),
                            Event::End(end) => state.end = Some(end),
                        }
                        return;
                    }
                }
            };
            outlet.emit(event);
        }));
        Self { state, upstream }
    }

    /// The values captured so far.
    pub fn values(&self) -> Vec<T>
    where
        T: Clone,
    {
        lock(&self.state).captured.clone()
    }

    /// The end captured so far, if the upstream already finished.
    pub fn end(&self) -> Option<StreamEnd> {
        lock(&self.state).end.clone()
    }

    /// Continue the stream.
    ///
    /// With `resend`, the captured values are delivered first; otherwise the
    /// returned stream starts with whatever arrives next. A captured end is
    /// always delivered.
    pub fn resume(self, resend: bool) -> Stream<T> {
        let Capture { state, upstream } = self;
        Stream::from_fn(move |emitter| {
            let outlet = Outlet::new(emitter);
            {
                let mut state = lock(&state);
                let captured = std::mem::take(&mut state.captured);
                if resend {
                    for value in captured {
                        outlet.push(Event::Value(value));
                    }
                }
                if let Some(end) = state.end.take() {
                    outlet.push(Event::End(end));
                }
                state.outlet = Some(outlet.clone());
            }
            outlet.drain();

            upstream.merge(Subscription::new(move || {
                let outlet = lock(&state).outlet.take();
                if let Some(outlet) = outlet {
                    outlet.detach();
                }
            }))
        })
    }

    /// Resume into a handler.
    pub fn subscribe<H>(self, ctx: &Context, resend: bool, handler: H) -> Subscription
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        self.resume(resend).subscribe(ctx, handler)
    }

    /// Resume into a producer side.
    pub fn bind_to<B>(self, target: &B, resend: bool) -> Subscription
    where
        B: BindTarget<T> + ?Sized,
    {
        self.resume(resend).bind_to(target)
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Turn this stream into a re-bindable [`Junction`].
    pub fn junction(self) -> Junction<T> {
        Junction::new(self)
    }

    /// Activate now and hold the output; see [`Capture`].
    pub fn capture(self) -> Capture<T> {
        Capture::new(self)
    }
}
