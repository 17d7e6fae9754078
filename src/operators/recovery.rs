//! Recovery: the only operators that intercept a failure.

use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

use tokio::task::AbortHandle;

use crate::context::Context;
use crate::error::Error;
use crate::event::{Event, StreamEnd};
use crate::observability;
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

// ============================================================================
// Retry Policy
// ============================================================================

/// Delay between retry attempts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Backoff {
    /// Reconnect as soon as the failure arrives.
    #[default]
    Immediate,
    /// Wait the same time before every attempt.
    Fixed(Duration),
    /// Double the wait after every attempt, capped at `max`.
    Exponential {
        /// Wait before the first retry.
        initial: Duration,
        /// Upper bound for the wait.
        max: Duration,
    },
}

impl Backoff {
    /// The wait before retry number `attempt` (starting at 1).
    pub fn delay(&self, attempt: u32) -> Duration {
        match *self {
            Self::Immediate => Duration::ZERO,
            Self::Fixed(delay) => delay,
            Self::Exponential { initial, max } => {
                let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
                initial.saturating_mul(factor).min(max)
            }
        }
    }
}

/// How [`Stream::retry`] reacts to failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures tolerated before the last one is delivered.
    pub max_retries: u32,
    /// Wait before each new attempt.
    pub backoff: Backoff,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff: Backoff::Immediate,
        }
    }
}

impl RetryPolicy {
    /// Retry up to `max_retries` times without waiting.
    pub fn immediate(max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff: Backoff::Immediate,
        }
    }

    /// Retry forever.
    pub fn unlimited() -> Self {
        Self {
            max_retries: u32::MAX,
            ..Self::default()
        }
    }

    /// Set the retry limit.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Set the backoff.
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }
}

// ============================================================================
// Operators
// ============================================================================

impl<T: Send + 'static> Stream<T> {
    /// Replace a failure with the stream `f` builds from the error.
    ///
    /// Normal ends and cancellations pass through untouched.
    pub fn catch_error<F>(self, f: F) -> Stream<T>
    where
        F: FnOnce(Error) -> Stream<T> + Send + 'static,
    {
        Stream::from_fn(move |emitter| {
            let replacement: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
            let slot: Weak<Mutex<Option<Subscription>>> = Arc::downgrade(&replacement);
            let mut down = Some(emitter);
            let mut f = Some(f);

            let upstream = self.activate(Emitter::new(move |event: Event<T>| match event {
                Event::End(StreamEnd::Failed(err)) => {
                    let (Some(emitter), Some(f)) = (down.take(), f.take()) else {
                        return;
                    };
                    let subscription = f(err).activate(emitter);
                    match slot.upgrade() {
                        Some(slot) => *lock(&slot) = Some(subscription),
                        None => drop(subscription),
                    }
                }
                event => {
                    if let Some(down) = down.as_mut() {
                        down.emit(event);
                    }
                }
            }));

            upstream.merge(Subscription::new(move || {
                let taken = lock(&replacement).take();
                drop(taken);
            }))
        })
    }

    /// Transform a failure without intercepting it.
    pub fn map_errors<F>(self, f: F) -> Stream<T>
    where
        F: FnMut(Error) -> Error + Send + 'static,
    {
        let mut f = f;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::End(StreamEnd::Failed(err)) => {
                    down.fail(f(err));
                }
                event => {
                    down.emit(event);
                }
            })
        })
    }

    /// Rebuild the upstream from `factory` whenever it fails.
    ///
    /// Each failed attempt is released before the next one is subscribed.
    /// Once `policy.max_retries` failures have been retried, the next
    /// failure is delivered. Delays run on `ctx`'s timer runtime.
    ///
    /// ```rust,ignore
    /// let resilient = Stream::retry(
    ///     RetryPolicy::default().with_backoff(Backoff::Fixed(Duration::from_millis(50))),
    ///     &Context::current_runtime()?,
    ///     || connect_to_feed(),
    /// );
    /// ```
    pub fn retry<F>(policy: RetryPolicy, ctx: &Context, factory: F) -> Stream<T>
    where
        F: FnMut() -> Stream<T> + Send + 'static,
    {
        let ctx = ctx.clone();
        Stream::from_fn(move |emitter| {
            let core = Arc::new(RetryCore {
                outlet: Outlet::new(emitter),
                policy,
                ctx,
                state: Mutex::new(RetryState {
                    factory: Box::new(factory),
                    attempt: 0,
                    generation: 0,
                    current: None,
                    connecting: false,
                    reconnect: false,
                    timer: None,
                    stopped: false,
                }),
            });
            core.connect();
            Subscription::new(move || core.shutdown())
        })
    }
}

// ============================================================================
// Retry Core
// ============================================================================

struct RetryCore<T> {
    outlet: Arc<Outlet<T>>,
    policy: RetryPolicy,
    ctx: Context,
    state: Mutex<RetryState<T>>,
}

struct RetryState<T> {
    factory: Box<dyn FnMut() -> Stream<T> + Send>,
    attempt: u32,
    generation: u64,
    current: Option<Subscription>,
    /// An attempt is being activated on this call stack.
    connecting: bool,
    /// A failure arrived during activation; connect again afterwards.
    reconnect: bool,
    timer: Option<AbortHandle>,
    stopped: bool,
}

impl<T: Send + 'static> RetryCore<T> {
    fn connect(self: &Arc<Self>) {
        loop {
            let (stream, generation, previous) = {
                let mut state = lock(&self.state);
                if state.stopped {
                    return;
                }
                state.generation += 1;
                state.connecting = true;
                state.reconnect = false;
                let stream = (state.factory)();
                (stream, state.generation, state.current.take())
            };
            drop(previous);

            let weak = Arc::downgrade(self);
            let subscription = stream.activate(Emitter::new(move |event: Event<T>| {
                if let Some(core) = weak.upgrade() {
                    core.on_event(generation, event);
                }
            }));

            let (again, stale) = {
                let mut state = lock(&self.state);
                state.connecting = false;
                if state.generation == generation && !state.stopped && !state.reconnect {
                    state.current = Some(subscription);
                    (false, None)
                } else {
                    (state.reconnect && !state.stopped, Some(subscription))
                }
            };
            drop(stale);
            if !again {
                return;
            }
        }
    }

    fn on_event(self: &Arc<Self>, generation: u64, event: Event<T>) {
        let err = match event {
            Event::End(StreamEnd::Failed(err)) => err,
            event => {
                if lock(&self.state).generation == generation {
                    self.outlet.emit(event);
                }
                return;
            }
        };

        let failed_attempt = {
            let mut state = lock(&self.state);
            if state.generation != generation || state.stopped {
                return;
            }
            if state.attempt >= self.policy.max_retries {
                state.stopped = true;
                drop(state);
                tracing::debug!(attempts = self.policy.max_retries, "retries exhausted");
                self.outlet.fail(err);
                return;
            }
            state.attempt += 1;
            state.current.take()
        };
        drop(failed_attempt);

        let attempt = lock(&self.state).attempt;
        let delay = self.policy.backoff.delay(attempt);
        tracing::debug!(attempt, ?delay, error = %err, "retrying after failure");
        observability::record_retry();

        if delay.is_zero() {
            let mut state = lock(&self.state);
            if state.connecting {
                state.reconnect = true;
                return;
            }
            drop(state);
            self.connect();
            return;
        }

        let handle = match self.ctx.timer_handle() {
            Ok(handle) => handle,
            Err(err) => {
                lock(&self.state).stopped = true;
                self.outlet.fail(err);
                return;
            }
        };
        let weak = Arc::downgrade(self);
        let task = handle.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(core) = weak.upgrade() {
                core.connect();
            }
        });
        lock(&self.state).timer = Some(task.abort_handle());
    }

    fn shutdown(&self) {
        let (current, timer) = {
            let mut state = lock(&self.state);
            state.stopped = true;
            (state.current.take(), state.timer.take())
        };
        if let Some(timer) = timer {
            timer.abort();
        }
        self.outlet.detach();
        drop(current);
    }
}
