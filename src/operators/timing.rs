//! Timed operators and sources.
//!
//! Timers run as tokio tasks on the handle the [`Context`] provides, so
//! these operators must be activated inside a runtime (or be given
//! `Context::Runtime`). Activating without one fails the stream with
//! [`Error::Construction`](crate::Error::Construction).

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tokio::time::Instant;

use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::{Event, StreamEnd};
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

/// Resolve the timer runtime or fail the emitter.
fn timer_or_fail<T>(ctx: &Context, emitter: &mut Emitter<T>) -> Option<Handle> {
    match ctx.timer_handle() {
        Ok(handle) => Some(handle),
        Err(err) => {
            emitter.fail(err);
            None
        }
    }
}

struct Pending<T> {
    value: Option<T>,
    generation: u64,
    timer: Option<AbortHandle>,
}

impl<T: Send + 'static> Stream<T> {
    /// Emit a value only after `interval` passes without another one.
    ///
    /// With `flush_on_close`, a value still waiting when the upstream ends
    /// is emitted before the end; otherwise it is dropped.
    pub fn debounce(self, interval: Duration, flush_on_close: bool, ctx: &Context) -> Stream<T> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter| {
            let Some(handle) = timer_or_fail(&ctx, &mut emitter) else {
                return Subscription::empty();
            };
            let outlet = Outlet::new(emitter);
            let pending = Arc::new(Mutex::new(Pending {
                value: None,
                generation: 0,
                timer: None,
            }));

            let upstream_outlet = outlet.clone();
            let upstream_pending = pending.clone();
            let upstream = self.activate(Emitter::new(move |event: Event<T>| {
                let mut state = lock(&upstream_pending);
                match event {
                    Event::Value(v) => {
                        state.value = Some(v);
                        state.generation += 1;
                        if let Some(timer) = state.timer.take() {
                            timer.abort();
                        }
                        let generation = state.generation;
                        let outlet = upstream_outlet.clone();
                        let pending = upstream_pending.clone();
                        let task = handle.spawn(async move {
                            tokio::time::sleep(interval).await;
                            {
                                let mut state = lock(&pending);
                                if state.generation != generation {
                                    return;
                                }
                                state.timer = None;
                                if let Some(v) = state.value.take() {
                                    outlet.push(Event::Value(v));
                                }
                            }
                            outlet.drain();
                        });
                        state.timer = Some(task.abort_handle());
                    }
                    Event::End(end) => {
                        if let Some(timer) = state.timer.take() {
                            timer.abort();
                        }
                        let pending_value = state.value.take();
                        if flush_on_close {
                            if let Some(v) = pending_value {
                                upstream_outlet.push(Event::Value(v));
                            }
                        }
                        upstream_outlet.push(Event::End(end));
                        drop(state);
                        upstream_outlet.drain();
                    }
                }
            }));

            upstream.merge(Subscription::new(move || {
                if let Some(timer) = lock(&pending).timer.take() {
                    timer.abort();
                }
                outlet.detach();
            }))
        })
    }

    /// Emit the first value of each `interval` window and drop the rest.
    ///
    /// Uses tokio's clock but needs no runtime.
    pub fn throttle_first(self, interval: Duration) -> Stream<T> {
        let mut window_start: Option<Instant> = None;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    let now = Instant::now();
                    let open = window_start.is_none_or(|start| now.duration_since(start) >= interval);
                    if open {
                        window_start = Some(now);
                        down.send(v);
                    }
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Fail with [`Error::Timeout`] if the stream goes quiet.
    ///
    /// With `reset_on_value`, the deadline restarts on every value, so the
    /// stream fails once `interval` passes without one. Without it, the
    /// deadline is fixed at activation and the stream must end within
    /// `interval`. The upstream is released when the timeout fires.
    pub fn timeout(self, interval: Duration, reset_on_value: bool, ctx: &Context) -> Stream<T> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter| {
            let Some(handle) = timer_or_fail(&ctx, &mut emitter) else {
                return Subscription::empty();
            };
            let outlet = Outlet::new(emitter);
            let upstream_slot: Arc<Mutex<Option<Subscription>>> = Arc::new(Mutex::new(None));
            let timer: Arc<Mutex<Option<AbortHandle>>> = Arc::new(Mutex::new(None));

            let arm = {
                let outlet = Arc::downgrade(&outlet);
                let upstream_slot = Arc::downgrade(&upstream_slot);
                let handle = handle.clone();
                move || {
                    let outlet = outlet.clone();
                    let upstream_slot = upstream_slot.clone();
                    handle
                        .spawn(async move {
                            tokio::time::sleep(interval).await;
                            let Some(outlet) = outlet.upgrade() else {
                                return;
                            };
                            if outlet.fail(Error::Timeout(interval)) {
                                tracing::debug!(?interval, "stream timed out");
                            }
                            if let Some(slot) = upstream_slot.upgrade() {
                                let upstream = lock(&slot).take();
                                drop(upstream);
                            }
                        })
                        .abort_handle()
                }
            };
            *lock(&timer) = Some(arm());

            let upstream_outlet = outlet.clone();
            let upstream_timer = timer.clone();
            let upstream = self.activate(Emitter::new(move |event: Event<T>| {
                let ended = event.is_end();
                if ended || reset_on_value {
                    let mut timer = lock(&upstream_timer);
                    if let Some(previous) = timer.take() {
                        previous.abort();
                    }
                    if !ended {
                        *timer = Some(arm());
                    }
                }
                upstream_outlet.emit(event);
            }));
            if !outlet.is_closed() {
                *lock(&upstream_slot) = Some(upstream);
            }

            Subscription::new(move || {
                if let Some(timer) = lock(&timer).take() {
                    timer.abort();
                }
                outlet.detach();
                let upstream = lock(&upstream_slot).take();
                drop(upstream);
            })
        })
    }

    /// Shift every value and normal end later by `interval`.
    ///
    /// A failure is delivered immediately and drops values still in flight.
    pub fn delay(self, interval: Duration, ctx: &Context) -> Stream<T> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter| {
            let Some(handle) = timer_or_fail(&ctx, &mut emitter) else {
                return Subscription::empty();
            };
            let outlet = Outlet::new(emitter);
            let (tx, mut rx) = mpsc::unbounded_channel::<(Instant, Event<T>)>();

            let task_outlet = outlet.clone();
            let task = handle.spawn(async move {
                while let Some((deadline, event)) = rx.recv().await {
                    tokio::time::sleep_until(deadline).await;
                    let terminal = event.is_end();
                    task_outlet.emit(event);
                    if terminal {
                        break;
                    }
                }
            });
            let abort = task.abort_handle();

            let upstream_outlet = outlet.clone();
            let upstream = self.activate(Emitter::new(move |event: Event<T>| match event {
                Event::End(StreamEnd::Failed(err)) => {
                    abort.abort();
                    upstream_outlet.fail(err);
                }
                event => {
                    let _ = tx.send((Instant::now() + interval, event));
                }
            }));

            upstream.merge(Subscription::new(move || {
                task.abort();
                outlet.detach();
            }))
        })
    }
}

impl Stream<u64> {
    /// Emit `0, 1, 2, ...`, one value every `period`, starting one period
    /// after activation.
    pub fn interval(period: Duration, ctx: &Context) -> Stream<u64> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter| {
            let Some(handle) = timer_or_fail(&ctx, &mut emitter) else {
                return Subscription::empty();
            };
            if let Err(err) = validate_interval(period) {
                emitter.fail(err);
                return Subscription::empty();
            }
            let outlet = Outlet::new(emitter);
            let task_outlet = outlet.clone();
            let task = handle.spawn(async move {
                let mut ticks = tokio::time::interval_at(Instant::now() + period, period);
                let mut count = 0u64;
                loop {
                    ticks.tick().await;
                    if !task_outlet.send(count) {
                        break;
                    }
                    count += 1;
                }
            });
            Subscription::new(move || {
                task.abort();
                outlet.detach();
            })
        })
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Emit `value` once after `delay`, then complete.
    pub fn timer(delay: Duration, value: T, ctx: &Context) -> Stream<T> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter| {
            let Some(handle) = timer_or_fail(&ctx, &mut emitter) else {
                return Subscription::empty();
            };
            let outlet = Outlet::new(emitter);
            let task_outlet = outlet.clone();
            let task = handle.spawn(async move {
                tokio::time::sleep(delay).await;
                task_outlet.push(Event::Value(value));
                task_outlet.push(Event::complete());
                task_outlet.drain();
            });
            Subscription::new(move || {
                task.abort();
                outlet.detach();
            })
        })
    }
}

/// Periodic timers need a non-zero period.
pub(crate) fn validate_interval(interval: Duration) -> Result<Duration> {
    if interval.is_zero() {
        return Err(Error::Construction("interval must be non-zero".into()));
    }
    Ok(interval)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{Producer, channel};
    use crate::stream::testing::Recorder;

    #[test]
    fn test_timed_operator_without_runtime_fails() {
        let rec = Recorder::attach(
            Stream::from_values(vec![1]).debounce(Duration::from_millis(5), true, &Context::Direct),
        );
        let end = rec.end().unwrap();
        assert!(matches!(end.error(), Some(Error::Construction(_))));
    }

    #[test]
    fn test_validate_interval() {
        assert!(validate_interval(Duration::ZERO).is_err());
        assert!(validate_interval(Duration::from_millis(1)).is_ok());
    }

    #[tokio::test(start_paused = true)]
    async fn test_debounce_drops_without_flush() {
        let (input, stream) = channel::<i32>();
        let rec = Recorder::attach(stream.debounce(
            Duration::from_millis(100),
            false,
            &Context::Direct,
        ));
        input.push(1).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        input.close().unwrap();
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rec.values().is_empty());
        assert!(rec.end().unwrap().is_complete());
    }

    #[tokio::test(start_paused = true)]
    async fn test_throttle_first() {
        let (input, stream) = channel::<i32>();
        let rec = Recorder::attach(stream.throttle_first(Duration::from_millis(100)));
        input.push(1).unwrap();
        input.push(2).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        input.push(3).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        input.push(4).unwrap();
        input.push(5).unwrap();
        assert_eq!(rec.values(), vec![1, 4]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_resets_on_value() {
        let (input, stream) = channel::<i32>();
        let rec = Recorder::attach(stream.timeout(
            Duration::from_millis(100),
            true,
            &Context::Direct,
        ));
        for v in 0..3 {
            tokio::time::sleep(Duration::from_millis(80)).await;
            input.push(v).unwrap();
        }
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(rec.values(), vec![0, 1, 2]);
        assert!(rec.end().unwrap().error().unwrap().is_timeout());
        // The upstream was released when the timeout fired.
        assert!(!input.is_active());
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_fixed_deadline() {
        let (input, stream) = channel::<i32>();
        let rec = Recorder::attach(stream.timeout(
            Duration::from_millis(100),
            false,
            &Context::Direct,
        ));
        tokio::time::sleep(Duration::from_millis(60)).await;
        input.push(1).unwrap();
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rec.values(), vec![1]);
        assert!(rec.end().unwrap().error().unwrap().is_timeout());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delay_shifts_values_but_not_failures() {
        let (input, stream) = channel::<i32>();
        let rec = Recorder::attach(stream.delay(Duration::from_millis(100), &Context::Direct));
        input.push(1).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rec.values().is_empty());
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(rec.values(), vec![1]);

        input.push(2).unwrap();
        input.fail(Error::failure("now")).unwrap();
        assert!(rec.end().unwrap().is_failure());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rec.values(), vec![1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_and_timer_sources() {
        let ticks = Recorder::attach(
            Stream::interval(Duration::from_millis(10), &Context::Direct).take(3),
        );
        let once = Recorder::attach(Stream::timer(
            Duration::from_millis(25),
            "done",
            &Context::Direct,
        ));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(ticks.values(), vec![0, 1, 2]);
        assert!(ticks.end().unwrap().is_complete());
        assert_eq!(once.values(), vec!["done"]);
        assert!(once.end().unwrap().is_complete());
    }
}
