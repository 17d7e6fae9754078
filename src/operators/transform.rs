//! Value transforms: one upstream, one downstream, delivery order kept.

use crate::context::Context;
use crate::error::Result;
use crate::event::{Event, StreamEnd};
use crate::stream::{Emitter, Stream, Subscription};

impl<T: Send + 'static> Stream<T> {
    /// Transform every value.
    pub fn map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        let mut f = f;
        self.lift(move |mut down: Emitter<U>| {
            Emitter::new(move |event: Event<T>| {
                down.emit(event.map(&mut f));
            })
        })
    }

    /// Transform every value; an `Err` ends the stream with that failure.
    pub fn try_map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Result<U> + Send + 'static,
    {
        let mut f = f;
        self.lift(move |mut down: Emitter<U>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    down.emit(f(v).into());
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Keep values matching `predicate`.
    pub fn filter<F>(self, predicate: F) -> Stream<T>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        let mut predicate = predicate;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) if !predicate(&v) => {}
                event => {
                    down.emit(event);
                }
            })
        })
    }

    /// Transform and filter in one step.
    pub fn filter_map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Option<U> + Send + 'static,
    {
        let mut f = f;
        self.lift(move |mut down: Emitter<U>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    if let Some(u) = f(v) {
                        down.send(u);
                    }
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Observe every value without changing the stream.
    pub fn inspect<F>(self, f: F) -> Stream<T>
    where
        F: FnMut(&T) + Send + 'static,
    {
        let mut f = f;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| {
                if let Event::Value(v) = &event {
                    f(v);
                }
                down.emit(event);
            })
        })
    }

    /// Emit each intermediate accumulator.
    pub fn scan<S, F>(self, initial: S, f: F) -> Stream<S>
    where
        S: Clone + Send + 'static,
        F: FnMut(&S, T) -> S + Send + 'static,
    {
        let mut f = f;
        let mut acc = initial;
        self.lift(move |mut down: Emitter<S>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    acc = f(&acc, v);
                    down.send(acc.clone());
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Emit the final accumulator when the stream completes.
    ///
    /// A failure or cancellation is forwarded without a value.
    pub fn reduce<S, F>(self, initial: S, f: F) -> Stream<S>
    where
        S: Send + 'static,
        F: FnMut(S, T) -> S + Send + 'static,
    {
        let mut f = f;
        let mut acc = Some(initial);
        self.lift(move |mut down: Emitter<S>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    acc = acc.take().map(|a| f(a, v));
                }
                Event::End(StreamEnd::Complete) => {
                    if let Some(a) = acc.take() {
                        down.send(a);
                    }
                    down.complete();
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Forward the first `count` values, then complete.
    pub fn take(self, count: usize) -> Stream<T> {
        if count == 0 {
            return Stream::from_fn(|mut emitter| {
                emitter.complete();
                Subscription::empty()
            });
        }
        let mut remaining = count;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    if remaining == 0 {
                        return;
                    }
                    remaining -= 1;
                    down.send(v);
                    if remaining == 0 {
                        down.complete();
                    }
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// Drop the first `count` values.
    pub fn skip(self, count: usize) -> Stream<T> {
        let mut remaining = count;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(_) if remaining > 0 => remaining -= 1,
                event => {
                    down.emit(event);
                }
            })
        })
    }

    /// Drop values equal to the previous one.
    pub fn distinct_until_changed(self) -> Stream<T>
    where
        T: PartialEq + Clone,
    {
        let mut last: Option<T> = None;
        self.lift(move |mut down: Emitter<T>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    if last.as_ref() != Some(&v) {
                        last = Some(v.clone());
                        down.send(v);
                    }
                }
                Event::End(end) => {
                    down.end(end);
                }
            })
        })
    }

    /// The general single-input operator.
    ///
    /// `f` runs in `ctx` for every event, including the end, and decides
    /// what to emit.
    ///
    /// ```rust
    /// use tributary::{Context, Stream};
    /// use tributary::event::Event;
    ///
    /// // Emit every value twice.
    /// let doubled = Stream::from_values(vec![1, 2]).transform(&Context::Direct, |event, out| {
    ///     match event {
    ///         Event::Value(v) => {
    ///             out.send(v);
    ///             out.send(v);
    ///         }
    ///         Event::End(end) => {
    ///             out.end(end);
    ///         }
    ///     }
    /// });
    /// # let _ = doubled;
    /// ```
    pub fn transform<U, F>(self, ctx: &Context, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(Event<T>, &mut Emitter<U>) + Send + 'static,
    {
        let ctx = ctx.clone();
        let mut f = f;
        self.lift(move |mut down: Emitter<U>| {
            Emitter::from_boxed(ctx.bind_handler(move |event| f(event, &mut down)))
        })
    }

    /// Like [`Stream::transform`] with a private state value.
    pub fn transform_with_state<S, U, F>(self, ctx: &Context, initial: S, f: F) -> Stream<U>
    where
        S: Send + 'static,
        U: Send + 'static,
        F: FnMut(&mut S, Event<T>, &mut Emitter<U>) + Send + 'static,
    {
        let mut state = initial;
        let mut f = f;
        self.transform(ctx, move |event, down| f(&mut state, event, down))
    }

    /// Deliver downstream events in `ctx`.
    pub fn deliver_on(self, ctx: &Context) -> Stream<T> {
        if ctx.is_direct() {
            return self;
        }
        let ctx = ctx.clone();
        self.lift(move |mut down: Emitter<T>| {
            Emitter::from_boxed(ctx.bind_handler(move |event| {
                down.emit(event);
            }))
        })
    }
}
