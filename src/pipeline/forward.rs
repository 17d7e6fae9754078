//! The operator catalog, forwarded onto pipelines.
//!
//! Each method applies the [`Stream`] operator of the same name to the tail
//! and keeps the producer. Terminal methods return the producer alongside
//! the artifact.

use std::time::Duration;

use super::Pipeline;
use crate::channel::{BindTarget, Producer};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::stream::{
    Capture, Emitter, EventStream, Junction, MultiStream, Snapshot, Stream, Subscription,
};

// ============================================================================
// Transforms
// ============================================================================

impl<P: Producer, T: Send + 'static> Pipeline<P, Stream<T>> {
    /// See [`Stream::map`].
    pub fn map<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> U + Send + 'static,
    {
        self.next(|s| s.map(f))
    }

    /// See [`Stream::try_map`].
    pub fn try_map<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> Result<U> + Send + 'static,
    {
        self.next(|s| s.try_map(f))
    }

    /// See [`Stream::filter`].
    pub fn filter<F>(self, predicate: F) -> Pipeline<P, Stream<T>>
    where
        F: FnMut(&T) -> bool + Send + 'static,
    {
        self.next(|s| s.filter(predicate))
    }

    /// See [`Stream::filter_map`].
    pub fn filter_map<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> Option<U> + Send + 'static,
    {
        self.next(|s| s.filter_map(f))
    }

    /// See [`Stream::inspect`].
    pub fn inspect<F>(self, f: F) -> Pipeline<P, Stream<T>>
    where
        F: FnMut(&T) + Send + 'static,
    {
        self.next(|s| s.inspect(f))
    }

    /// See [`Stream::scan`].
    pub fn scan<S, F>(self, initial: S, f: F) -> Pipeline<P, Stream<S>>
    where
        S: Clone + Send + 'static,
        F: FnMut(&S, T) -> S + Send + 'static,
    {
        self.next(|s| s.scan(initial, f))
    }

    /// See [`Stream::reduce`].
    pub fn reduce<S, F>(self, initial: S, f: F) -> Pipeline<P, Stream<S>>
    where
        S: Send + 'static,
        F: FnMut(S, T) -> S + Send + 'static,
    {
        self.next(|s| s.reduce(initial, f))
    }

    /// See [`Stream::take`].
    pub fn take(self, count: usize) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.take(count))
    }

    /// See [`Stream::skip`].
    pub fn skip(self, count: usize) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.skip(count))
    }

    /// See [`Stream::distinct_until_changed`].
    pub fn distinct_until_changed(self) -> Pipeline<P, Stream<T>>
    where
        T: PartialEq + Clone,
    {
        self.next(Stream::distinct_until_changed)
    }

    /// See [`Stream::transform`].
    pub fn transform<U, F>(self, ctx: &Context, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(Event<T>, &mut Emitter<U>) + Send + 'static,
    {
        self.next(|s| s.transform(ctx, f))
    }

    /// See [`Stream::transform_with_state`].
    pub fn transform_with_state<S, U, F>(
        self,
        ctx: &Context,
        initial: S,
        f: F,
    ) -> Pipeline<P, Stream<U>>
    where
        S: Send + 'static,
        U: Send + 'static,
        F: FnMut(&mut S, Event<T>, &mut Emitter<U>) + Send + 'static,
    {
        self.next(|s| s.transform_with_state(ctx, initial, f))
    }

    /// See [`Stream::deliver_on`].
    pub fn deliver_on(self, ctx: &Context) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.deliver_on(ctx))
    }
}

// ============================================================================
// Batching and timing
// ============================================================================

impl<P: Producer, T: Send + 'static> Pipeline<P, Stream<T>> {
    /// See [`Stream::buffer`].
    pub fn buffer(self, count: usize, skip: usize) -> Pipeline<P, Stream<Vec<T>>>
    where
        T: Clone,
    {
        self.next(|s| s.buffer(count, skip))
    }

    /// See [`Stream::buffer_count`].
    pub fn buffer_count(self, count: usize) -> Pipeline<P, Stream<Vec<T>>>
    where
        T: Clone,
    {
        self.next(|s| s.buffer_count(count))
    }

    /// See [`Stream::buffer_interval`].
    pub fn buffer_interval(self, interval: Duration, ctx: &Context) -> Pipeline<P, Stream<Vec<T>>> {
        self.next(|s| s.buffer_interval(interval, ctx))
    }

    /// See [`Stream::buffer_boundary`].
    pub fn buffer_boundary<B>(self, boundary: Stream<B>) -> Pipeline<P, Stream<Vec<T>>>
    where
        B: Send + 'static,
    {
        self.next(|s| s.buffer_boundary(boundary))
    }

    /// See [`Stream::window`].
    pub fn window(self, count: usize, skip: usize) -> Pipeline<P, Stream<Stream<T>>>
    where
        T: Clone,
    {
        self.next(|s| s.window(count, skip))
    }

    /// See [`Stream::debounce`].
    pub fn debounce(
        self,
        interval: Duration,
        flush_on_close: bool,
        ctx: &Context,
    ) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.debounce(interval, flush_on_close, ctx))
    }

    /// See [`Stream::throttle_first`].
    pub fn throttle_first(self, interval: Duration) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.throttle_first(interval))
    }

    /// See [`Stream::timeout`].
    pub fn timeout(
        self,
        interval: Duration,
        reset_on_value: bool,
        ctx: &Context,
    ) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.timeout(interval, reset_on_value, ctx))
    }

    /// See [`Stream::delay`].
    pub fn delay(self, interval: Duration, ctx: &Context) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.delay(interval, ctx))
    }
}

// ============================================================================
// Combination, flattening, recovery
// ============================================================================

impl<P: Producer, T: Send + 'static> Pipeline<P, Stream<T>> {
    /// See [`Stream::merge`].
    pub fn merge(self, other: Stream<T>) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.merge(other))
    }

    /// Merge the tail with every stream in `others`.
    pub fn merge_all<I>(self, others: I) -> Pipeline<P, Stream<T>>
    where
        I: IntoIterator<Item = Stream<T>>,
    {
        self.next(|s| Stream::merge_all(std::iter::once(s).chain(others)))
    }

    /// See [`Stream::combine_latest`].
    pub fn combine_latest<U, R, F>(self, other: Stream<U>, f: F) -> Pipeline<P, Stream<R>>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: FnMut(&T, &U) -> R + Send + 'static,
    {
        self.next(|s| s.combine_latest(other, f))
    }

    /// Combine the tail with `others`, the tail's value first.
    pub fn combine_latest_all<I>(self, others: I) -> Pipeline<P, Stream<Vec<T>>>
    where
        I: IntoIterator<Item = Stream<T>>,
        T: Clone,
    {
        self.next(|s| Stream::combine_latest_all(std::iter::once(s).chain(others)))
    }

    /// See [`Stream::zip`].
    pub fn zip<U>(self, other: Stream<U>) -> Pipeline<P, Stream<(T, U)>>
    where
        U: Send + 'static,
    {
        self.next(|s| s.zip(other))
    }

    /// See [`Stream::sample_combine`].
    pub fn sample_combine<U>(self, trigger: Stream<U>) -> Pipeline<P, Stream<(T, U)>>
    where
        T: Clone,
        U: Send + 'static,
    {
        self.next(|s| s.sample_combine(trigger))
    }

    /// See [`Stream::latest_combine`].
    pub fn latest_combine<U>(self, sample: Stream<U>) -> Pipeline<P, Stream<(T, U)>>
    where
        U: Clone + Send + 'static,
    {
        self.next(|s| s.latest_combine(sample))
    }

    /// See [`Stream::intersect`].
    pub fn intersect<U, R, DL, DR, F>(
        self,
        other: Stream<U>,
        left_duration: DL,
        right_duration: DR,
        f: F,
    ) -> Pipeline<P, Stream<R>>
    where
        T: Clone,
        U: Clone + Send + 'static,
        R: Send + 'static,
        DL: FnMut(&T) -> Stream<()> + Send + 'static,
        DR: FnMut(&U) -> Stream<()> + Send + 'static,
        F: FnMut(&T, &U) -> R + Send + 'static,
    {
        self.next(|s| s.intersect(other, left_duration, right_duration, f))
    }

    /// See [`Stream::flat_map`].
    pub fn flat_map<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.next(|s| s.flat_map(f))
    }

    /// See [`Stream::flat_map_latest`].
    pub fn flat_map_latest<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.next(|s| s.flat_map_latest(f))
    }

    /// See [`Stream::flat_map_first`].
    pub fn flat_map_first<U, F>(self, f: F) -> Pipeline<P, Stream<U>>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.next(|s| s.flat_map_first(f))
    }

    /// See [`Stream::catch_error`].
    pub fn catch_error<F>(self, f: F) -> Pipeline<P, Stream<T>>
    where
        F: FnOnce(Error) -> Stream<T> + Send + 'static,
    {
        self.next(|s| s.catch_error(f))
    }

    /// See [`Stream::map_errors`].
    pub fn map_errors<F>(self, f: F) -> Pipeline<P, Stream<T>>
    where
        F: FnMut(Error) -> Error + Send + 'static,
    {
        self.next(|s| s.map_errors(f))
    }
}

// ============================================================================
// Replay
// ============================================================================

impl<P: Producer, T: Clone + Send + 'static> Pipeline<P, Stream<T>> {
    /// See [`Stream::multicast`].
    pub fn multicast(self) -> Pipeline<P, MultiStream<T>> {
        self.next(Stream::multicast)
    }

    /// See [`Stream::continuous`].
    pub fn continuous(self) -> Pipeline<P, MultiStream<T>> {
        self.next(Stream::continuous)
    }

    /// See [`Stream::continuous_with`].
    pub fn continuous_with(self, initial: T) -> Pipeline<P, MultiStream<T>> {
        self.next(|s| s.continuous_with(initial))
    }

    /// See [`Stream::playback`].
    pub fn playback(self) -> Pipeline<P, MultiStream<T>> {
        self.next(Stream::playback)
    }

    /// See [`Stream::cache_until_active`].
    pub fn cache_until_active(self) -> Pipeline<P, MultiStream<T>> {
        self.next(Stream::cache_until_active)
    }

    /// See [`Stream::custom_activation`].
    pub fn custom_activation<F>(self, initial: Snapshot<T>, fold: F) -> Pipeline<P, MultiStream<T>>
    where
        F: FnMut(&mut Snapshot<T>, &Event<T>) + Send + 'static,
    {
        self.next(|s| s.custom_activation(initial, fold))
    }
}

impl<P: Producer, T: Clone + Send + 'static> Pipeline<P, MultiStream<T>> {
    /// Continue the chain from a single-pass view of the shared tail.
    pub fn stream(self) -> Pipeline<P, Stream<T>> {
        self.next(|s| s.stream())
    }

    /// Subscribe to the shared tail. The pipeline stays usable.
    pub fn subscribe<H>(&self, ctx: &Context, handler: H) -> Subscription
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        self.stage().subscribe(ctx, handler)
    }
}

// ============================================================================
// Terminals
// ============================================================================

impl<P: Producer, T: Send + 'static> Pipeline<P, Stream<T>> {
    /// See [`Stream::subscribe`].
    pub fn subscribe<H>(self, ctx: &Context, handler: H) -> (P, Subscription)
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        self.finish(|s| s.subscribe(ctx, handler))
    }

    /// See [`Stream::subscribe_values`].
    pub fn subscribe_values<H>(self, ctx: &Context, handler: H) -> (P, Subscription)
    where
        H: FnMut(T) + Send + 'static,
    {
        self.finish(|s| s.subscribe_values(ctx, handler))
    }

    /// See [`Stream::subscribe_while`].
    pub fn subscribe_while<H>(self, ctx: &Context, handler: H) -> (P, Subscription)
    where
        H: FnMut(Event<T>) -> bool + Send + 'static,
    {
        self.finish(|s| s.subscribe_while(ctx, handler))
    }

    /// See [`Stream::subscribe_until_end`].
    pub fn subscribe_until_end<H>(self, ctx: &Context, handler: H) -> P
    where
        H: FnMut(Event<T>) + Send + 'static,
    {
        self.consume(|s| s.subscribe_until_end(ctx, handler))
    }

    /// See [`Stream::bind_to`].
    pub fn bind_to<B>(self, target: &B) -> (P, Subscription)
    where
        B: BindTarget<T> + ?Sized,
    {
        self.finish(|s| s.bind_to(target))
    }

    /// See [`Stream::junction`].
    pub fn junction(self) -> (P, Junction<T>) {
        self.finish(Stream::junction)
    }

    /// See [`Stream::capture`].
    pub fn capture(self) -> (P, Capture<T>) {
        self.finish(Stream::capture)
    }

    /// See [`Stream::into_events`].
    pub fn into_events(self) -> (P, EventStream<T>) {
        self.finish(Stream::into_events)
    }
}
