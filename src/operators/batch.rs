//! Batching: group values into vectors or sub-streams.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use super::Fanin;
use super::timing::validate_interval;
use crate::channel::{Input, Producer, channel};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::event::Event;
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

impl<T: Send + 'static> Stream<T> {
    /// Emit batches of `count` values, starting a new batch every `skip`
    /// values.
    ///
    /// `skip == count` partitions the stream, `skip < count` overlaps
    /// batches and `skip > count` drops the values in between. A batch that
    /// is still short when the stream ends is discarded.
    ///
    /// ```rust
    /// use tributary::{Context, Stream};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    /// let _sub = Stream::from_values(vec![1, 2, 3, 4])
    ///     .buffer(3, 1)
    ///     .subscribe_values(&Context::Direct, move |b| sink.lock().unwrap().push(b));
    /// assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2, 3], vec![2, 3, 4]]);
    /// ```
    ///
    /// A zero `count` or `skip` fails the stream with
    /// [`Error::Construction`] when it is activated.
    pub fn buffer(self, count: usize, skip: usize) -> Stream<Vec<T>>
    where
        T: Clone,
    {
        if let Err(err) = validate_sizes("buffer", count, skip) {
            return Stream::failed(err);
        }

        let mut open: VecDeque<Vec<T>> = VecDeque::new();
        let mut index = 0usize;
        self.lift(move |mut down: Emitter<Vec<T>>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    if index % skip == 0 {
                        open.push_back(Vec::with_capacity(count));
                    }
                    index = index.wrapping_add(1);
                    for batch in open.iter_mut() {
                        batch.push(v.clone());
                    }
                    while open.front().is_some_and(|b| b.len() >= count) {
                        if let Some(batch) = open.pop_front() {
                            down.send(batch);
                        }
                    }
                }
                Event::End(end) => {
                    open.clear();
                    down.end(end);
                }
            })
        })
    }

    /// Partition into batches of `count` values.
    pub fn buffer_count(self, count: usize) -> Stream<Vec<T>>
    where
        T: Clone,
    {
        self.buffer(count, count)
    }

    /// Emit whatever arrived during each `interval`, empty batches
    /// included. Remaining values are emitted before the end.
    pub fn buffer_interval(self, interval: Duration, ctx: &Context) -> Stream<Vec<T>> {
        let ctx = ctx.clone();
        Stream::from_fn(move |mut emitter: Emitter<Vec<T>>| {
            let handle = match ctx.timer_handle() {
                Ok(handle) => handle,
                Err(err) => {
                    emitter.fail(err);
                    return Subscription::empty();
                }
            };
            if let Err(err) = validate_interval(interval) {
                emitter.fail(err);
                return Subscription::empty();
            }
            let outlet = Outlet::new(emitter);
            let batch: Arc<Mutex<Vec<T>>> = Arc::new(Mutex::new(Vec::new()));

            let tick_outlet = outlet.clone();
            let tick_batch = batch.clone();
            let task = handle.spawn(async move {
                let start = tokio::time::Instant::now() + interval;
                let mut ticks = tokio::time::interval_at(start, interval);
                loop {
                    ticks.tick().await;
                    let accepted = {
                        let mut batch = lock(&tick_batch);
                        tick_outlet.push(Event::Value(std::mem::take(&mut *batch)))
                    };
                    if !accepted {
                        break;
                    }
                    tick_outlet.drain();
                }
            });

            let upstream_outlet = outlet.clone();
            let upstream = self.activate(Emitter::new(move |event: Event<T>| {
                match event {
                    Event::Value(v) => lock(&batch).push(v),
                    Event::End(end) => {
                        {
                            let mut batch = lock(&batch);
                            if !batch.is_empty() {
                                upstream_outlet.push(Event::Value(std::mem::take(&mut *batch)));
                            }
                            upstream_outlet.push(Event::End(end));
                        }
                        upstream_outlet.drain();
                    }
                }
            }));

            upstream.merge(Subscription::new(move || {
                task.abort();
                outlet.detach();
            }))
        })
    }

    /// Emit the values collected since the previous boundary each time
    /// `boundary` delivers a value.
    ///
    /// Completion of `boundary` is ignored; its failure ends the output.
    pub fn buffer_boundary<B>(self, boundary: Stream<B>) -> Stream<Vec<T>>
    where
        B: Send + 'static,
    {
        Stream::from_fn(move |emitter| {
            let fanin = Fanin::new(emitter, Vec::<T>::new());
            fanin.connect(self, |fanin, event| {
                fanin.update(|batch, outlet| match event {
                    Event::Value(v) => batch.push(v),
                    Event::End(end) => {
                        if !batch.is_empty() {
                            outlet.push(Event::Value(std::mem::take(batch)));
                        }
                        outlet.push(Event::End(end));
                    }
                });
            });
            fanin.connect(boundary, |fanin, event: Event<B>| {
                fanin.update(|batch, outlet| match event {
                    Event::Value(_) => {
                        outlet.push(Event::Value(std::mem::take(batch)));
                    }
                    Event::End(end) if end.is_failure() => {
                        outlet.push(Event::End(end));
                    }
                    Event::End(_) => {}
                });
            });
            fanin.subscription()
        })
    }

    /// Split into sub-streams of `count` values, opening one every `skip`
    /// values.
    ///
    /// Each window caches its values until it is subscribed, so windows can
    /// be consumed after they were emitted. Open windows end with the
    /// source. A zero `count` or `skip` fails the stream with
    /// [`Error::Construction`].
    pub fn window(self, count: usize, skip: usize) -> Stream<Stream<T>>
    where
        T: Clone,
    {
        if let Err(err) = validate_sizes("window", count, skip) {
            return Stream::failed(err);
        }

        let mut open: VecDeque<(Input<T>, usize)> = VecDeque::new();
        let mut index = 0usize;
        self.lift(move |mut down: Emitter<Stream<T>>| {
            Emitter::new(move |event: Event<T>| match event {
                Event::Value(v) => {
                    if index % skip == 0 {
                        let (input, stream) = channel::<T>();
                        let window = stream.cache_until_active();
                        open.push_back((input, 0));
                        down.send(window.stream());
                    }
                    index = index.wrapping_add(1);
                    for (input, filled) in open.iter_mut() {
                        let _ = input.push(v.clone());
                        *filled += 1;
                    }
                    while open.front().is_some_and(|(_, filled)| *filled >= count) {
                        if let Some((input, _)) = open.pop_front() {
                            let _ = input.close();
                        }
                    }
                }
                Event::End(end) => {
                    for (input, _) in open.drain(..) {
                        let _ = input.end(end.clone());
                    }
                    down.end(end);
                }
            })
        })
    }
}

fn validate_sizes(operator: &str, count: usize, skip: usize) -> Result<()> {
    if count == 0 || skip == 0 {
        return Err(Error::Construction(format!(
            "{operator} needs a positive count and skip, got {count} and {skip}"
        )));
    }
    Ok(())
}
