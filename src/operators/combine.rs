//! Operators with several upstreams.
//!
//! A failure from any upstream ends the output immediately and releases
//! every other upstream.

use std::collections::{BTreeMap, VecDeque};
use std::sync::{Arc, Weak};

use super::Fanin;
use crate::event::{Event, StreamEnd};
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};

/// Tracks how many upstreams are still running.
struct Completion {
    remaining: usize,
    cancelled: bool,
}

impl Completion {
    fn new(sources: usize) -> Self {
        Self {
            remaining: sources,
            cancelled: false,
        }
    }

    /// Record a non-failure end; returns the aggregate end once every
    /// source has ended.
    fn finish(&mut self, end: &StreamEnd) -> Option<StreamEnd> {
        self.cancelled |= end.is_cancelled();
        self.remaining = self.remaining.saturating_sub(1);
        if self.remaining > 0 {
            return None;
        }
        Some(if self.cancelled {
            StreamEnd::Cancelled
        } else {
            StreamEnd::Complete
        })
    }
}

impl<T: Send + 'static> Stream<T> {
    /// Interleave values from both streams.
    ///
    /// Ends once both have ended.
    pub fn merge(self, other: Stream<T>) -> Stream<T> {
        Stream::merge_all([self, other])
    }

    /// Interleave values from every stream.
    pub fn merge_all<I>(streams: I) -> Stream<T>
    where
        I: IntoIterator<Item = Stream<T>>,
    {
        let streams: Vec<Stream<T>> = streams.into_iter().collect();
        Stream::from_fn(move |mut emitter| {
            if streams.is_empty() {
                emitter.complete();
                return Subscription::empty();
            }
            let fanin = Fanin::new(emitter, Completion::new(streams.len()));
            for stream in streams {
                fanin.connect(stream, |fanin, event| {
                    fanin.update(|completion, outlet| match event {
                        Event::End(end) if !end.is_failure() => {
                            if let Some(end) = completion.finish(&end) {
                                outlet.push(Event::End(end));
                            }
                        }
                        event => {
                            outlet.push(event);
                        }
                    });
                });
            }
            fanin.subscription()
        })
    }

    /// Combine the latest value of both streams whenever either updates.
    ///
    /// Silent until both have produced a value. Completes when both have
    /// completed, or as soon as one completes without ever producing a
    /// value.
    ///
    /// ```rust
    /// use tributary::{Context, Stream};
    /// use tributary::channel::{Producer, channel};
    /// use std::sync::{Arc, Mutex};
    ///
    /// let (a, a_out) = channel::<i32>();
    /// let (b, b_out) = channel::<i32>();
    /// let seen = Arc::new(Mutex::new(Vec::new()));
    /// let sink = seen.clone();
    /// let _sub = a_out
    ///     .combine_latest(b_out, |x, y| x + y)
    ///     .subscribe_values(&Context::Direct, move |v| sink.lock().unwrap().push(v));
    ///
    /// a.push(1).unwrap();
    /// b.push(2).unwrap();
    /// a.push(3).unwrap();
    /// assert_eq!(*seen.lock().unwrap(), vec![3, 5]);
    /// ```
    pub fn combine_latest<U, R, F>(self, other: Stream<U>, f: F) -> Stream<R>
    where
        U: Send + 'static,
        R: Send + 'static,
        F: FnMut(&T, &U) -> R + Send + 'static,
    {
        struct State<T, U, F> {
            left: Option<T>,
            right: Option<U>,
            completion: Completion,
            f: F,
        }

        impl<T, U, F> State<T, U, F> {
            fn end<R>(&mut self, end: StreamEnd, has_value: bool, outlet: &Outlet<R>) {
                if end.is_failure() || !has_value {
                    outlet.push(Event::End(end));
                } else if let Some(end) = self.completion.finish(&end) {
                    outlet.push(Event::End(end));
                }
            }
        }

        Stream::from_fn(move |emitter| {
            let fanin = Fanin::new(
                emitter,
                State {
                    left: None,
                    right: None,
                    completion: Completion::new(2),
                    f,
                },
            );
            fanin.connect(self, |fanin, event| {
                fanin.update(|state, outlet| match event {
                    Event::Value(v) => {
                        if let Some(right) = &state.right {
                            outlet.push(Event::Value((state.f)(&v, right)));
                        }
                        state.left = Some(v);
                    }
                    Event::End(end) => {
                        let has_value = state.left.is_some();
                        state.end(end, has_value, outlet);
                    }
                });
            });
            fanin.connect(other, |fanin, event| {
                fanin.update(|state, outlet| match event {
                    Event::Value(v) => {
                        if let Some(left) = &state.left {
                            outlet.push(Event::Value((state.f)(left, &v)));
                        }
                        state.right = Some(v);
                    }
                    Event::End(end) => {
                        let has_value = state.right.is_some();
                        state.end(end, has_value, outlet);
                    }
                });
            });
            fanin.subscription()
        })
    }

    /// Combine the latest value of every stream into a vector.
    pub fn combine_latest_all<I>(streams: I) -> Stream<Vec<T>>
    where
        I: IntoIterator<Item = Stream<T>>,
        T: Clone,
    {
        struct State<T> {
            latest: Vec<Option<T>>,
            completion: Completion,
        }

        let streams: Vec<Stream<T>> = streams.into_iter().collect();
        Stream::from_fn(move |mut emitter| {
            if streams.is_empty() {
                emitter.complete();
                return Subscription::empty();
            }
            let fanin = Fanin::new(
                emitter,
                State {
                    latest: vec![None; streams.len()],
                    completion: Completion::new(streams.len()),
                },
            );
            for (index, stream) in streams.into_iter().enumerate() {
                fanin.connect(stream, move |fanin, event| {
                    fanin.update(|state, outlet| match event {
                        Event::Value(v) => {
                            state.latest[index] = Some(v);
                            let all: Option<Vec<T>> = state.latest.iter().cloned().collect();
                            if let Some(all) = all {
                                outlet.push(Event::Value(all));
                            }
                        }
                        Event::End(end) => {
                            if end.is_failure() || state.latest[index].is_none() {
                                outlet.push(Event::End(end));
                            } else if let Some(end) = state.completion.finish(&end) {
                                outlet.push(Event::End(end));
                            }
                        }
                    });
                });
            }
            fanin.subscription()
        })
    }

    /// Pair values positionally: the Nth value of each stream together.
    ///
    /// Ends once either stream has ended and every value it produced has
    /// been paired.
    pub fn zip<U>(self, other: Stream<U>) -> Stream<(T, U)>
    where
        U: Send + 'static,
    {
        struct State<T, U> {
            left: VecDeque<T>,
            right: VecDeque<U>,
            left_end: Option<StreamEnd>,
            right_end: Option<StreamEnd>,
        }

        impl<T, U> State<T, U> {
            fn pair(&mut self, outlet: &Outlet<(T, U)>) {
                while !self.left.is_empty() && !self.right.is_empty() {
                    if let (Some(l), Some(r)) = (self.left.pop_front(), self.right.pop_front()) {
                        outlet.push(Event::Value((l, r)));
                    }
                }
                let drained = match (&self.left_end, &self.right_end) {
                    (Some(end), _) if self.left.is_empty() => Some(end.clone()),
                    (_, Some(end)) if self.right.is_empty() => Some(end.clone()),
                    _ => None,
                };
                if let Some(end) = drained {
                    outlet.push(Event::End(end));
                }
            }
        }

        Stream::from_fn(move |emitter| {
            let fanin = Fanin::new(
                emitter,
                State {
                    left: VecDeque::new(),
                    right: VecDeque::new(),
                    left_end: None,
                    right_end: None,
                },
            );
            fanin.connect(self, |fanin, event| {
                fanin.update(|state, outlet| match event {
                    Event::Value(v) => {
                        state.left.push_back(v);
                        state.pair(outlet);
                    }
                    Event::End(end) if end.is_failure() => {
                        outlet.push(Event::End(end));
                    }
                    Event::End(end) => {
                        state.left_end = Some(end);
                        state.pair(outlet);
                    }
                });
            });
            fanin.connect(other, |fanin, event| {
                fanin.update(|state, outlet| match event {
                    Event::Value(v) => {
                        state.right.push_back(v);
                        state.pair(outlet);
                    }
                    Event::End(end) if end.is_failure() => {
                        outlet.push(Event::End(end));
                    }
                    Event::End(end) => {
                        state.right_end = Some(end);
                        state.pair(outlet);
                    }
                });
            });
            fanin.subscription()
        })
    }

    /// Emit `(latest self value, trigger value)` whenever `trigger`
    /// delivers, once `self` has produced a value.
    ///
    /// The output ends with `trigger`. Completion of `self` keeps its last
    /// value available.
    pub fn sample_combine<U>(self, trigger: Stream<U>) -> Stream<(T, U)>
    where
        T: Clone,
        U: Send + 'static,
    {
        triggered(trigger, self).map(|(u, t)| (t, u))
    }

    /// Emit `(self value, latest sample value)` whenever `self` delivers,
    /// once `sample` has produced a value.
    ///
    /// The output ends with `self`.
    pub fn latest_combine<U>(self, sample: Stream<U>) -> Stream<(T, U)>
    where
        U: Clone + Send + 'static,
    {
        triggered(self, sample)
    }

    /// Join values that overlap in time.
    ///
    /// Each value stays open until the duration stream selected for it
    /// delivers anything. A new value on one side is combined with every
    /// open value on the other side. Completes once both sides have
    /// completed.
    pub fn intersect<U, R, DL, DR, F>(
        self,
        other: Stream<U>,
        left_duration: DL,
        right_duration: DR,
        f: F,
    ) -> Stream<R>
    where
        T: Clone,
        U: Clone + Send + 'static,
        R: Send + 'static,
        DL: FnMut(&T) -> Stream<()> + Send + 'static,
        DR: FnMut(&U) -> Stream<()> + Send + 'static,
        F: FnMut(&T, &U) -> R + Send + 'static,
    {
        Stream::from_fn(move |emitter| {
            let fanin = Fanin::new(
                emitter,
                JoinState {
                    left: BTreeMap::new(),
                    right: BTreeMap::new(),
                    durations: BTreeMap::new(),
                    next_id: 0,
                    completion: Completion::new(2),
                    f,
                },
            );

            let mut left_duration = left_duration;
            fanin.connect(self, move |fanin, event| match event {
                Event::Value(v) => {
                    let duration = left_duration(&v);
                    let id = fanin.update(|state, outlet| {
                        for r in state.right.values() {
                            outlet.push(Event::Value((state.f)(&v, r)));
                        }
                        let id = state.next_id;
                        state.next_id += 1;
                        state.left.insert(id, v);
                        id
                    });
                    open_window(fanin, id, duration);
                }
                Event::End(end) => {
                    let released = fanin.update(|state, outlet| state.end(end, outlet));
                    drop(released);
                }
            });

            let mut right_duration = right_duration;
            fanin.connect(other, move |fanin, event| match event {
                Event::Value(v) => {
                    let duration = right_duration(&v);
                    let id = fanin.update(|state, outlet| {
                        for l in state.left.values() {
                            outlet.push(Event::Value((state.f)(l, &v)));
                        }
                        let id = state.next_id;
                        state.next_id += 1;
                        state.right.insert(id, v);
                        id
                    });
                    open_window(fanin, id, duration);
                }
                Event::End(end) => {
                    let released = fanin.update(|state, outlet| state.end(end, outlet));
                    drop(released);
                }
            });

            fanin.subscription()
        })
    }
}

// ============================================================================
// Helpers
// ============================================================================

/// `(trigger value, latest sample)` on every trigger value.
fn triggered<A, B>(trigger: Stream<A>, sample: Stream<B>) -> Stream<(A, B)>
where
    A: Send + 'static,
    B: Clone + Send + 'static,
{
    Stream::from_fn(move |emitter| {
        let fanin = Fanin::new(emitter, None::<B>);
        fanin.connect(sample, |fanin, event| {
            fanin.update(|latest, outlet| match event {
                Event::Value(v) => *latest = Some(v),
                Event::End(end) if end.is_failure() => {
                    outlet.push(Event::End(end));
                }
                Event::End(_) => {}
            });
        });
        fanin.connect(trigger, |fanin, event| {
            fanin.update(|latest, outlet| match event {
                Event::Value(v) => {
                    if let Some(sample) = latest.clone() {
                        outlet.push(Event::Value((v, sample)));
                    }
                }
                Event::End(end) => {
                    outlet.push(Event::End(end));
                }
            });
        });
        fanin.subscription()
    })
}

struct JoinState<T, U, F> {
    left: BTreeMap<u64, T>,
    right: BTreeMap<u64, U>,
    durations: BTreeMap<u64, Subscription>,
    next_id: u64,
    completion: Completion,
    f: F,
}

impl<T, U, F> JoinState<T, U, F> {
    /// Record a side's end. Once the output ends, every open window is
    /// handed back so its duration stream can be released.
    fn end<R>(&mut self, end: StreamEnd, outlet: &Outlet<R>) -> Vec<Subscription> {
        let output = if end.is_failure() {
            Some(end)
        } else {
            self.completion.finish(&end)
        };
        let Some(end) = output else {
            return Vec::new();
        };
        outlet.push(Event::End(end));
        self.left.clear();
        self.right.clear();
        std::mem::take(&mut self.durations).into_values().collect()
    }

    fn close(&mut self, id: u64) -> Option<Subscription> {
        self.left.remove(&id);
        self.right.remove(&id);
        self.durations.remove(&id)
    }
}

/// Keep value `id` open until `duration` delivers anything.
fn open_window<T, U, F, R>(fanin: &Arc<Fanin<R, JoinState<T, U, F>>>, id: u64, duration: Stream<()>)
where
    T: Send + 'static,
    U: Send + 'static,
    F: Send + 'static,
    R: Send + 'static,
{
    let weak: Weak<Fanin<R, JoinState<T, U, F>>> = Arc::downgrade(fanin);
    let subscription = duration.activate(Emitter::new(move |_event: Event<()>| {
        if let Some(fanin) = weak.upgrade() {
            let closed = fanin.update(|state, _| state.close(id));
            drop(closed);
        }
    }));
    let closed_early = fanin.update(|state, _| {
        if state.left.contains_key(&id) || state.right.contains_key(&id) {
            state.durations.insert(id, subscription);
            None
        } else {
            Some(subscription)
        }
    });
    drop(closed_early);
}
