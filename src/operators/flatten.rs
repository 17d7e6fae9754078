//! Flattening: map each value to an inner stream and merge the results.

use std::collections::HashMap;
use std::sync::Arc;

use super::Fanin;
use crate::event::{Event, StreamEnd};
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};

#[derive(Clone, Copy, PartialEq, Eq)]
enum Admission {
    /// Run every inner concurrently.
    All,
    /// Cancel the running inner when a new one arrives.
    Latest,
    /// Ignore new outer values while an inner runs.
    First,
}

struct FlattenState {
    outer_done: Option<StreamEnd>,
    /// `None` while the inner is still activating.
    inners: HashMap<u64, Option<Subscription>>,
    next_id: u64,
}

impl FlattenState {
    /// Forget every inner, returning the ones already activated.
    fn take_inners(&mut self) -> Vec<Subscription> {
        self.inners.drain().filter_map(|(_, sub)| sub).collect()
    }

    /// Emit the outer end once nothing is left running.
    fn settle<U>(&self, outlet: &Outlet<U>) {
        if !self.inners.is_empty() {
            return;
        }
        if let Some(end) = &self.outer_done {
            outlet.push(Event::End(end.clone()));
        }
    }
}

type FlattenCore<U> = Fanin<U, FlattenState>;

impl<T: Send + 'static> Stream<T> {
    /// Subscribe to the stream `f` returns for every value and merge them.
    ///
    /// Completes once the outer stream and every inner stream have ended.
    pub fn flat_map<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.flatten_with(Admission::All, f)
    }

    /// Like [`Stream::flat_map`], but a new value cancels the inner stream
    /// of the previous one before the new inner is subscribed.
    pub fn flat_map_latest<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.flatten_with(Admission::Latest, f)
    }

    /// Like [`Stream::flat_map`], but values arriving while an inner stream
    /// is running are dropped.
    pub fn flat_map_first<U, F>(self, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        self.flatten_with(Admission::First, f)
    }

    fn flatten_with<U, F>(self, admission: Admission, f: F) -> Stream<U>
    where
        U: Send + 'static,
        F: FnMut(T) -> Stream<U> + Send + 'static,
    {
        let mut f = f;
        Stream::from_fn(move |emitter| {
            let core = Fanin::new(
                emitter,
                FlattenState {
                    outer_done: None,
                    inners: HashMap::new(),
                    next_id: 0,
                },
            );
            core.connect(self, move |core, event| match event {
                Event::Value(v) => {
                    let admitted = core.update(|state, _| {
                        if admission == Admission::First && !state.inners.is_empty() {
                            return None;
                        }
                        let cancelled: Vec<Subscription> = if admission == Admission::Latest {
                            state.inners.drain().filter_map(|(_, sub)| sub).collect()
                        } else {
                            Vec::new()
                        };
                        let id = state.next_id;
                        state.next_id += 1;
                        state.inners.insert(id, None);
                        Some((id, cancelled))
                    });
                    if let Some((id, cancelled)) = admitted {
                        drop(cancelled);
                        let inner = f(v);
                        attach_inner(core, id, inner);
                    }
                }
                Event::End(end) => {
                    let orphaned = core.update(|state, outlet| {
                        if end.is_failure() {
                            outlet.push(Event::End(end));
                            state.take_inners()
                        } else {
                            state.outer_done = Some(end);
                            state.settle(outlet);
                            Vec::new()
                        }
                    });
                    drop(orphaned);
                }
            });
            core.subscription()
        })
    }
}

fn attach_inner<U: Send + 'static>(core: &Arc<FlattenCore<U>>, id: u64, inner: Stream<U>) {
    let weak = Arc::downgrade(core);
    let subscription = inner.activate(Emitter::new(move |event: Event<U>| {
        let Some(core) = weak.upgrade() else {
            return;
        };
        let finished = core.update(|state, outlet| {
            if !state.inners.contains_key(&id) {
                return Vec::new();
            }
            match event {
                Event::Value(v) => {
                    outlet.push(Event::Value(v));
                    Vec::new()
                }
                Event::End(end) if end.is_failure() => {
                    outlet.push(Event::End(end));
                    state.take_inners()
                }
                Event::End(_) => {
                    let removed = state.inners.remove(&id).flatten();
                    state.settle(outlet);
                    removed.into_iter().collect()
                }
            }
        });
        drop(finished);
    }));

    let stale = core.update(|state, _| match state.inners.get_mut(&id) {
        Some(slot) => {
            *slot = Some(subscription);
            None
        }
        None => Some(subscription),
    });
    drop(stale);
}

#[cfg(test)]
mod tests {
    use crate::channel::{Input, Producer, channel};
    use crate::error::Error;
    use crate::stream::Stream;
    use crate::stream::testing::Recorder;
    use std::sync::{Arc, Mutex};

    /// Inner channels handed out in creation order.
    fn inner_factory() -> (Arc<Mutex<Vec<Input<i32>>>>, impl FnMut(i32) -> Stream<i32> + Send) {
        let inputs = Arc::new(Mutex::new(Vec::new()));
        let store = inputs.clone();
        let factory = move |_: i32| {
            let (input, stream) = channel::<i32>();
            store.lock().unwrap().push(input);
            stream
        };
        (inputs, factory)
    }

    #[test]
    fn test_flat_map_merges_inners() {
        let rec = Recorder::attach(
            Stream::from_values(vec![1, 2, 3]).flat_map(|v| Stream::from_values(vec![v, v * 10])),
        );
        assert_eq!(rec.values(), vec![1, 10, 2, 20, 3, 30]);
        assert!(rec.end().unwrap().is_complete());
    }

    #[test]
    fn test_flat_map_waits_for_inners() {
        let (outer, outers) = channel::<i32>();
        let (inputs, factory) = inner_factory();
        let rec = Recorder::attach(outers.flat_map(factory));

        outer.push(1).unwrap();
        outer.push(2).unwrap();
        outer.close().unwrap();
        assert!(rec.end().is_none());

        let inputs = std::mem::take(&mut *inputs.lock().unwrap());
        inputs[1].push(20).unwrap();
        inputs[0].push(10).unwrap();
        inputs[0].close().unwrap();
        assert!(rec.end().is_none());
        inputs[1].close().unwrap();

        assert_eq!(rec.values(), vec![20, 10]);
        assert!(rec.end().unwrap().is_complete());
    }

    #[test]
    fn test_flat_map_latest_cancels_previous() {
        let (outer, outers) = channel::<i32>();
        let (inputs, factory) = inner_factory();
        let rec = Recorder::attach(outers.flat_map_latest(factory));

        outer.push(1).unwrap();
        outer.push(2).unwrap();
        let inputs = std::mem::take(&mut *inputs.lock().unwrap());

        // The first inner was unsubscribed before the second one started.
        assert!(!inputs[0].is_active());
        assert!(inputs[0].push(1).is_err());
        inputs[1].push(2).unwrap();
        assert_eq!(rec.values(), vec![2]);
    }

    #[test]
    fn test_flat_map_first_drops_while_busy() {
        let (outer, outers) = channel::<i32>();
        let (inputs, factory) = inner_factory();
        let rec = Recorder::attach(outers.flat_map_first(factory));

        outer.push(1).unwrap();
        outer.push(2).unwrap();
        assert_eq!(inputs.lock().unwrap().len(), 1);

        inputs.lock().unwrap()[0].close().unwrap();
        outer.push(3).unwrap();
        assert_eq!(inputs.lock().unwrap().len(), 2);
        inputs.lock().unwrap()[1].push(30).unwrap();
        assert_eq!(rec.values(), vec![30]);
    }

    #[test]
    fn test_inner_failure_ends_output() {
        let rec = Recorder::attach(
            Stream::from_values(vec![1, 2]).flat_map(|v| {
                if v == 1 {
                    Stream::failed(Error::failure("inner"))
                } else {
                    Stream::just(v)
                }
            }),
        );
        assert!(rec.values().is_empty());
        assert!(rec.end().unwrap().is_failure());
        assert_eq!(rec.end_count(), 1);
    }

    #[test]
    fn test_outer_failure_releases_inners() {
        let (outer, outers) = channel::<i32>();
        let (inputs, factory) = inner_factory();
        let rec = Recorder::attach(outers.flat_map(factory));

        outer.push(1).unwrap();
        outer.push(2).unwrap();
        assert!(inputs.lock().unwrap().iter().all(|i| i.is_active()));

        outer.fail(Error::failure("outer")).unwrap();
        assert_eq!(rec.end_count(), 1);
        assert!(inputs.lock().unwrap().iter().all(|i| !i.is_active()));
    }

    #[test]
    fn test_inner_failure_releases_siblings() {
        let (outer, outers) = channel::<i32>();
        let (inputs, factory) = inner_factory();
        let rec = Recorder::attach(outers.flat_map(factory));

        outer.push(1).unwrap();
        outer.push(2).unwrap();
        inputs.lock().unwrap()[0].fail(Error::failure("first")).unwrap();

        assert!(rec.end().unwrap().is_failure());
        assert!(!inputs.lock().unwrap()[1].is_active());
    }
}
