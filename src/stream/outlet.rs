//! Serialised delivery point shared by several event sources.
//!
//! Stages that receive events from more than one place (several upstreams,
//! a timer task, a producer handle on another thread) deliver through an
//! `Outlet`. Pushing only queues; draining hands queued events to the
//! downstream emitter on whichever thread got there first. A push made
//! from inside a delivery is queued and picked up by the draining loop
//! instead of recursing, and no lock is held while downstream code runs.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::emitter::Emitter;
use crate::error::Error;
use crate::event::{Event, StreamEnd};
use crate::sync::lock;

pub(crate) struct Outlet<T> {
    state: Mutex<OutletState<T>>,
}

struct OutletState<T> {
    sink: Sink<T>,
    queue: VecDeque<Event<T>>,
    ended: bool,
}

enum Sink<T> {
    /// Nobody is delivering; the emitter is parked here.
    Idle(Emitter<T>),
    /// A thread has taken the emitter and is draining the queue.
    Busy,
    /// Detached or finished.
    Gone,
}

impl<T> Outlet<T> {
    pub(crate) fn new(emitter: Emitter<T>) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(OutletState {
                sink: Sink::Idle(emitter),
                queue: VecDeque::new(),
                ended: false,
            }),
        })
    }

    /// Queue an event without delivering it.
    ///
    /// Returns `false` if the outlet already accepted an end or was
    /// detached. Callers that push while holding their own state lock must
    /// call [`Outlet::drain`] after releasing it.
    pub(crate) fn push(&self, event: Event<T>) -> bool {
        let mut state = lock(&self.state);
        if state.ended || matches!(state.sink, Sink::Gone) {
            return false;
        }
        if event.is_end() {
            state.ended = true;
        }
        state.queue.push_back(event);
        true
    }

    /// Deliver queued events unless another thread is already doing so.
    pub(crate) fn drain(&self) {
        let mut emitter = {
            let mut state = lock(&self.state);
            match std::mem::replace(&mut state.sink, Sink::Busy) {
                Sink::Idle(emitter) => emitter,
                other => {
                    state.sink = other;
                    return;
                }
            }
        };

        loop {
            let event = {
                let mut state = lock(&self.state);
                if matches!(state.sink, Sink::Gone) {
                    state.queue.clear();
                    break;
                }
                match state.queue.pop_front() {
                    Some(event) => event,
                    None => {
                        state.sink = if emitter.is_closed() {
                            Sink::Gone
                        } else {
                            Sink::Idle(emitter)
                        };
                        return;
                    }
                }
            };
            emitter.emit(event);
        }

        drop(emitter);
    }

    /// Queue and deliver.
    pub(crate) fn emit(&self, event: Event<T>) -> bool {
        let accepted = self.push(event);
        if accepted {
            self.drain();
        }
        accepted
    }

    pub(crate) fn send(&self, value: T) -> bool {
        self.emit(Event::Value(value))
    }

    pub(crate) fn end(&self, end: StreamEnd) -> bool {
        self.emit(Event::End(end))
    }

    pub(crate) fn fail(&self, err: Error) -> bool {
        self.end(StreamEnd::Failed(err))
    }

    /// Stop delivering and release the downstream emitter.
    pub(crate) fn detach(&self) {
        let previous = {
            let mut state = lock(&self.state);
            state.queue.clear();
            std::mem::replace(&mut state.sink, Sink::Gone)
        };
        drop(previous);
    }

    /// Whether the outlet will refuse further events.
    pub(crate) fn is_closed(&self) -> bool {
        let state = lock(&self.state);
        state.ended || matches!(state.sink, Sink::Gone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn recording() -> (Arc<Mutex<Vec<Event<u32>>>>, Emitter<u32>) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let emitter = Emitter::new(move |event| sink.lock().unwrap().push(event));
        (seen, emitter)
    }

    #[test]
    fn test_outlet_delivers_in_order() {
        let (seen, emitter) = recording();
        let outlet = Outlet::new(emitter);
        outlet.push(Event::Value(1));
        outlet.push(Event::Value(2));
        assert!(seen.lock().unwrap().is_empty());
        outlet.drain();
        outlet.send(3);

        let values: Vec<_> = seen
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| e.value().copied())
            .collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_outlet_rejects_after_end() {
        let (seen, emitter) = recording();
        let outlet = Outlet::new(emitter);
        assert!(outlet.end(StreamEnd::Complete));
        assert!(!outlet.send(1));
        assert!(outlet.is_closed());
        assert_eq!(seen.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_reentrant_push_is_queued() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let slot: Arc<Mutex<Option<Arc<Outlet<u32>>>>> = Arc::new(Mutex::new(None));

        let record = order.clone();
        let reentry = slot.clone();
        let outlet = Outlet::new(Emitter::new(move |event: Event<u32>| {
            if let Event::Value(v) = event {
                record.lock().unwrap().push(v);
                if v == 1 {
                    let outlet = reentry.lock().unwrap().clone().unwrap();
                    outlet.send(2);
                    // Delivered after this callback returns, not inside it.
                    record.lock().unwrap().push(100);
                }
            }
        }));
        *slot.lock().unwrap() = Some(outlet.clone());

        outlet.send(1);
        assert_eq!(*order.lock().unwrap(), vec![1, 100, 2]);
        slot.lock().unwrap().take();
    }

    #[test]
    fn test_detach_drops_queue() {
        let (seen, emitter) = recording();
        let outlet = Outlet::new(emitter);
        outlet.push(Event::Value(1));
        outlet.detach();
        outlet.drain();
        assert!(seen.lock().unwrap().is_empty());
        assert!(!outlet.send(2));
    }
}
