//! The operator catalog.
//!
//! Operators are methods on [`Stream`](crate::Stream), grouped by concern:
//!
//! | Module | Operators |
//! |--------|-----------|
//! | `transform` | `map`, `try_map`, `filter`, `filter_map`, `inspect`, `scan`, `reduce`, `take`, `skip`, `distinct_until_changed`, `transform`, `transform_with_state`, `deliver_on` |
//! | `batch` | `buffer`, `buffer_count`, `buffer_interval`, `buffer_boundary`, `window` |
//! | `timing` | `debounce`, `throttle_first`, `timeout`, `delay`, `Stream::interval`, `Stream::timer` |
//! | `combine` | `merge`, `merge_all`, `combine_latest`, `combine_latest_all`, `zip`, `sample_combine`, `latest_combine`, `intersect` |
//! | `flatten` | `flat_map`, `flat_map_latest`, `flat_map_first` |
//! | `recovery` | `catch_error`, `map_errors`, `Stream::retry` |
//!
//! Replay operators (`multicast`, `continuous`, `playback`, ...) live with
//! [`MultiStream`](crate::MultiStream).
//!
//! Every operator forwards a failure downstream unchanged and exactly once,
//! except the ones in `recovery`.

mod batch;
mod combine;
mod flatten;
mod recovery;
mod timing;
mod transform;

pub use recovery::{Backoff, RetryPolicy};

use std::sync::{Arc, Mutex};

use crate::event::Event;
use crate::stream::outlet::Outlet;
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

/// Shared core of operators with more than one event source.
///
/// Upstream handlers hold it weakly; the subscription handed downstream
/// holds it strongly, so dropping that subscription releases every
/// upstream.
pub(crate) struct Fanin<T, S> {
    state: Mutex<S>,
    outlet: Arc<Outlet<T>>,
    upstreams: Mutex<Vec<Subscription>>,
}

impl<T: Send + 'static, S: Send + 'static> Fanin<T, S> {
    pub(crate) fn new(emitter: Emitter<T>, state: S) -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(state),
            outlet: Outlet::new(emitter),
            upstreams: Mutex::new(Vec::new()),
        })
    }

    /// Activate `stream`, routing its events to `handler`.
    pub(crate) fn connect<U, H>(self: &Arc<Self>, stream: Stream<U>, handler: H)
    where
        U: Send + 'static,
        H: FnMut(&Arc<Self>, Event<U>) + Send + 'static,
    {
        if self.outlet.is_closed() {
            return;
        }
        let weak = Arc::downgrade(self);
        let mut handler = handler;
        let subscription = stream.activate(Emitter::new(move |event| {
            if let Some(fanin) = weak.upgrade() {
                handler(&fanin, event);
            }
        }));
        if self.outlet.is_closed() {
            drop(subscription);
        } else {
            lock(&self.upstreams).push(subscription);
        }
    }

    /// Run `f` under the state lock, then deliver whatever it queued.
    ///
    /// Once the outlet has delivered an end, every upstream is released.
    pub(crate) fn update<R>(&self, f: impl FnOnce(&mut S, &Outlet<T>) -> R) -> R {
        let result = {
            let mut state = lock(&self.state);
            f(&mut state, &self.outlet)
        };
        self.outlet.drain();
        if self.outlet.is_closed() {
            self.release();
        }
        result
    }

    pub(crate) fn release(&self) {
        let upstreams = std::mem::take(&mut *lock(&self.upstreams));
        drop(upstreams);
    }

    /// The downstream's handle on this core.
    pub(crate) fn subscription(self: Arc<Self>) -> Subscription {
        Subscription::new(move || {
            self.outlet.detach();
            self.release();
        })
    }
}
