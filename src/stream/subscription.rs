//! Cancellation handles.

use smallvec::SmallVec;

type Teardown = Box<dyn FnOnce() + Send>;

/// Keeps an activated stream alive.
///
/// Dropping a subscription runs its teardown, which detaches the subscriber
/// and releases every upstream resource that was activated for it (channel
/// registrations, timers, nested subscriptions).
#[must_use = "dropping a subscription cancels it immediately"]
#[derive(Default)]
pub struct Subscription {
    teardown: SmallVec<[Teardown; 2]>,
}

impl Subscription {
    /// A subscription with nothing to release.
    pub fn empty() -> Self {
        Self::default()
    }

    /// A subscription that runs `f` on cancellation.
    pub fn new<F>(f: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        let mut teardown: SmallVec<[Teardown; 2]> = SmallVec::new();
        teardown.push(Box::new(f));
        Self { teardown }
    }

    /// A subscription that keeps `value` alive until cancelled.
    pub fn hold<V: Send + 'static>(value: V) -> Self {
        Self::new(move || drop(value))
    }

    /// Add another teardown step.
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce() + Send + 'static,
    {
        self.teardown.push(Box::new(f));
    }

    /// Combine two subscriptions into one.
    pub fn merge(mut self, mut other: Subscription) -> Self {
        self.teardown.extend(other.teardown.drain(..));
        self
    }

    /// Whether there is anything to release.
    pub fn is_empty(&self) -> bool {
        self.teardown.is_empty()
    }

    /// Cancel now.
    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        for teardown in self.teardown.drain(..) {
            teardown();
        }
    }
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Subscription")
            .field("teardown_steps", &self.teardown.len())
            .finish()
    }
}
