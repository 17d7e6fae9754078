//! Dynamic-merge producer: streams attach and detach at runtime.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, Weak};

use super::producer::{Producer, ProducerGuard};
use super::{BindTarget, ChannelCore, ChannelId};
use crate::error::Result;
use crate::event::{Event, StreamEnd};
use crate::stream::{Emitter, Stream, Subscription};
use crate::sync::lock;

// ============================================================================
// Policy
// ============================================================================

/// Which child ends terminate the merged output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClosePropagation {
    /// Child ends only remove the child.
    #[default]
    None,
    /// A child failure ends the output; other ends remove the child.
    Failures,
    /// Any child end ends the output.
    All,
}

impl ClosePropagation {
    fn propagates(self, end: &StreamEnd) -> bool {
        match self {
            Self::None => false,
            Self::Failures => end.is_failure(),
            Self::All => true,
        }
    }
}

/// Configuration for a [`MergedInput`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergePolicy {
    /// Default close propagation for attached streams.
    pub close_propagation: ClosePropagation,
    /// Release attached streams when the merged output deactivates.
    pub remove_on_deactivate: bool,
}

impl Default for MergePolicy {
    fn default() -> Self {
        Self {
            close_propagation: ClosePropagation::Failures,
            remove_on_deactivate: false,
        }
    }
}

impl MergePolicy {
    /// Any child end ends the output.
    pub fn propagate_all() -> Self {
        Self {
            close_propagation: ClosePropagation::All,
            ..Self::default()
        }
    }

    /// Children never end the output and are released with it.
    pub fn isolated() -> Self {
        Self {
            close_propagation: ClosePropagation::None,
            remove_on_deactivate: true,
        }
    }

    /// Set the close propagation.
    pub fn with_close_propagation(mut self, propagation: ClosePropagation) -> Self {
        self.close_propagation = propagation;
        self
    }

    /// Set whether children are released on deactivation.
    pub fn with_remove_on_deactivate(mut self, remove: bool) -> Self {
        self.remove_on_deactivate = remove;
        self
    }
}

// ============================================================================
// Merged Input
// ============================================================================

/// Handle to one attached stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentId(u64);

/// A cloneable producer that streams can be attached to.
///
/// Attached streams are activated immediately and their values are pushed
/// into the merged output. The handle itself can also push. Child ends are
/// handled per the [`MergePolicy`].
pub struct MergedInput<T: Send + 'static> {
    shared: Arc<MergedShared<T>>,
    guard: Arc<ProducerGuard<T>>,
}

struct MergedShared<T: Send + 'static> {
    core: Arc<ChannelCore<T>>,
    policy: MergePolicy,
    state: Mutex<MergedState>,
}

#[derive(Default)]
struct MergedState {
    attachments: HashMap<AttachmentId, Attachment>,
    next_id: u64,
}

struct Attachment {
    subscription: Option<Subscription>,
    remove_on_deactivate: bool,
}

/// Open a channel whose producer accepts attached streams.
pub fn merged_channel<T: Send + 'static>(policy: MergePolicy) -> (MergedInput<T>, Stream<T>) {
    let core = ChannelCore::open();
    let shared = Arc::new(MergedShared {
        core: core.clone(),
        policy,
        state: Mutex::new(MergedState::default()),
    });

    let weak = Arc::downgrade(&shared);
    let output = core.output();
    let stream = Stream::from_fn(move |emitter| {
        output.activate(emitter).merge(Subscription::new(move || {
            if let Some(shared) = weak.upgrade() {
                shared.release_on_deactivate();
            }
        }))
    });

    (
        MergedInput {
            shared,
            guard: Arc::new(ProducerGuard { core }),
        },
        stream,
    )
}

impl<T: Send + 'static> MergedInput<T> {
    /// Attach a stream using the policy's close propagation.
    pub fn attach(&self, stream: Stream<T>) -> AttachmentId {
        self.attach_with(
            stream,
            self.shared.policy.close_propagation,
            self.shared.policy.remove_on_deactivate,
        )
    }

    /// Attach a stream with its own close propagation.
    pub fn attach_with(
        &self,
        stream: Stream<T>,
        propagation: ClosePropagation,
        remove_on_deactivate: bool,
    ) -> AttachmentId {
        let id = {
            let mut state = lock(&self.shared.state);
            let id = AttachmentId(state.next_id);
            state.next_id += 1;
            state.attachments.insert(
                id,
                Attachment {
                    subscription: None,
                    remove_on_deactivate,
                },
            );
            id
        };

        if self.shared.core.is_closed() {
            lock(&self.shared.state).attachments.remove(&id);
            return id;
        }
        tracing::debug!(channel = %self.shared.core.id(), attachment = id.0, "stream attached");

        let weak: Weak<MergedShared<T>> = Arc::downgrade(&self.shared);
        let subscription = stream.activate(Emitter::new(move |event| {
            let Some(shared) = weak.upgrade() else {
                return;
            };
            match event {
                Event::Value(value) => {
                    let _ = shared.core.push(value);
                }
                Event::End(end) => shared.child_ended(id, end, propagation),
            }
        }));

        // The child may have ended during activation.
        let mut state = lock(&self.shared.state);
        match state.attachments.get_mut(&id) {
            Some(attachment) => attachment.subscription = Some(subscription),
            None => {
                drop(state);
                drop(subscription);
            }
        }
        id
    }

    /// Release an attached stream. Returns `false` if it was already gone.
    pub fn detach(&self, id: AttachmentId) -> bool {
        let removed = lock(&self.shared.state).attachments.remove(&id);
        match removed {
            Some(attachment) => {
                tracing::debug!(channel = %self.shared.core.id(), attachment = id.0, "stream detached");
                drop(attachment);
                true
            }
            None => false,
        }
    }

    /// Number of streams currently attached.
    pub fn attachment_count(&self) -> usize {
        lock(&self.shared.state).attachments.len()
    }

    /// The policy this input was opened with.
    pub fn policy(&self) -> MergePolicy {
        self.shared.policy
    }
}

impl<T: Send + 'static> MergedShared<T> {
    fn child_ended(&self, id: AttachmentId, end: StreamEnd, propagation: ClosePropagation) {
        let removed = lock(&self.state).attachments.remove(&id);
        drop(removed);

        if propagation.propagates(&end) {
            tracing::debug!(channel = %self.core.id(), attachment = id.0, "child end closes merged output");
            self.core.finish(end);
            self.clear();
        }
    }

    fn clear(&self) {
        let attachments = std::mem::take(&mut lock(&self.state).attachments);
        drop(attachments);
    }

    fn release_on_deactivate(&self) {
        let released: Vec<Attachment> = {
            let mut state = lock(&self.state);
            let ids: Vec<AttachmentId> = state
                .attachments
                .iter()
                .filter(|(_, a)| a.remove_on_deactivate)
                .map(|(id, _)| *id)
                .collect();
            ids.iter()
                .filter_map(|id| state.attachments.remove(id))
                .collect()
        };
        drop(released);
    }
}

impl<T: Send + 'static> Clone for MergedInput<T> {
    fn clone(&self) -> Self {
        Self {
            shared: self.shared.clone(),
            guard: self.guard.clone(),
        }
    }
}

impl<T: Send + 'static> Producer for MergedInput<T> {
    type Item = T;

    fn push(&self, value: T) -> Result<()> {
        self.shared.core.push(value)
    }

    fn end(&self, end: StreamEnd) -> Result<()> {
        let result = self.shared.core.end(end);
        self.shared.clear();
        result
    }

    fn channel_id(&self) -> ChannelId {
        self.shared.core.id()
    }

    fn is_closed(&self) -> bool {
        self.shared.core.is_closed()
    }

    fn is_active(&self) -> bool {
        self.shared.core.is_active()
    }
}

impl<T: Send + 'static> BindTarget<T> for MergedInput<T> {
    fn bind_stream(&self, stream: Stream<T>) -> Subscription {
        let id = self.attach(stream);
        let shared = Arc::downgrade(&self.shared);
        Subscription::new(move || {
            if let Some(shared) = shared.upgrade() {
                let removed = lock(&shared.state).attachments.remove(&id);
                drop(removed);
            }
        })
    }
}

impl<T: Send + 'static> std::fmt::Debug for MergedInput<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MergedInput")
            .field("channel", &self.shared.core.id())
            .field("policy", &self.shared.policy)
            .field("attachments", &self.attachment_count())
            .finish()
    }
}
