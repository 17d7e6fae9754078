//! The pipeline handle: a producer paired with the tail of its chain.
//!
//! A [`Pipeline`] carries two independently evolving types. `P` is the
//! producer handle returned when the channel opened; it is moved from handle
//! to handle unchanged, so the same allocation can still be pushed into
//! after any number of composition steps. `S` is the current tail
//! [`Stage`]; every step consumes it and installs a new one.
//!
//! | Primitive | Result | Use |
//! |-----------|--------|-----|
//! | [`Pipeline::next`] | `Pipeline<P, N>` | Apply one more operator |
//! | [`Pipeline::try_next`] | `Result<Pipeline<P, N>, Rejected<P, S>>` | Apply an operator that may refuse |
//! | [`Pipeline::finish`] | `(P, R)` | End the chain with an artifact |
//! | [`Pipeline::consume`] | `P` | Wire the tail elsewhere, keep only the producer |
//!
//! The operator catalog is also available directly on pipelines whose tail
//! is a [`Stream`]; see the `forward` impls.
//!
//! # Example
//!
//! ```rust
//! use tributary::channel::{Input, Producer};
//! use tributary::{Context, Pipeline};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = seen.clone();
//!
//! let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
//! let (input, _sub) = pipeline
//!     .map(|x| x * 2)
//!     .filter(|x| *x > 2)
//!     .subscribe_values(&Context::Direct, move |v| sink.lock().unwrap().push(v));
//!
//! for x in 1..=3 {
//!     input.push(x).unwrap();
//! }
//! assert_eq!(*seen.lock().unwrap(), vec![4, 6]);
//! ```

mod forward;

use crate::channel::{
    AttachmentId, ChannelId, Input, MergePolicy, MergedInput, MultiInput, Producer, channel,
    merged_channel, multi_channel,
};
use crate::error::{Error, Result};
use crate::stream::{Stage, Stream};

// ============================================================================
// Pipeline
// ============================================================================

/// A producer handle paired with the tail stage of its transformation chain.
///
/// Composition moves both halves into the returned handle. Dropping a
/// pipeline drops its tail but never invalidates a producer that was taken
/// out of it.
#[must_use = "a pipeline does nothing until its tail is subscribed or consumed"]
pub struct Pipeline<P: Producer, S: Stage> {
    producer: P,
    stage: S,
}

impl<P: Producer, S: Stage> Pipeline<P, S> {
    /// Pair an existing producer with a stage.
    pub fn new(producer: P, stage: S) -> Self {
        Self { producer, stage }
    }

    /// The producer handle.
    pub fn producer(&self) -> &P {
        &self.producer
    }

    /// The current tail stage.
    pub fn stage(&self) -> &S {
        &self.stage
    }

    /// Identity of the channel the producer writes into.
    pub fn channel_id(&self) -> ChannelId {
        self.producer.channel_id()
    }

    /// Push a value through the producer.
    pub fn push(&self, value: P::Item) -> Result<()> {
        self.producer.push(value)
    }

    /// Split into producer and tail.
    pub fn into_parts(self) -> (P, S) {
        (self.producer, self.stage)
    }

    /// Replace the tail with `transform(tail)`.
    ///
    /// `transform` runs exactly once, before this returns.
    pub fn next<N, F>(self, transform: F) -> Pipeline<P, N>
    where
        N: Stage,
        F: FnOnce(S) -> N,
    {
        Pipeline {
            producer: self.producer,
            stage: transform(self.stage),
        }
    }

    /// Like [`Pipeline::next`], for transforms that can refuse.
    ///
    /// A refusal hands the untouched stage back, and the error carries the
    /// whole pipeline so the caller can try something else.
    pub fn try_next<N, F>(self, transform: F) -> std::result::Result<Pipeline<P, N>, Rejected<P, S>>
    where
        N: Stage,
        F: FnOnce(S) -> std::result::Result<N, Refusal<S>>,
    {
        match transform(self.stage) {
            Ok(stage) => Ok(Pipeline {
                producer: self.producer,
                stage,
            }),
            Err(refusal) => Err(Rejected {
                pipeline: Pipeline {
                    producer: self.producer,
                    stage: refusal.stage,
                },
                error: refusal.error,
            }),
        }
    }

    /// End the chain, returning the producer and whatever `transform` builds.
    pub fn finish<R, F>(self, transform: F) -> (P, R)
    where
        F: FnOnce(S) -> R,
    {
        (self.producer, transform(self.stage))
    }

    /// Like [`Pipeline::finish`], for transforms that can refuse.
    pub fn try_finish<R, F>(self, transform: F) -> std::result::Result<(P, R), Rejected<P, S>>
    where
        F: FnOnce(S) -> std::result::Result<R, Refusal<S>>,
    {
        match transform(self.stage) {
            Ok(result) => Ok((self.producer, result)),
            Err(refusal) => Err(Rejected {
                pipeline: Pipeline {
                    producer: self.producer,
                    stage: refusal.stage,
                },
                error: refusal.error,
            }),
        }
    }

    /// Hand the tail to `transform` for its effect and keep the producer.
    ///
    /// Typically used to bind the tail into another channel, which makes
    /// diamond-shaped graphs possible.
    pub fn consume<F>(self, transform: F) -> P
    where
        F: FnOnce(S),
    {
        transform(self.stage);
        self.producer
    }
}

impl<P: Producer, S: Stage> From<(P, S)> for Pipeline<P, S> {
    fn from((producer, stage): (P, S)) -> Self {
        Self::new(producer, stage)
    }
}

impl<P: Producer, S: Stage> std::fmt::Debug for Pipeline<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("channel", &self.producer.channel_id())
            .field("stage", &std::any::type_name::<S>())
            .finish()
    }
}

// ============================================================================
// Constructors
// ============================================================================

impl<T: Send + 'static> Pipeline<Input<T>, Stream<T>> {
    /// Open an exclusive channel.
    pub fn channel() -> Self {
        channel().into()
    }
}

impl<T: Send + 'static> Pipeline<MultiInput<T>, Stream<T>> {
    /// Open a channel with cloneable producers.
    pub fn multi_channel() -> Self {
        multi_channel().into()
    }
}

impl<T: Send + 'static> Pipeline<MergedInput<T>, Stream<T>> {
    /// Open a channel that streams attach to at runtime.
    pub fn merged_channel(policy: MergePolicy) -> Self {
        merged_channel(policy).into()
    }
}

// ============================================================================
// Capability-specific operations
// ============================================================================

/// Only pipelines over a [`MergedInput`] can attach streams.
///
/// ```compile_fail
/// use tributary::channel::Input;
/// use tributary::{Pipeline, Stream};
///
/// let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
/// pipeline.attach(Stream::just(1));
/// ```
impl<T: Send + 'static, S: Stage> Pipeline<MergedInput<T>, S> {
    /// Attach `stream` as another input of the producer's channel.
    pub fn attach(&self, stream: Stream<T>) -> AttachmentId {
        self.producer.attach(stream)
    }

    /// Detach a previously attached stream.
    pub fn detach(&self, id: AttachmentId) -> bool {
        self.producer.detach(id)
    }
}

// ============================================================================
// Refusal / Rejected
// ============================================================================

/// A composition transform declining to build, with the stage it was given.
pub struct Refusal<S> {
    stage: S,
    error: Error,
}

impl<S> Refusal<S> {
    /// Decline with `error`.
    pub fn new(stage: S, error: Error) -> Self {
        Self { stage, error }
    }

    /// Decline with an [`Error::UserTransform`] carrying `message`.
    pub fn transform(stage: S, message: impl Into<String>) -> Self {
        Self::new(stage, Error::UserTransform(message.into()))
    }

    /// The reason.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Split into stage and reason.
    pub fn into_parts(self) -> (S, Error) {
        (self.stage, self.error)
    }
}

impl<S> std::fmt::Debug for Refusal<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Refusal").field("error", &self.error).finish()
    }
}

/// A failed composition step, holding the pipeline as it was before.
#[derive(thiserror::Error)]
#[error("pipeline composition rejected: {error}")]
pub struct Rejected<P: Producer, S: Stage> {
    pipeline: Pipeline<P, S>,
    #[source]
    error: Error,
}

impl<P: Producer, S: Stage> Rejected<P, S> {
    /// Why the step was refused.
    pub fn error(&self) -> &Error {
        &self.error
    }

    /// Recover the unchanged pipeline.
    pub fn into_pipeline(self) -> Pipeline<P, S> {
        self.pipeline
    }

    /// Split into pipeline and reason.
    pub fn into_parts(self) -> (Pipeline<P, S>, Error) {
        (self.pipeline, self.error)
    }
}

impl<P: Producer, S: Stage> std::fmt::Debug for Rejected<P, S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Rejected")
            .field("pipeline", &self.pipeline)
            .field("error", &self.error)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ClosePropagation, Producer};
    use crate::stream::MultiStream;
    use crate::stream::testing::Recorder;

    #[test]
    fn test_next_keeps_channel_identity() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let id = pipeline.channel_id();

        let pipeline = pipeline
            .next(|s| s.map(|x| x + 1))
            .next(|s| s.map(|x| x.to_string()))
            .next(|s| s.filter(|s| !s.is_empty()));
        assert_eq!(pipeline.channel_id(), id);

        let (input, stream) = pipeline.into_parts();
        assert_eq!(input.channel_id(), id);
        let rec = Recorder::attach(stream);
        input.push(41).unwrap();
        assert_eq!(rec.values(), vec!["42".to_string()]);
    }

    #[test]
    fn test_try_next_rejection_returns_usable_pipeline() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let id = pipeline.channel_id();

        let rejected = pipeline
            .try_next(|s| Err::<Stream<i32>, _>(Refusal::transform(s, "not today")))
            .unwrap_err();
        assert!(matches!(rejected.error(), Error::UserTransform(m) if m == "not today"));
        assert!(rejected.to_string().contains("not today"));

        let pipeline = rejected.into_pipeline();
        assert_eq!(pipeline.channel_id(), id);
        let (input, stream) = pipeline.into_parts();
        let rec = Recorder::attach(stream);
        input.push(7).unwrap();
        assert_eq!(rec.values(), vec![7]);
    }

    #[test]
    fn test_try_next_success() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let pipeline = pipeline
            .try_next(|s| Ok::<_, Refusal<_>>(s.map(|x| x * 3)))
            .unwrap();
        let (input, stream) = pipeline.into_parts();
        let rec = Recorder::attach(stream);
        input.push(2).unwrap();
        assert_eq!(rec.values(), vec![6]);
    }

    #[test]
    fn test_try_finish_refusal() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let err = pipeline
            .try_finish(|s| Err::<(), _>(Refusal::new(s, Error::Construction("bad".into()))))
            .unwrap_err();
        assert!(matches!(err.error(), Error::Construction(_)));
        let (pipeline, _) = err.into_parts();
        assert!(!pipeline.producer().is_closed());
    }

    #[test]
    fn test_finish_returns_producer_and_artifact() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let (input, rec) = pipeline.finish(Recorder::attach);
        input.push(1).unwrap();
        input.close().unwrap();
        assert_eq!(rec.values(), vec![1]);
        assert!(rec.end().unwrap().is_complete());
    }

    #[test]
    fn test_consume_keeps_producer() {
        let (sink, sunk) = crate::channel::channel::<i32>();
        let rec = Recorder::attach(sunk);

        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let mut binding = None;
        let input = pipeline
            .next(|s| s.map(|x| x * 10))
            .consume(|s| binding = Some(s.bind_to(&sink)));

        input.push(4).unwrap();
        assert_eq!(rec.values(), vec![40]);
        drop(binding);
    }

    #[test]
    fn test_multi_stage_pipeline() {
        let pipeline: Pipeline<MultiInput<i32>, _> = Pipeline::multi_channel();
        let pipeline: Pipeline<_, MultiStream<i32>> = pipeline.next(|s| s.continuous());

        // The replay stage activates its upstream as soon as it is built.
        pipeline.push(1).unwrap();
        let first = Recorder::attach(pipeline.stage().stream());
        pipeline.push(5).unwrap();
        let late = Recorder::attach(pipeline.stage().stream());
        assert_eq!(first.values(), vec![1, 5]);
        assert_eq!(late.values(), vec![5]);
    }

    #[test]
    fn test_merged_pipeline_attach() {
        let pipeline: Pipeline<MergedInput<i32>, _> =
            Pipeline::merged_channel(MergePolicy::default().with_close_propagation(ClosePropagation::None));
        let id = pipeline.attach(Stream::never());
        assert!(pipeline.detach(id));
        assert!(!pipeline.detach(id));

        let (merged, rec) = pipeline.finish(Recorder::attach);
        let (input, stream) = crate::channel::channel::<i32>();
        merged.attach(stream);
        input.push(3).unwrap();
        merged.push(4).unwrap();
        assert_eq!(rec.values(), vec![3, 4]);
    }

    #[test]
    fn test_dropping_pipeline_leaves_producer_usable() {
        let pipeline: Pipeline<Input<i32>, _> = Pipeline::channel();
        let (input, stream) = pipeline.next(|s| s.map(|x| x + 1)).into_parts();
        drop(stream);
        assert!(input.push(1).is_err());
        input.close().unwrap();
        assert!(input.is_closed());
    }

    #[test]
    fn test_debug_names_channel() {
        let pipeline: Pipeline<Input<u8>, _> = Pipeline::channel();
        let text = format!("{pipeline:?}");
        assert!(text.contains("Pipeline"));
        assert!(text.contains("Stream"));
    }
}
