//! # Tributary
//!
//! Typed composition of push-based reactive event streams.
//!
//! A channel is opened as a [`Pipeline`]: the producer handle that writes
//! into it, paired with the [`Stream`] it feeds. Operators extend the tail
//! one step at a time while the producer handle rides along unchanged, so
//! the code that builds a chain keeps the ability to push into it.
//!
//! ## Features
//!
//! - **Three producer capabilities**: [`Input`] (exclusive), [`MultiInput`]
//!   (cloneable) and [`MergedInput`] (streams attach at runtime), fixed at
//!   compile time
//! - **Operator catalog**: transforms, batching, rate shaping, combination,
//!   flattening, recovery and replay
//! - **Execution contexts**: deliver on the calling thread, a serial worker
//!   thread, or a tokio runtime
//! - **Explicit failures**: a failure ends a stream and is delivered
//!   downstream exactly once
//!
//! ## Quick Start
//!
//! ```rust
//! use tributary::{Context, Stream};
//!
//! let total = std::sync::Arc::new(std::sync::Mutex::new(0));
//! let sink = total.clone();
//! let _sub = Stream::from_values(1..=10)
//!     .filter(|x| x % 2 == 0)
//!     .reduce(0, |acc, x| acc + x)
//!     .subscribe_values(&Context::Direct, move |sum| *sink.lock().unwrap() = sum);
//! assert_eq!(*total.lock().unwrap(), 30);
//! ```
//!
//! With a producer kept alongside the chain:
//!
//! ```rust,ignore
//! use tributary::prelude::*;
//!
//! let pipeline: Pipeline<Input<u32>, _> = Pipeline::channel();
//! let (input, _sub) = pipeline
//!     .debounce(Duration::from_millis(100), true, &Context::current_runtime()?)
//!     .subscribe_values(&Context::Direct, |v| println!("settled on {v}"));
//!
//! input.push(1)?;
//! input.close()?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod channel;
pub mod context;
pub mod error;
pub mod event;
pub mod observability;
pub mod operators;
pub mod pipeline;
pub mod stream;
mod sync;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::channel::{
        BindTarget, Input, MergePolicy, MergedInput, MultiInput, Producer, channel, merged_channel,
        multi_channel,
    };
    pub use crate::context::Context;
    pub use crate::error::{Error, Result};
    pub use crate::event::{Event, StreamEnd};
    pub use crate::pipeline::Pipeline;
    pub use crate::stream::{MultiStream, Stage, Stream, Subscription};
    pub use std::time::Duration;
}

pub use channel::{
    AttachmentId, BindTarget, ChannelId, ClosePropagation, Input, MergePolicy, MergedInput,
    MultiInput, Producer, channel, merged_channel, multi_channel,
};
pub use context::{Context, SerialQueue};
pub use error::{Error, Result};
pub use event::{Event, StreamEnd};
pub use operators::{Backoff, RetryPolicy};
pub use pipeline::{Pipeline, Refusal, Rejected};
pub use stream::{
    Capture, Emitter, EventStream, Junction, MultiStream, Snapshot, Stage, Stream, Subscription,
};
