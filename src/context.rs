//! Execution contexts for stage callbacks.
//!
//! A [`Context`] says where a handler runs:
//!
//! | Context | Behaviour |
//! |---------|-----------|
//! | `Direct` | Inline on the delivering thread (default) |
//! | `Serial` | FIFO on a dedicated worker thread |
//! | `Runtime` | On a tokio runtime, one task per bound handler |
//!
//! A handler bound to `Serial` or `Runtime` still sees its events one at a
//! time and in delivery order; the context only decides which thread runs
//! it. A `Runtime` handler stops draining after its end event.
//!
//! Timed operators also ask their context for a tokio [`Handle`] to run
//! timers on. `Direct` and `Serial` fall back to the ambient runtime.

use std::sync::{Arc, Mutex};

use tokio::runtime::Handle;
use tokio::sync::mpsc;

use crate::error::{Error, Result};
use crate::event::Event;
use crate::stream::emitter::Handler;
use crate::sync::lock;

type Job = Box<dyn FnOnce() + Send>;

/// Where stage callbacks execute.
#[derive(Clone, Default)]
pub enum Context {
    /// Run on the calling thread.
    #[default]
    Direct,

    /// Run in order on a dedicated worker thread.
    Serial(SerialQueue),

    /// Spawn onto a tokio runtime.
    Runtime(Handle),
}

impl Context {
    /// The direct (synchronous) context.
    pub fn direct() -> Self {
        Self::Direct
    }

    /// A new serial queue backed by its own worker thread.
    pub fn serial(name: &str) -> Result<Self> {
        SerialQueue::new(name).map(Self::Serial)
    }

    /// Spawn callbacks onto the given runtime.
    pub fn runtime(handle: Handle) -> Self {
        Self::Runtime(handle)
    }

    /// Spawn callbacks onto the runtime this thread is running in.
    pub fn current_runtime() -> Result<Self> {
        Handle::try_current()
            .map(Self::Runtime)
            .map_err(|_| Error::Construction("no tokio runtime is running".into()))
    }

    /// Whether callbacks run inline.
    pub fn is_direct(&self) -> bool {
        matches!(self, Self::Direct)
    }

    /// Run a job in this context.
    pub(crate) fn execute(&self, job: Job) {
        match self {
            Self::Direct => job(),
            Self::Serial(queue) => queue.enqueue(job),
            Self::Runtime(handle) => {
                handle.spawn(async move { job() });
            }
        }
    }

    /// The runtime timers for this context are scheduled on.
    pub(crate) fn timer_handle(&self) -> Result<Handle> {
        match self {
            Self::Runtime(handle) => Ok(handle.clone()),
            _ => Handle::try_current().map_err(|_| {
                Error::Construction("timed operators need a running tokio runtime".into())
            }),
        }
    }

    /// Wrap a handler so each invocation runs in this context.
    pub(crate) fn bind_handler<T, H>(&self, handler: H) -> Handler<T>
    where
        T: Send + 'static,
        H: FnMut(Event<T>) + Send + 'static,
    {
        match self {
            Self::Direct => Box::new(handler),
            Self::Serial(_) => {
                let ctx = self.clone();
                let handler = Arc::new(Mutex::new(handler));
                Box::new(move |event| {
                    let handler = handler.clone();
                    ctx.execute(Box::new(move || {
                        let mut handler = lock(&handler);
                        (*handler)(event);
                    }));
                })
            }
            Self::Runtime(handle) => bind_on_runtime(handle, handler),
        }
    }
}

/// Feed a handler from one task on `handle`, keeping delivery order.
fn bind_on_runtime<T, H>(handle: &Handle, mut handler: H) -> Handler<T>
where
    T: Send + 'static,
    H: FnMut(Event<T>) + Send + 'static,
{
    let (sender, mut receiver) = mpsc::unbounded_channel::<Event<T>>();
    handle.spawn(async move {
        while let Some(event) = receiver.recv().await {
            let ended = event.is_end();
            handler(event);
            if ended {
                break;
            }
        }
    });
    Box::new(move |event| {
        if sender.send(event).is_err() {
            tracing::trace!("runtime handler has ended; dropping event");
        }
    })
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct => f.write_str("Direct"),
            Self::Serial(queue) => f.debug_tuple("Serial").field(&queue.name()).finish(),
            Self::Runtime(_) => f.write_str("Runtime"),
        }
    }
}

// ============================================================================
// Serial Queue
// ============================================================================

/// A FIFO executor with one worker thread.
///
/// The worker exits once every clone of the queue has been dropped and the
/// remaining jobs have run.
#[derive(Clone)]
pub struct SerialQueue {
    name: Arc<str>,
    sender: kanal::Sender<Job>,
}

impl SerialQueue {
    /// Start a new queue.
    pub fn new(name: &str) -> Result<Self> {
        let (sender, receiver) = kanal::unbounded::<Job>();
        std::thread::Builder::new()
            .name(format!("tributary-{name}"))
            .spawn(move || {
                while let Ok(job) = receiver.recv() {
                    job();
                }
            })
            .map_err(|e| Error::Construction(format!("failed to start serial queue: {e}")))?;

        tracing::debug!(queue = %name, "serial queue started");
        Ok(Self {
            name: name.into(),
            sender,
        })
    }

    /// The queue's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn enqueue(&self, job: Job) {
        if self.sender.send(job).is_err() {
            tracing::warn!(queue = %self.name, "serial queue worker has stopped; dropping job");
        }
    }
}
