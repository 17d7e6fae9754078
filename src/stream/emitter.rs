//! The delivery endpoint of a stage.

use crate::error::Error;
use crate::event::{Event, StreamEnd};

pub(crate) type Handler<T> = Box<dyn FnMut(Event<T>) + Send>;

/// Delivers events to the next stage.
///
/// An emitter forwards at most one end. After the end it releases its
/// handler and silently drops anything else it is given.
pub struct Emitter<T> {
    handler: Option<Handler<T>>,
}

impl<T> Emitter<T> {
    /// Create an emitter around a handler.
    pub fn new<F>(handler: F) -> Self
    where
        F: FnMut(Event<T>) + Send + 'static,
    {
        Self {
            handler: Some(Box::new(handler)),
        }
    }

    pub(crate) fn from_boxed(handler: Handler<T>) -> Self {
        Self {
            handler: Some(handler),
        }
    }

    /// An emitter that has already ended.
    pub fn closed() -> Self {
        Self { handler: None }
    }

    /// Deliver an event.
    ///
    /// Returns `false` if the emitter had already ended.
    pub fn emit(&mut self, event: Event<T>) -> bool {
        let Some(handler) = self.handler.as_mut() else {
            return false;
        };
        let terminal = event.is_end();
        handler(event);
        if terminal {
            self.handler = None;
        }
        true
    }

    /// Deliver a value.
    pub fn send(&mut self, value: T) -> bool {
        self.emit(Event::Value(value))
    }

    /// Deliver an end.
    pub fn end(&mut self, end: StreamEnd) -> bool {
        self.emit(Event::End(end))
    }

    /// Deliver a normal end.
    pub fn complete(&mut self) -> bool {
        self.end(StreamEnd::Complete)
    }

    /// Deliver a failure.
    pub fn fail(&mut self, err: Error) -> bool {
        self.end(StreamEnd::Failed(err))
    }

    /// Whether an end has been delivered.
    pub fn is_closed(&self) -> bool {
        self.handler.is_none()
    }
}

impl<T> std::fmt::Debug for Emitter<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("closed", &self.is_closed())
            .finish()
    }
}
