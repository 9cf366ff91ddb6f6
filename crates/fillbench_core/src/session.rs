//! The compositor session seam
//!
//! A backend turns protocol callbacks into `SessionEvent`s and queues them in
//! delivery order; the pacer consumes them from a single dispatch loop.

use crate::buffer::BufferHandle;
use std::error::Error as StdError;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    /// The compositor stopped reading this buffer.
    Released(BufferHandle),
    /// The frame callback requested alongside this buffer fired.
    FrameDone(BufferHandle),
    /// The surface (re)configured; already acknowledged by the backend.
    Configured,
    /// The compositor asked the surface to close.
    Closed,
}

/// Surface-local damage rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Damage {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Damage {
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0,
            y: 0,
            width: i32::try_from(width).unwrap_or(i32::MAX),
            height: i32::try_from(height).unwrap_or(i32::MAX),
        }
    }
}

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no protocol buffer registered for {0}")]
    UnknownBuffer(BufferHandle),

    #[error("compositor connection failed during {op}")]
    Connection {
        op: &'static str,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("dispatch would block forever: {0}")]
    Stalled(String),
}

impl SessionError {
    pub fn connection(op: &'static str, source: impl Into<Box<dyn StdError + Send + Sync>>) -> Self {
        SessionError::Connection {
            op,
            source: source.into(),
        }
    }
}

pub trait Session {
    /// Ask for a frame-done callback tied to the next submission of `buffer`.
    fn request_frame(&mut self, buffer: BufferHandle) -> Result<(), SessionError>;

    /// Attach `buffer`, damage it and commit the surface.
    fn submit(&mut self, buffer: BufferHandle, damage: Damage) -> Result<(), SessionError>;

    /// Block until at least one event arrives, then append everything
    /// delivered so far to `events` in order.
    fn dispatch(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError>;
}

impl<S: Session + ?Sized> Session for &mut S {
    fn request_frame(&mut self, buffer: BufferHandle) -> Result<(), SessionError> {
        (**self).request_frame(buffer)
    }

    fn submit(&mut self, buffer: BufferHandle, damage: Damage) -> Result<(), SessionError> {
        (**self).submit(buffer, damage)
    }

    fn dispatch(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        (**self).dispatch(events)
    }
}
