//! In-process compositor for headless runs and tests
//!
//! Every dispatch with nothing queued waits one refresh interval on the
//! clock and then "repaints": host-memory commits are copied and released
//! at once, GPU-shared commits stay held until a newer commit replaces them
//! on screen, and every callback armed by a commit fires.

use crate::buffer::{BufferHandle, Strategy};
use crate::session::{Damage, Session, SessionError, SessionEvent};
use crate::time::Clock;
use std::collections::VecDeque;
use std::time::Duration;

pub struct SimulatedCompositor<C: Clock> {
    clock: C,
    refresh: Duration,
    requested: Vec<BufferHandle>,
    armed: Vec<BufferHandle>,
    committed: Vec<BufferHandle>,
    displayed: Option<BufferHandle>,
    queue: VecDeque<SessionEvent>,
    submitted: Vec<BufferHandle>,
    max_armed: usize,
    repaints: u64,
}

impl<C: Clock> SimulatedCompositor<C> {
    pub fn new(clock: C, refresh: Duration) -> Self {
        Self {
            clock,
            refresh,
            requested: Vec::new(),
            armed: Vec::new(),
            committed: Vec::new(),
            displayed: None,
            queue: VecDeque::new(),
            submitted: Vec::new(),
            max_armed: 0,
            repaints: 0,
        }
    }

    pub fn with_refresh_hz(clock: C, hz: u32) -> Self {
        Self::new(clock, Duration::from_secs(1) / hz.max(1))
    }

    /// Every committed buffer, in commit order.
    pub fn submitted(&self) -> &[BufferHandle] {
        &self.submitted
    }

    /// Largest number of frame callbacks waiting on one repaint.
    pub fn max_armed_callbacks(&self) -> usize {
        self.max_armed
    }

    pub fn displayed(&self) -> Option<BufferHandle> {
        self.displayed
    }

    pub fn repaints(&self) -> u64 {
        self.repaints
    }

    /// Queue an event ahead of the next repaint.
    pub fn inject(&mut self, event: SessionEvent) {
        self.queue.push_back(event);
    }

    fn repaint(&mut self) {
        self.clock.sleep(self.refresh);
        self.repaints += 1;

        let committed = std::mem::take(&mut self.committed);
        if let Some(&latest) = committed.last() {
            for &handle in &committed {
                match handle.strategy {
                    // Contents were copied at commit time.
                    Strategy::HostMemory => self.queue.push_back(SessionEvent::Released(handle)),
                    Strategy::GpuShared if handle != latest => {
                        self.queue.push_back(SessionEvent::Released(handle))
                    }
                    Strategy::GpuShared => {}
                }
            }

            if let Some(previous) = self.displayed {
                if previous != latest && previous.strategy == Strategy::GpuShared {
                    self.queue.push_back(SessionEvent::Released(previous));
                }
            }
            self.displayed = Some(latest);
        }

        for handle in self.armed.drain(..) {
            self.queue.push_back(SessionEvent::FrameDone(handle));
        }
    }
}

impl<C: Clock> Session for SimulatedCompositor<C> {
    fn request_frame(&mut self, buffer: BufferHandle) -> Result<(), SessionError> {
        self.requested.push(buffer);
        Ok(())
    }

    fn submit(&mut self, buffer: BufferHandle, _damage: Damage) -> Result<(), SessionError> {
        self.submitted.push(buffer);
        self.committed.push(buffer);
        self.armed.append(&mut self.requested);
        self.max_armed = self.max_armed.max(self.armed.len());
        Ok(())
    }

    fn dispatch(&mut self, events: &mut Vec<SessionEvent>) -> Result<(), SessionError> {
        if self.queue.is_empty() {
            if self.committed.is_empty() && self.armed.is_empty() {
                return Err(SessionError::Stalled(
                    "no commit or frame callback pending".to_string(),
                ));
            }
            self.repaint();
        }
        events.extend(self.queue.drain(..));
        Ok(())
    }
}
