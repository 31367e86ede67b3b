//! Event queue serving the request/response channel.
//!
//! Console processes push events from their supervising threads; MCP clients
//! pull them with `console_poll_events`.

use std::collections::VecDeque;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::warn;

use termhost_core::ConsoleHandle;
use termhost_session::{ConsoleEvent, EventSink};

/// Events kept before the oldest are dropped.
pub const DEFAULT_EVENT_CAPACITY: usize = 10_000;

/// Bounded FIFO of console events.
#[derive(Debug)]
pub struct EventQueue {
    events: Mutex<VecDeque<ConsoleEvent>>,
    capacity: usize,
    notify: Notify,
}

impl EventQueue {
    /// Create a queue holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        Self {
            events: Mutex::new(VecDeque::new()),
            capacity,
            notify: Notify::new(),
        }
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Remove up to `max` events, optionally only those for `handle`.
    pub fn drain(&self, handle: Option<&ConsoleHandle>, max: usize) -> Vec<ConsoleEvent> {
        let mut events = self.events.lock();
        let Some(handle) = handle else {
            let count = max.min(events.len());
            return events.drain(..count).collect();
        };

        let mut taken = Vec::new();
        let mut kept = VecDeque::with_capacity(events.len());
        for event in events.drain(..) {
            if taken.len() < max && event.handle() == handle {
                taken.push(event);
            } else {
                kept.push_back(event);
            }
        }
        *events = kept;
        taken
    }

    /// Number of queued events for `handle`, or all of them.
    pub fn pending(&self, handle: Option<&ConsoleHandle>) -> usize {
        let events = self.events.lock();
        match handle {
            Some(handle) => events.iter().filter(|event| event.handle() == handle).count(),
            None => events.len(),
        }
    }

    /// Wait until an event for `handle` (or any event) is queued, or
    /// `timeout` passes. Events for other consoles do not end the wait.
    pub async fn wait(&self, handle: Option<&ConsoleHandle>, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            // register before checking so a notify in between is not lost
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.pending(handle) > 0 || tokio::time::Instant::now() >= deadline {
                return;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return;
            }
        }
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}

impl EventSink for EventQueue {
    fn notify(&self, event: ConsoleEvent) {
        {
            let mut events = self.events.lock();
            if events.len() >= self.capacity {
                if let Some(dropped) = events.pop_front() {
                    warn!(
                        "Event queue full, dropping oldest: handle={}, event={}",
                        dropped.handle(),
                        dropped.name()
                    );
                }
            }
            events.push_back(event);
        }
        self.notify.notify_waiters();
    }
}
