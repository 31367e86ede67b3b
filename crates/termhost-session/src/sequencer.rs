//! Input ordering across concurrent producers.
//!
//! Producers (the RPC path, the socket thread, prompt handlers) tag input
//! with a [`Sequence`]. The sequencer releases ordered input strictly in
//! sequence order, lets untagged input through immediately, and gives up on
//! a gap once enough input has piled up behind it.

use std::collections::VecDeque;

use parking_lot::Mutex;
use tracing::{debug, warn};

use termhost_core::{Input, Sequence};

/// Queue length at which a sequencing gap is abandoned.
pub const AUTO_FLUSH_LENGTH: usize = 20;

#[derive(Debug, Default)]
struct SequencerState {
    queue: VecDeque<Input>,
    /// `None` until the first ordered delivery, and again after a flush.
    last_delivered: Option<u64>,
}

impl SequencerState {
    fn next_expected(&self) -> u64 {
        self.last_delivered.map_or(0, |last| last + 1)
    }

    fn flush(&mut self) {
        for input in self.queue.iter_mut() {
            input.sequence = Sequence::Ignore;
        }
        self.last_delivered = None;
    }
}

/// Orders input events from concurrent producers into one stream.
///
/// The lock is held only while inserting or removing; nothing here blocks.
#[derive(Debug, Default)]
pub struct InputSequencer {
    state: Mutex<SequencerState>,
}

impl InputSequencer {
    /// Create an empty sequencer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an input event.
    pub fn enqueue(&self, input: Input) {
        let mut state = self.state.lock();
        match input.sequence {
            Sequence::Ignore => state.queue.push_back(input),
            Sequence::Flush => {
                debug!("Flushing input queue: queued={}", state.queue.len());
                state.flush();
                state.queue.push_back(input);
            }
            Sequence::Ordered(sequence) => {
                let position = state
                    .queue
                    .iter()
                    .position(|queued| match queued.sequence {
                        Sequence::Ordered(other) => other > sequence,
                        _ => false,
                    })
                    .unwrap_or(state.queue.len());
                state.queue.insert(position, input);
            }
        }
    }

    /// Remove the next deliverable event, if any.
    pub fn dequeue(&self) -> Option<Input> {
        let mut state = self.state.lock();

        let front = state.queue.front()?.sequence;
        match front {
            Sequence::Ignore | Sequence::Flush => return state.queue.pop_front(),
            Sequence::Ordered(sequence) if sequence == state.next_expected() => {
                state.last_delivered = Some(sequence);
                return state.queue.pop_front();
            }
            Sequence::Ordered(_) => {}
        }

        // Gap at the front: untagged input is not held back by it
        if let Some(index) = state
            .queue
            .iter()
            .position(|queued| !queued.sequence.is_ordered())
        {
            return state.queue.remove(index);
        }

        if state.queue.len() >= AUTO_FLUSH_LENGTH {
            if let Sequence::Ordered(sequence) = front {
                warn!(
                    "Abandoning input sequence gap: expected={}, next={}, queued={}",
                    state.next_expected(),
                    sequence,
                    state.queue.len()
                );
                state.flush();
                state.last_delivered = Some(sequence);
                return state.queue.pop_front();
            }
        }

        None
    }

    /// Number of queued events.
    pub fn len(&self) -> usize {
        self.state.lock().queue.len()
    }

    /// Whether the queue is empty.
    pub fn is_empty(&self) -> bool {
        self.state.lock().queue.is_empty()
    }
}
