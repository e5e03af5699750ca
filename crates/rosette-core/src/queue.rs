use crate::types::Message;
use std::{collections::VecDeque, sync::Arc};

/// Messages waiting to be handed to one subscriber's callback.
///
/// The queue keeps at most `depth` messages. Pushing into a full queue
/// evicts the oldest pending message.
///
/// The queue also records whether its owner has already been told that
/// messages are waiting, so at most one wake-up is outstanding at a time.
#[derive(Debug)]
pub struct DeliveryQueue {
    buffer: VecDeque<Arc<Message>>,
    depth: usize,
    dropped: u64,
    notified: bool,
}

impl DeliveryQueue {
    pub fn with_depth(depth: usize) -> Self {
        Self {
            buffer: VecDeque::with_capacity(depth.min(64)),
            depth,
            dropped: 0,
            notified: false,
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Number of messages evicted since the queue was created.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    pub fn pop_front(&mut self) -> Option<Arc<Message>> {
        self.buffer.pop_front()
    }

    /// Appends a message and returns the evicted one, if any.
    pub fn push(&mut self, message: Arc<Message>) -> Option<Arc<Message>> {
        let evicted = if self.buffer.len() >= self.depth {
            self.dropped += 1;
            self.buffer.pop_front()
        } else {
            None
        };

        self.buffer.push_back(message);
        evicted
    }

    /// Marks the queue as announced. Returns true if it was not already,
    /// i.e. if the caller must send the wake-up.
    pub fn notify(&mut self) -> bool {
        !std::mem::replace(&mut self.notified, true)
    }

    /// Clears the announcement and returns how many messages are pending.
    /// Messages pushed afterwards trigger a new wake-up.
    pub fn take_pending(&mut self) -> usize {
        self.notified = false;
        self.buffer.len()
    }

    pub fn clear(&mut self) {
        self.buffer.clear();
        self.notified = false;
    }
}
