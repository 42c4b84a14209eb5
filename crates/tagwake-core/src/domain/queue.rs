//! Bounded queue of pending messages.
//!
//! The queue has a fixed capacity chosen at construction.  Inserting beyond
//! that capacity is rejected with [`QueueError::Overflow`]; the queue never
//! evicts an older message to make room.
//!
//! Matching against a detected tag happens through
//! [`PendingQueue::take_addressed_to`], which splits the queue in one pass:
//! messages for the tag are handed out, every other message stays behind in
//! its original relative order.

use std::collections::VecDeque;

use thiserror::Error;

use super::message::PendingMessage;

/// Error type for queue operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum QueueError {
    /// The queue already holds `capacity` messages.
    #[error("pending queue is full ({capacity} messages)")]
    Overflow { capacity: usize },
}

/// Result of splitting the queue against a detected identity.
#[derive(Debug)]
pub struct Partition {
    /// Messages addressed to the identity, in enqueue order.
    pub matched: Vec<PendingMessage>,
    /// Number of messages that stayed in the queue.
    pub retained: usize,
}

impl Partition {
    pub fn is_empty(&self) -> bool {
        self.matched.is_empty()
    }
}

/// FIFO queue of [`PendingMessage`]s with a hard capacity.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<PendingMessage>,
    capacity: usize,
}

impl PendingQueue {
    /// Creates an empty queue that holds at most `capacity` messages.
    ///
    /// A capacity of zero is raised to one so the queue can always make
    /// progress.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `message` to the back of the queue.
    ///
    /// # Errors
    ///
    /// Returns [`QueueError::Overflow`] when the queue is full.  The message is
    /// not inserted and nothing already queued is touched.
    pub fn push(&mut self, message: PendingMessage) -> Result<(), QueueError> {
        if self.is_full() {
            return Err(QueueError::Overflow {
                capacity: self.capacity,
            });
        }
        self.items.push_back(message);
        Ok(())
    }

    /// Removes every message addressed to `id` and returns them.
    ///
    /// Messages for other recipients remain queued, at the front, in the order
    /// they were enqueued.
    pub fn take_addressed_to(&mut self, id: &str) -> Partition {
        let drained = std::mem::take(&mut self.items);
        let mut matched = Vec::new();
        let mut retained = VecDeque::with_capacity(self.capacity);

        for message in drained {
            if message.is_addressed_to(id) {
                matched.push(message);
            } else {
                retained.push_back(message);
            }
        }

        self.items = retained;
        Partition {
            matched,
            retained: self.items.len(),
        }
    }

    /// Iterates over queued messages from oldest to newest.
    pub fn iter(&self) -> impl Iterator<Item = &PendingMessage> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.items.len() >= self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
