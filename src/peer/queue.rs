use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::core::{Error, Result};

/// Bounded FIFO of pending payloads
///
/// Shared between the producers (user input or the load generator) and the
/// transmit gate. Enqueue and dequeue never block; the internal lock is held
/// only for the queue operation itself.
#[derive(Debug)]
pub struct OutboundQueue {
    inner: Mutex<VecDeque<String>>,
    capacity: usize,
}

impl OutboundQueue {
    /// Creates a queue with a fixed capacity
    pub fn new(capacity: usize) -> Self {
        OutboundQueue {
            inner: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
        }
    }

    fn guard(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Appends a payload, failing when the queue is at capacity
    ///
    /// A failed enqueue leaves the queue contents unchanged.
    pub fn enqueue(&self, payload: String) -> Result<()> {
        let mut queue = self.guard();
        if queue.len() >= self.capacity {
            return Err(Error::QueueFull);
        }
        queue.push_back(payload);
        Ok(())
    }

    /// Removes and returns the oldest payload, if any
    pub fn dequeue(&self) -> Option<String> {
        self.guard().pop_front()
    }

    /// Number of payloads currently queued
    pub fn depth(&self) -> usize {
        self.guard().len()
    }

    /// Maximum number of payloads the queue holds
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
