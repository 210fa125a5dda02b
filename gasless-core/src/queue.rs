use std::collections::VecDeque;

/// FIFO with amortized O(1) push and pop and an optional capacity.
#[derive(Debug, Clone)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: Option<usize>,
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(None)
    }
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items, or any number when `None`
    pub fn new(capacity: Option<usize>) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    /// Append an item at the back. Hands the item back if the queue is full.
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.is_full() {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    /// Take the item at the front
    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the queue holds no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Whether another push would be rejected
    pub fn is_full(&self) -> bool {
        self.capacity
            .map(|capacity| self.items.len() >= capacity)
            .unwrap_or(false)
    }

    /// Maximum number of items, if bounded
    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }
}
