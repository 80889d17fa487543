//! 有界待发送队列
//!
//! 先进先出；队列满时拒绝新消息，已排队的消息保持不变。

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use contracts::Event;

/// 每个 sink 的默认队列容量
pub const DEFAULT_QUEUE_CAPACITY: usize = 500;

/// sink 未连接期间暂存的事件
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedMessage {
    pub event: Event,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedMessage {
    pub fn new(event: Event) -> Self {
        Self {
            event,
            enqueued_at: Utc::now(),
        }
    }
}

/// FIFO queue that rejects new items when full
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: VecDeque<T>,
    capacity: usize,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::with_capacity(capacity.min(64)),
            capacity,
        }
    }

    /// Append at the tail
    ///
    /// # Errors
    /// Hands the item back when the queue is full
    pub fn push(&mut self, item: T) -> Result<(), T> {
        if self.items.len() >= self.capacity {
            return Err(item);
        }
        self.items.push_back(item);
        Ok(())
    }

    pub fn pop(&mut self) -> Option<T> {
        self.items.pop_front()
    }

    /// Remove and return everything, oldest first
    pub fn drain_all(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }

    pub fn front(&self) -> Option<&T> {
        self.items.front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<T> Default for BoundedQueue<T> {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
