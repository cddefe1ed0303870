//! Priority queue of load jobs.
//!
//! Foreground requests always run before preloads; within a priority level
//! jobs run in submission (FIFO) order.

use lightbox_cache::ImageKey;
use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Mutex;

/// Priority of a load job.
///
/// Higher values run first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum LoadPriority {
    /// Speculative cache warming; runs when nothing foreground is waiting.
    Preload = 0,

    /// A consumer is waiting on the result.
    Foreground = 1,
}

#[derive(Debug, Clone)]
struct QueuedLoad {
    key: ImageKey,
    priority: LoadPriority,

    /// Submission counter for FIFO ordering within a priority level.
    sequence: u64,
}

impl PartialEq for QueuedLoad {
    fn eq(&self, other: &Self) -> bool {
        self.sequence == other.sequence
    }
}

impl Eq for QueuedLoad {}

impl PartialOrd for QueuedLoad {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedLoad {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.priority.cmp(&other.priority) {
            // BinaryHeap is a max heap; reverse the sequence comparison so
            // earlier submissions within a priority level come out first.
            Ordering::Equal => other.sequence.cmp(&self.sequence),
            ordering => ordering,
        }
    }
}

struct QueueState {
    heap: BinaryHeap<QueuedLoad>,
    sequence: u64,
}

/// Thread-safe priority queue of load jobs.
pub struct LoadQueue {
    state: Mutex<QueueState>,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState {
                heap: BinaryHeap::new(),
                sequence: 0,
            }),
        }
    }

    /// Queue a key at the given priority.
    pub fn push(&self, key: ImageKey, priority: LoadPriority) {
        let mut state = self.state.lock().unwrap();
        let sequence = state.sequence;
        state.sequence += 1;
        state.heap.push(QueuedLoad {
            key,
            priority,
            sequence,
        });
    }

    /// Take the highest-priority job, or `None` when the queue is empty.
    pub fn pop(&self) -> Option<(ImageKey, LoadPriority)> {
        let mut state = self.state.lock().unwrap();
        state.heap.pop().map(|job| (job.key, job.priority))
    }

    pub fn len(&self) -> usize {
        let state = self.state.lock().unwrap();
        state.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every queued job.
    pub fn clear(&self) {
        let mut state = self.state.lock().unwrap();
        state.heap.clear();
    }
}

impl Default for LoadQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(name: &str) -> ImageKey {
        ImageKey::for_path(format!("/photos/{name}.png"))
    }

    #[test]
    fn test_priority_ordering() {
        assert!(LoadPriority::Foreground > LoadPriority::Preload);
    }

    #[test]
    fn test_foreground_before_preload() {
        let queue = LoadQueue::new();

        queue.push(key("warm"), LoadPriority::Preload);
        queue.push(key("shown"), LoadPriority::Foreground);

        assert_eq!(queue.pop().unwrap().0, key("shown"));
        assert_eq!(queue.pop().unwrap().0, key("warm"));
        assert!(queue.pop().is_none());
    }

    #[test]
    fn test_fifo_within_priority() {
        let queue = LoadQueue::new();

        queue.push(key("a"), LoadPriority::Foreground);
        queue.push(key("b"), LoadPriority::Foreground);
        queue.push(key("c"), LoadPriority::Foreground);

        assert_eq!(queue.pop().unwrap().0, key("a"));
        assert_eq!(queue.pop().unwrap().0, key("b"));
        assert_eq!(queue.pop().unwrap().0, key("c"));
    }

    #[test]
    fn test_mixed_priorities_fifo() {
        let queue = LoadQueue::new();

        queue.push(key("p1"), LoadPriority::Preload);
        queue.push(key("f1"), LoadPriority::Foreground);
        queue.push(key("p2"), LoadPriority::Preload);
        queue.push(key("f2"), LoadPriority::Foreground);

        let order: Vec<_> = std::iter::from_fn(|| queue.pop()).map(|(k, _)| k).collect();
        assert_eq!(order, vec![key("f1"), key("f2"), key("p1"), key("p2")]);
    }

    #[test]
    fn test_clear_and_len() {
        let queue = LoadQueue::new();
        assert!(queue.is_empty());

        queue.push(key("a"), LoadPriority::Preload);
        queue.push(key("b"), LoadPriority::Foreground);
        assert_eq!(queue.len(), 2);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
    }
}
