//! Timestamp-ordered frame buffer.
//!
//! An indexed binary heap: the heap holds `(timestamp, sequence_id)` keys and
//! a side map owns the payloads, so a popped key is resolved to its payload in
//! O(1). Equal timestamps come out in decode order.

use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::core::time::Seconds;
use crate::decode::frame::Frame;

#[derive(Debug, Clone, Copy)]
struct QueueKey {
    timestamp: Seconds,
    sequence_id: u64,
}

impl PartialEq for QueueKey {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for QueueKey {}

impl PartialOrd for QueueKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueueKey {
    fn cmp(&self, other: &Self) -> Ordering {
        self.timestamp
            .total_cmp(&other.timestamp)
            .then(self.sequence_id.cmp(&other.sequence_id))
    }
}

/// Min-heap of pending frames keyed by presentation order
#[derive(Debug)]
pub struct OrderedFrameQueue<T> {
    heap: BinaryHeap<Reverse<QueueKey>>,
    payloads: HashMap<u64, T>,
}

impl<T> OrderedFrameQueue<T> {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            payloads: HashMap::new(),
        }
    }

    /// Insert a frame. Sequence ids must be unique within the queue.
    pub fn push(&mut self, frame: Frame<T>) {
        let key = QueueKey {
            timestamp: frame.timestamp,
            sequence_id: frame.sequence_id,
        };
        if self.payloads.insert(frame.sequence_id, frame.payload).is_some() {
            // replaced payload keeps the newer data; drop the stale heap key
            self.heap.retain(|Reverse(k)| k.sequence_id != frame.sequence_id);
        }
        self.heap.push(Reverse(key));
    }

    /// Remove and return the frame with the smallest `(timestamp, sequence_id)`
    pub fn pop(&mut self) -> Option<Frame<T>> {
        while let Some(Reverse(key)) = self.heap.pop() {
            if let Some(payload) = self.payloads.remove(&key.sequence_id) {
                return Some(Frame {
                    timestamp: key.timestamp,
                    sequence_id: key.sequence_id,
                    payload,
                });
            }
        }
        None
    }

    /// Timestamp of the next frame to present
    pub fn peek_timestamp(&self) -> Option<Seconds> {
        self.heap.peek().map(|Reverse(key)| key.timestamp)
    }

    /// Remove a specific frame by sequence id
    pub fn remove(&mut self, sequence_id: u64) -> Option<T> {
        let payload = self.payloads.remove(&sequence_id)?;
        self.heap.retain(|Reverse(k)| k.sequence_id != sequence_id);
        Some(payload)
    }

    pub fn len(&self) -> usize {
        self.payloads.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payloads.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
        self.payloads.clear();
    }
}

impl<T> Default for OrderedFrameQueue<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(timestamp: Seconds, sequence_id: u64) -> Frame<&'static str> {
        Frame {
            timestamp,
            sequence_id,
            payload: "payload",
        }
    }

    fn drain(queue: &mut OrderedFrameQueue<&'static str>) -> Vec<(Seconds, u64)> {
        std::iter::from_fn(|| queue.pop())
            .map(|f| (f.timestamp, f.sequence_id))
            .collect()
    }

    #[test]
    fn test_pops_in_timestamp_order_regardless_of_push_order() {
        let mut queue = OrderedFrameQueue::new();
        // decode order of an IBBP group: 0.0, 0.1, 0.033, 0.066, 0.2, 0.133, 0.166
        let timestamps = [0.0, 0.1, 0.033, 0.066, 0.2, 0.133, 0.166];
        for (seq, ts) in timestamps.iter().enumerate() {
            queue.push(frame(*ts, seq as u64));
        }

        let popped: Vec<Seconds> = drain(&mut queue).into_iter().map(|(ts, _)| ts).collect();
        assert_eq!(popped, vec![0.0, 0.033, 0.066, 0.1, 0.133, 0.166, 0.2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_equal_timestamps_keep_decode_order() {
        let mut queue = OrderedFrameQueue::new();
        queue.push(frame(1.0, 7));
        queue.push(frame(1.0, 3));
        queue.push(frame(0.5, 9));
        queue.push(frame(1.0, 5));

        assert_eq!(drain(&mut queue), vec![(0.5, 9), (1.0, 3), (1.0, 5), (1.0, 7)]);
    }

    #[test]
    fn test_non_decreasing_for_scrambled_pushes() {
        let mut queue = OrderedFrameQueue::new();
        // deterministic permutation of 0..200
        for (seq, step) in (0..200u64).map(|i| (i * 7919) % 200).enumerate() {
            queue.push(frame(step as f64 / 30.0, seq as u64));
        }
        assert_eq!(queue.len(), 200);

        let popped = drain(&mut queue);
        assert_eq!(popped.len(), 200);
        assert!(popped.windows(2).all(|w| w[0].0 <= w[1].0));
    }

    #[test]
    fn test_peek_remove_and_clear() {
        let mut queue = OrderedFrameQueue::new();
        queue.push(frame(2.0, 0));
        queue.push(frame(1.0, 1));
        assert_eq!(queue.peek_timestamp(), Some(1.0));

        assert_eq!(queue.remove(1), Some("payload"));
        assert_eq!(queue.remove(1), None);
        assert_eq!(queue.peek_timestamp(), Some(2.0));
        assert_eq!(queue.len(), 1);

        queue.clear();
        assert!(queue.is_empty());
        assert!(queue.pop().is_none());
        assert_eq!(queue.peek_timestamp(), None);
    }
}
