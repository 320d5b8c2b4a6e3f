//! The pending-event queue.
//!
//! Events are delivered earliest-timestamp first; events sharing a
//! timestamp are delivered in enqueue (FIFO) order. The queue is bounded:
//! when it saturates, the oldest-enqueued event is discarded so a runaway
//! producer degrades instead of exhausting memory.

use log::warn;
use std::collections::BinaryHeap;
use std::sync::Arc;

use vireo_field::FieldValue;
use vireo_ids::NodeId;

use crate::error::{Result, VireoError};

/// Maximum number of pending events before the oldest is discarded.
pub const MAX_EVENTS: usize = 400;

/// A pending event: value headed for one node's eventIn at a timestamp.
#[derive(Clone, Debug)]
pub struct Event {
    pub timestamp: f64,
    pub to_node: NodeId,
    pub to_eventin: Arc<str>,
    pub value: FieldValue,
}

#[derive(Debug)]
struct QueuedEvent {
    seq: u64,
    event: Event,
}

impl PartialEq for QueuedEvent {
    fn eq(&self, other: &Self) -> bool {
        self.seq == other.seq
    }
}

impl Eq for QueuedEvent {}

impl PartialOrd for QueuedEvent {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for QueuedEvent {
    // Reversed so that BinaryHeap (a max-heap) pops the earliest timestamp,
    // breaking ties by lowest sequence number (FIFO).
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .event
            .timestamp
            .total_cmp(&self.event.timestamp)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

/// Bounded min-queue of pending events.
#[derive(Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<QueuedEvent>,
    next_seq: u64,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            next_seq: 0,
        }
    }

    /// Enqueue an event. Allocation failure is reported as
    /// [`VireoError::OutOfMemory`]; saturation discards the oldest-enqueued
    /// event (not necessarily the earliest timestamp) with a warning.
    pub fn push(&mut self, event: Event) -> Result<()> {
        if self.heap.len() >= MAX_EVENTS {
            if let Some(oldest) = self.heap.iter().map(|q| q.seq).min() {
                warn!(
                    "event queue saturated ({MAX_EVENTS} events); discarding oldest-enqueued event"
                );
                self.heap.retain(|q| q.seq != oldest);
            }
        }
        self.heap
            .try_reserve(1)
            .map_err(|_| VireoError::OutOfMemory)?;
        let seq = self.next_seq;
        self.next_seq += 1;
        self.heap.push(QueuedEvent { seq, event });
        Ok(())
    }

    /// Pop the earliest pending event.
    pub fn pop(&mut self) -> Option<Event> {
        self.heap.pop().map(|q| q.event)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Discard all pending events.
    pub fn flush(&mut self) {
        self.heap.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ev(timestamp: f64, tag: i32) -> Event {
        Event {
            timestamp,
            to_node: NodeId::from_parts(1, 0),
            to_eventin: Arc::from("set_value"),
            value: FieldValue::SfInt32(tag),
        }
    }

    #[test]
    fn pops_in_timestamp_order() {
        let mut q = EventQueue::new();
        q.push(ev(2.0, 1)).unwrap();
        q.push(ev(1.0, 2)).unwrap();
        q.push(ev(3.0, 3)).unwrap();
        let order: Vec<f64> = std::iter::from_fn(|| q.pop()).map(|e| e.timestamp).collect();
        assert_eq!(order, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn equal_timestamps_are_fifo() {
        let mut q = EventQueue::new();
        for tag in 0..5 {
            q.push(ev(1.0, tag)).unwrap();
        }
        let order: Vec<i32> = std::iter::from_fn(|| q.pop())
            .map(|e| e.value.as_int32().unwrap())
            .collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
    }

    #[test]
    fn saturation_discards_oldest_enqueued() {
        let mut q = EventQueue::new();
        for tag in 0..(MAX_EVENTS as i32) {
            q.push(ev(1.0, tag)).unwrap();
        }
        q.push(ev(1.0, 9999)).unwrap();
        assert_eq!(q.len(), MAX_EVENTS);
        // tag 0 (the oldest-enqueued) is gone; the newcomer survived.
        let tags: Vec<i32> = std::iter::from_fn(|| q.pop())
            .map(|e| e.value.as_int32().unwrap())
            .collect();
        assert!(!tags.contains(&0));
        assert!(tags.contains(&9999));
    }
}
