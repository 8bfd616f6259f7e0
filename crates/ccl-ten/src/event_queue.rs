use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap, HashSet};

use ordered_float::OrderedFloat;

use crate::event::Event;

/// Min-heap of future `receive_time`s, with events sharing a time coalesced
/// into one bucket so the heap never holds two entries for the same time
/// (spec.md §4.3).
#[derive(Clone, Debug, Default)]
pub struct EventQueue {
    heap: BinaryHeap<Reverse<OrderedFloat<f64>>>,
    time_present: HashSet<OrderedFloat<f64>>,
    events_at_time: HashMap<OrderedFloat<f64>, Vec<Event>>,
}

impl EventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert `event`, adding its `receive_time` to the heap only if that
    /// time isn't already present.
    pub fn push(&mut self, event: Event) {
        let time = OrderedFloat(event.receive_time);
        if self.time_present.insert(time) {
            self.heap.push(Reverse(time));
        }
        self.events_at_time.entry(time).or_default().push(event);
    }

    /// Remove and return all events scheduled for the earliest remaining
    /// time, or `None` if the queue is empty.
    pub fn pop(&mut self) -> Option<(f64, Vec<Event>)> {
        let Reverse(time) = self.heap.pop()?;
        self.time_present.remove(&time);
        let events = self.events_at_time.remove(&time).unwrap_or_default();
        Some((time.into_inner(), events))
    }

    /// The earliest remaining time without removing it.
    pub fn peek_time(&self) -> Option<f64> {
        self.heap.peek().map(|Reverse(t)| t.into_inner())
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccl_topology::LinkId;

    fn event(link_dst: u32, chunk: u32, send: f64, recv: f64) -> Event {
        Event { link: LinkId::new(0, link_dst), chunk, send_time: send, receive_time: recv }
    }

    #[test]
    fn pop_returns_earliest_time_first() {
        let mut q = EventQueue::new();
        q.push(event(1, 0, 0.0, 5.0));
        q.push(event(2, 1, 0.0, 2.0));
        let (t, _) = q.pop().unwrap();
        assert_eq!(t, 2.0);
        let (t, _) = q.pop().unwrap();
        assert_eq!(t, 5.0);
        assert!(q.is_empty());
    }

    #[test]
    fn coalesces_events_sharing_a_time() {
        let mut q = EventQueue::new();
        q.push(event(1, 0, 0.0, 3.0));
        q.push(event(2, 1, 0.0, 3.0));
        let (t, events) = q.pop().unwrap();
        assert_eq!(t, 3.0);
        assert_eq!(events.len(), 2);
        assert!(q.is_empty());
    }
}
