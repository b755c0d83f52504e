//! Priority-laned bounded queue
//!
//! Four FIFO lanes behind one shared capacity. Pop order is lane 0 first,
//! then 1, 2, 3. Not thread-safe on its own; the bus wraps it in a lock
//! and the pump is the only consumer.

use sentinel_core::{Event, Priority};

/// Shared capacity across all lanes.
pub const QUEUE_CAPACITY: usize = 4096;

/// Result of a push against the shared capacity.
#[derive(Debug)]
pub enum PushOutcome {
    /// Enqueued without displacing anything.
    Enqueued,
    /// Queue was full; the event was enqueued after evicting the
    /// returned lowest-priority event.
    EnqueuedAfterEviction(Box<Event>),
    /// Queue full and the event was not critical.
    Rejected(Box<Event>),
}

pub struct PriorityQueue {
    lanes: [std::collections::VecDeque<Event>; Priority::LANES],
    capacity: usize,
    len: usize,
}

impl PriorityQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            lanes: Default::default(),
            capacity,
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn lane_depth(&self, priority: Priority) -> usize {
        self.lanes[priority.lane()].len()
    }

    /// Push one event. When the queue is full, a critical event displaces
    /// the most recently queued event of the lowest-priority non-empty
    /// lane; anything else is rejected.
    pub fn push(&mut self, event: Event) -> PushOutcome {
        if self.len < self.capacity {
            self.lanes[event.priority.lane()].push_back(event);
            self.len += 1;
            return PushOutcome::Enqueued;
        }

        if event.priority != Priority::Critical {
            return PushOutcome::Rejected(Box::new(event));
        }

        match self.evict_lowest() {
            Some(evicted) => {
                self.lanes[event.priority.lane()].push_back(event);
                self.len += 1;
                PushOutcome::EnqueuedAfterEviction(Box::new(evicted))
            }
            // Every queued event is critical; nothing is lower-priority.
            None => PushOutcome::Rejected(Box::new(event)),
        }
    }

    /// Push bypassing the capacity check. Reserved for bus-internal
    /// housekeeping notices so they survive a saturated queue.
    pub(crate) fn push_unbounded(&mut self, event: Event) {
        self.lanes[event.priority.lane()].push_back(event);
        self.len += 1;
    }

    /// Pop the next event in strict priority order.
    pub fn pop(&mut self) -> Option<Event> {
        for lane in &mut self.lanes {
            if let Some(event) = lane.pop_front() {
                self.len -= 1;
                return Some(event);
            }
        }
        None
    }

    fn evict_lowest(&mut self) -> Option<Event> {
        for lane in self.lanes.iter_mut().rev() {
            if let Some(event) = lane.pop_back() {
                if event.priority == Priority::Critical {
                    // Put it back; critical events are never evicted.
                    lane.push_back(event);
                    return None;
                }
                self.len -= 1;
                return Some(event);
            }
        }
        None
    }
}
