//! Publisher-facing bus handle
//!
//! `EventBus` is the enqueue primitive; the queue itself is owned by the
//! pump side. Publishers only ever touch `publish`.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tokio::sync::Notify;
use tracing::warn;

use sentinel_core::{Clock, Event, EventPayload, EventSink, Priority};

use crate::queue::{PriorityQueue, PushOutcome, QUEUE_CAPACITY};

#[derive(Debug, Error)]
pub enum BusError {
    /// Queue full below critical priority.
    #[error("event queue full ({0} events)")]
    BackpressureFull(usize),
}

/// Monotonic counters, updated lock-free.
#[derive(Default)]
pub struct BusStats {
    pub published: AtomicU64,
    pub rejected: AtomicU64,
    pub evicted: AtomicU64,
    pub delivered: AtomicU64,
    pub slow_handlers: AtomicU64,
}

/// Point-in-time copy of the counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub published: u64,
    pub rejected: u64,
    pub evicted: u64,
    pub delivered: u64,
    pub slow_handlers: u64,
    pub depth: usize,
}

pub(crate) struct BusShared {
    pub(crate) queue: Mutex<PriorityQueue>,
    pub(crate) notify: Notify,
    pub(crate) stats: BusStats,
    pub(crate) clock: Arc<dyn Clock>,
}

/// Cloneable publisher handle.
#[derive(Clone)]
pub struct EventBus {
    pub(crate) shared: Arc<BusShared>,
}

impl EventBus {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_capacity(clock, QUEUE_CAPACITY)
    }

    pub fn with_capacity(clock: Arc<dyn Clock>, capacity: usize) -> Self {
        Self {
            shared: Arc::new(BusShared {
                queue: Mutex::new(PriorityQueue::new(capacity)),
                notify: Notify::new(),
                stats: BusStats::default(),
                clock,
            }),
        }
    }

    /// Enqueue an event. Returns once the event is queued. A full queue
    /// rejects everything below critical priority; a critical event
    /// displaces the lowest-priority queued event and a `QueueEvicted`
    /// notice is enqueued in its place.
    pub fn publish(&self, event: Event) -> Result<(), BusError> {
        let outcome = {
            let mut queue = self.shared.queue.lock().expect("bus queue poisoned");
            queue.push(event)
        };

        match outcome {
            PushOutcome::Enqueued => {
                self.shared.stats.published.fetch_add(1, Ordering::Relaxed);
            }
            PushOutcome::EnqueuedAfterEviction(evicted) => {
                self.shared.stats.published.fetch_add(1, Ordering::Relaxed);
                self.shared.stats.evicted.fetch_add(1, Ordering::Relaxed);
                self.emit_eviction_notice(&evicted);
            }
            PushOutcome::Rejected(rejected) => {
                self.shared.stats.rejected.fetch_add(1, Ordering::Relaxed);
                let depth = self.depth();
                warn!(kind = ?rejected.kind, depth, "event rejected: queue full");
                return Err(BusError::BackpressureFull(depth));
            }
        }

        self.shared.notify.notify_one();
        Ok(())
    }

    pub fn depth(&self) -> usize {
        self.shared.queue.lock().expect("bus queue poisoned").len()
    }

    pub fn stats(&self) -> StatsSnapshot {
        let stats = &self.shared.stats;
        StatsSnapshot {
            published: stats.published.load(Ordering::Relaxed),
            rejected: stats.rejected.load(Ordering::Relaxed),
            evicted: stats.evicted.load(Ordering::Relaxed),
            delivered: stats.delivered.load(Ordering::Relaxed),
            slow_handlers: stats.slow_handlers.load(Ordering::Relaxed),
            depth: self.depth(),
        }
    }

    fn emit_eviction_notice(&self, evicted: &Event) {
        let notice = Event::new(
            "event-bus",
            self.shared.clock.now_ns(),
            Priority::Low,
            EventPayload::QueueEvicted {
                evicted_kind: evicted.kind,
                evicted_priority: evicted.priority,
            },
        );
        let mut queue = self.shared.queue.lock().expect("bus queue poisoned");
        queue.push_unbounded(notice);
    }
}

impl EventSink for EventBus {
    fn emit(&self, event: Event) {
        // Sink semantics: best effort, publisher never blocks or fails.
        let _ = self.publish(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{EventKind, ManualClock};

    fn event(priority: Priority, seq: u64) -> Event {
        Event::new(
            "test",
            seq,
            priority,
            EventPayload::HilConnected {
                interface_id: format!("if{seq}"),
            },
        )
    }

    #[test]
    fn test_publish_returns_after_enqueue() {
        let bus = EventBus::with_capacity(ManualClock::new(0), 8);
        bus.publish(event(Priority::Normal, 1)).unwrap();
        assert_eq!(bus.depth(), 1);
        assert_eq!(bus.stats().published, 1);
    }

    #[test]
    fn test_backpressure_below_critical() {
        let bus = EventBus::with_capacity(ManualClock::new(0), 2);
        bus.publish(event(Priority::Normal, 1)).unwrap();
        bus.publish(event(Priority::Normal, 2)).unwrap();
        let err = bus.publish(event(Priority::High, 3)).unwrap_err();
        assert!(matches!(err, BusError::BackpressureFull(2)));
        assert_eq!(bus.stats().rejected, 1);
    }

    #[test]
    fn test_critical_eviction_emits_notice() {
        let bus = EventBus::with_capacity(ManualClock::new(0), 2);
        bus.publish(event(Priority::Low, 1)).unwrap();
        bus.publish(event(Priority::Normal, 2)).unwrap();
        bus.publish(event(Priority::Critical, 3)).unwrap();

        assert_eq!(bus.stats().evicted, 1);
        // Eviction freed one slot for the critical event; the notice
        // itself took the place of the drained slot on next pop.
        let mut queue = bus.shared.queue.lock().unwrap();
        let first = queue.pop().unwrap();
        assert_eq!(first.priority, Priority::Critical);
        let kinds: Vec<EventKind> = std::iter::from_fn(|| queue.pop()).map(|e| e.kind).collect();
        assert!(kinds.contains(&EventKind::QueueEvicted));
    }
}
