//! Event pump
//!
//! The single cooperative consumer. Drains one batch per cycle (the queue
//! depth observed at cycle start), clones the event per subscriber, and
//! times every handler invocation. Subscriptions registered mid-cycle are
//! merged in at the start of the next cycle.

use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tokio::sync::watch;
use tracing::{debug, warn};

use sentinel_core::{Event, EventKind, EventPayload, Priority};

use crate::bus::EventBus;

/// Handler budget before a `SlowHandler` warning is emitted.
const SLOW_HANDLER_BUDGET_MS: u64 = 50;

/// Opaque handle for unsubscribing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Box<dyn FnMut(Event) + Send>;
type PatternPredicate = Box<dyn Fn(&Event) -> bool + Send>;

enum Registration {
    Kind(EventKind, SubscriptionId, Handler),
    Pattern(SubscriptionId, PatternPredicate, Handler),
    Remove(SubscriptionId),
}

struct KindSubscriber {
    id: SubscriptionId,
    handler: Handler,
}

struct PatternSubscriber {
    id: SubscriptionId,
    predicate: PatternPredicate,
    handler: Handler,
}

/// Owns the subscriber registry and drives delivery.
pub struct EventPump {
    bus: EventBus,
    by_kind: std::collections::HashMap<EventKind, Vec<KindSubscriber>>,
    by_pattern: Vec<PatternSubscriber>,
    pending: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

/// Cloneable handle through which subscriptions are requested.
#[derive(Clone)]
pub struct SubscriberHandle {
    pending: Arc<Mutex<Vec<Registration>>>,
    next_id: Arc<std::sync::atomic::AtomicU64>,
}

impl SubscriberHandle {
    /// Register a handler for a single kind. Takes effect on the next
    /// drain cycle.
    pub fn subscribe(
        &self,
        kind: EventKind,
        handler: impl FnMut(Event) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .expect("pump registry poisoned")
            .push(Registration::Kind(kind, id, Box::new(handler)));
        id
    }

    /// Register a predicate-matched handler. Takes effect on the next
    /// drain cycle.
    pub fn subscribe_pattern(
        &self,
        predicate: impl Fn(&Event) -> bool + Send + 'static,
        handler: impl FnMut(Event) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.pending
            .lock()
            .expect("pump registry poisoned")
            .push(Registration::Pattern(id, Box::new(predicate), Box::new(handler)));
        id
    }

    /// Remove a subscription. Takes effect on the next drain cycle.
    pub fn unsubscribe(&self, id: SubscriptionId) {
        self.pending
            .lock()
            .expect("pump registry poisoned")
            .push(Registration::Remove(id));
    }
}

impl EventPump {
    pub fn new(bus: EventBus) -> Self {
        Self {
            bus,
            by_kind: std::collections::HashMap::new(),
            by_pattern: Vec::new(),
            pending: Arc::new(Mutex::new(Vec::new())),
            next_id: Arc::new(std::sync::atomic::AtomicU64::new(1)),
        }
    }

    /// Handle for registering subscribers from anywhere in the system.
    pub fn handle(&self) -> SubscriberHandle {
        SubscriberHandle {
            pending: self.pending.clone(),
            next_id: self.next_id.clone(),
        }
    }

    /// Run until `shutdown` flips to true, then drain what is queued and
    /// return.
    pub async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                // Final drain so queued critical events are not lost.
                self.drain_cycle();
                debug!("event pump stopped");
                return;
            }
            if self.drain_cycle() == 0 {
                tokio::select! {
                    _ = self.bus.shared.notify.notified() => {}
                    _ = shutdown.changed() => {}
                }
            } else {
                // Batch boundary: let other tasks run.
                tokio::task::yield_now().await;
            }
        }
    }

    /// Deliver at most one batch (queue depth at cycle start). Returns
    /// the number of events delivered.
    pub fn drain_cycle(&mut self) -> usize {
        self.merge_registrations();

        let batch = {
            let queue = self.bus.shared.queue.lock().expect("bus queue poisoned");
            queue.len()
        };

        let mut delivered = 0;
        for _ in 0..batch {
            let event = {
                let mut queue = self.bus.shared.queue.lock().expect("bus queue poisoned");
                queue.pop()
            };
            let Some(event) = event else { break };
            self.deliver(event);
            delivered += 1;
        }
        delivered
    }

    fn merge_registrations(&mut self) {
        let drained: Vec<Registration> = {
            let mut pending = self.pending.lock().expect("pump registry poisoned");
            pending.drain(..).collect()
        };
        for registration in drained {
            match registration {
                Registration::Kind(kind, id, handler) => {
                    self.by_kind
                        .entry(kind)
                        .or_default()
                        .push(KindSubscriber { id, handler });
                }
                Registration::Pattern(id, predicate, handler) => {
                    self.by_pattern.push(PatternSubscriber {
                        id,
                        predicate,
                        handler,
                    });
                }
                Registration::Remove(id) => {
                    for subs in self.by_kind.values_mut() {
                        subs.retain(|s| s.id != id);
                    }
                    self.by_pattern.retain(|s| s.id != id);
                }
            }
        }
    }

    fn deliver(&mut self, event: Event) {
        let mut slow = Vec::new();

        if let Some(subs) = self.by_kind.get_mut(&event.kind) {
            for sub in subs.iter_mut() {
                let started = Instant::now();
                (sub.handler)(event.clone());
                Self::note_elapsed(&event, started, &mut slow);
            }
        }
        for sub in self.by_pattern.iter_mut() {
            if (sub.predicate)(&event) {
                let started = Instant::now();
                (sub.handler)(event.clone());
                Self::note_elapsed(&event, started, &mut slow);
            }
        }

        let stats = &self.bus.shared.stats;
        stats.delivered.fetch_add(1, Ordering::Relaxed);

        for elapsed_ms in slow {
            stats.slow_handlers.fetch_add(1, Ordering::Relaxed);
            warn!(kind = ?event.kind, elapsed_ms, "slow event handler");
            let notice = Event::new(
                "event-pump",
                self.bus.shared.clock.now_ns(),
                Priority::Low,
                EventPayload::SlowHandler {
                    kind: event.kind,
                    elapsed_ms,
                },
            );
            let mut queue = self.bus.shared.queue.lock().expect("bus queue poisoned");
            queue.push_unbounded(notice);
        }
    }

    fn note_elapsed(event: &Event, started: Instant, slow: &mut Vec<u64>) {
        let elapsed_ms = started.elapsed().as_millis() as u64;
        if elapsed_ms > SLOW_HANDLER_BUDGET_MS && event.kind != EventKind::SlowHandler {
            slow.push(elapsed_ms);
        }
    }
}
