//! # Sentinel Harness
//!
//! Shared fixtures for the integration suite under `tests/`. The crate
//! itself carries no runtime behavior.

use std::sync::{Arc, Mutex};

use sentinel_core::{Event, EventKind, EventPayload, EventSink};

/// Event recorder usable anywhere an [`EventSink`] is expected.
pub struct EventRecorder {
    events: Mutex<Vec<Event>>,
}

impl EventRecorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            events: Mutex::new(Vec::new()),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("recorder poisoned").clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.events().iter().filter(|e| e.kind == kind).count()
    }

    pub fn payloads(&self) -> Vec<EventPayload> {
        self.events().into_iter().map(|e| e.payload).collect()
    }
}

impl EventSink for EventRecorder {
    fn emit(&self, event: Event) {
        self.events.lock().expect("recorder poisoned").push(event);
    }
}
