//! Command dispatcher
//!
//! Routes ledger-admitted commands to component handlers by command
//! kind. Dispatch is paused while the platform is in the emergency
//! mode; commands finalized during a pause are dropped, not queued —
//! the ledger already holds the authoritative record.

use std::collections::HashMap;

use tracing::{debug, warn};

use sentinel_core::{CommandKind, CommandPayload};

type Handler = Box<dyn Fn(&CommandPayload) + Send + Sync>;

#[derive(Default)]
pub struct CommandDispatcher {
    handlers: HashMap<CommandKind, Vec<Handler>>,
    paused: bool,
    dispatched: u64,
    suppressed: u64,
}

impl CommandDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an actuator-side handler for one command kind.
    pub fn register(
        &mut self,
        kind: CommandKind,
        handler: impl Fn(&CommandPayload) + Send + Sync + 'static,
    ) {
        self.handlers.entry(kind).or_default().push(Box::new(handler));
    }

    /// Pause or resume actuator dispatch (emergency protocol).
    pub fn set_paused(&mut self, paused: bool) {
        if self.paused != paused {
            warn!(paused, "actuator dispatch state changed");
        }
        self.paused = paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn dispatched(&self) -> u64 {
        self.dispatched
    }

    pub fn dispatch(&mut self, payload: &CommandPayload) {
        if self.paused {
            self.suppressed += 1;
            debug!(kind = ?payload.kind(), "dispatch suppressed: emergency pause");
            return;
        }
        if let Some(handlers) = self.handlers.get(&payload.kind()) {
            for handler in handlers {
                handler(payload);
            }
        }
        self.dispatched += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{NavigationParams, SystemAction};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn nav() -> CommandPayload {
        CommandPayload::Navigation(NavigationParams {
            altitude_m: Some(900.0),
            ..Default::default()
        })
    }

    #[test]
    fn test_routes_by_kind() {
        let mut dispatcher = CommandDispatcher::new();
        let nav_calls = Arc::new(AtomicU32::new(0));
        let sys_calls = Arc::new(AtomicU32::new(0));

        let counter = nav_calls.clone();
        dispatcher.register(CommandKind::Navigation, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let counter = sys_calls.clone();
        dispatcher.register(CommandKind::System, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.dispatch(&nav());
        dispatcher.dispatch(&CommandPayload::System {
            action: SystemAction::Diagnose,
        });
        dispatcher.dispatch(&nav());

        assert_eq!(nav_calls.load(Ordering::SeqCst), 2);
        assert_eq!(sys_calls.load(Ordering::SeqCst), 1);
        assert_eq!(dispatcher.dispatched(), 3);
    }

    #[test]
    fn test_pause_suppresses() {
        let mut dispatcher = CommandDispatcher::new();
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        dispatcher.register(CommandKind::Navigation, move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        dispatcher.set_paused(true);
        dispatcher.dispatch(&nav());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        dispatcher.set_paused(false);
        dispatcher.dispatch(&nav());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
