//! Error fabric
//!
//! Cross-cutting sink for classified errors. Handlers run per category in
//! registration order until one consumes the error; a registered recovery
//! strategy then maps the error to a [`RecoveryDirective`] the caller
//! executes. Critical errors always surface a `SystemFailure` event, even
//! after consumption.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::clock::Clock;
use crate::error::{ErrorCategory, ErrorSeverity, SentinelError};
use crate::event::{Event, EventPayload, EventSink, Priority};

/// Result of a single category handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandlerOutcome {
    /// Stop propagation to later handlers.
    Consumed,
    /// Let later handlers see the error.
    Passed,
}

/// What the originating subsystem should do next.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryDirective {
    /// Retry the failed operation with exponential backoff. On
    /// exhaustion the caller re-raises at Error severity.
    RetryWithBackoff {
        initial: Duration,
        factor: u32,
        cap: Duration,
        max_attempts: u32,
    },
    /// Multiply the sensor's priority weight and schedule recalibration.
    DegradeSensor {
        weight_factor: f64,
        recalibrate_after: Duration,
    },
    /// Attempt one consensus recovery round; pause actuator dispatch on
    /// failure.
    ConsensusRecovery,
    /// Never retried; the gateway's countermeasure ladder takes over.
    EscalateCountermeasures,
    /// Fatal during startup, warning afterwards.
    RejectConfiguration,
    /// Degrade the component; transition to Error after the given number
    /// of consecutive faulted ticks.
    DegradeComponent { error_after_ticks: u32 },
    /// Nothing registered for this category.
    None,
}

/// A recovery strategy is a value: it inspects the error and yields a
/// directive.
pub type RecoveryStrategy = Box<dyn Fn(&SentinelError) -> RecoveryDirective + Send + Sync>;

type Handler = Box<dyn Fn(&SentinelError) -> HandlerOutcome + Send + Sync>;

pub struct ErrorFabric {
    clock: Arc<dyn Clock>,
    handlers: Mutex<BTreeMap<ErrorCategory, Vec<Handler>>>,
    strategies: Mutex<BTreeMap<ErrorCategory, RecoveryStrategy>>,
    sink: Mutex<Option<Arc<dyn EventSink>>>,
}

impl ErrorFabric {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            clock,
            handlers: Mutex::new(BTreeMap::new()),
            strategies: Mutex::new(BTreeMap::new()),
            sink: Mutex::new(None),
        }
    }

    /// Fabric with the per-category default strategies installed.
    pub fn with_defaults(clock: Arc<dyn Clock>) -> Self {
        let fabric = Self::new(clock);
        fabric.set_strategy(
            ErrorCategory::Network,
            Box::new(|_| RecoveryDirective::RetryWithBackoff {
                initial: Duration::from_millis(100),
                factor: 2,
                cap: Duration::from_secs(5),
                max_attempts: 6,
            }),
        );
        fabric.set_strategy(
            ErrorCategory::Sensor,
            Box::new(|_| RecoveryDirective::DegradeSensor {
                weight_factor: 0.1,
                recalibrate_after: Duration::from_secs(30),
            }),
        );
        fabric.set_strategy(
            ErrorCategory::Blockchain,
            Box::new(|_| RecoveryDirective::ConsensusRecovery),
        );
        fabric.set_strategy(
            ErrorCategory::Security,
            Box::new(|_| RecoveryDirective::EscalateCountermeasures),
        );
        fabric.set_strategy(
            ErrorCategory::Configuration,
            Box::new(|_| RecoveryDirective::RejectConfiguration),
        );
        fabric.set_strategy(
            ErrorCategory::Hardware,
            Box::new(|_| RecoveryDirective::DegradeComponent {
                error_after_ticks: 5,
            }),
        );
        fabric
    }

    /// Attach the event sink used for `Error` and `SystemFailure`
    /// publication. Until attached, reports are logged only.
    pub fn attach_sink(&self, sink: Arc<dyn EventSink>) {
        *self.sink.lock().expect("fabric sink poisoned") = Some(sink);
    }

    /// Register a handler for one category. Handlers run in registration
    /// order.
    pub fn register_handler(
        &self,
        category: ErrorCategory,
        handler: impl Fn(&SentinelError) -> HandlerOutcome + Send + Sync + 'static,
    ) {
        self.handlers
            .lock()
            .expect("fabric handlers poisoned")
            .entry(category)
            .or_default()
            .push(Box::new(handler));
    }

    /// Install or replace the recovery strategy for a category.
    pub fn set_strategy(&self, category: ErrorCategory, strategy: RecoveryStrategy) {
        self.strategies
            .lock()
            .expect("fabric strategies poisoned")
            .insert(category, strategy);
    }

    /// Route one error through the fabric and return the directive the
    /// caller should execute.
    pub fn handle(&self, err: &SentinelError) -> RecoveryDirective {
        self.log(err);
        self.publish_error_event(err);

        let consumed = {
            let handlers = self.handlers.lock().expect("fabric handlers poisoned");
            handlers
                .get(&err.category)
                .map(|chain| {
                    chain
                        .iter()
                        .any(|h| h(err) == HandlerOutcome::Consumed)
                })
                .unwrap_or(false)
        };

        if err.severity == ErrorSeverity::Critical {
            // SystemFailure is emitted regardless of consumption.
            self.publish_system_failure(err);
        }

        if consumed && err.severity != ErrorSeverity::Critical {
            return RecoveryDirective::None;
        }

        let strategies = self.strategies.lock().expect("fabric strategies poisoned");
        strategies
            .get(&err.category)
            .map(|s| s(err))
            .unwrap_or(RecoveryDirective::None)
    }

    fn log(&self, err: &SentinelError) {
        let origin = err.origin_component.as_deref().unwrap_or("unknown");
        match err.severity {
            ErrorSeverity::Debug => debug!(origin, category = ?err.category, "{}", err.message),
            ErrorSeverity::Info => info!(origin, category = ?err.category, "{}", err.message),
            ErrorSeverity::Warning => warn!(origin, category = ?err.category, "{}", err.message),
            ErrorSeverity::Error | ErrorSeverity::Critical => {
                error!(origin, category = ?err.category, "{}", err.message);
            }
        }
    }

    fn publish_error_event(&self, err: &SentinelError) {
        if let Some(sink) = self.sink.lock().expect("fabric sink poisoned").as_ref() {
            sink.emit(Event::new(
                err.origin_component.clone().unwrap_or_else(|| "error-fabric".into()),
                self.clock.now_ns(),
                Priority::from_severity(err.severity),
                EventPayload::Error {
                    message: err.message.clone(),
                    category: err.category,
                    severity: err.severity,
                    origin_component: err.origin_component.clone(),
                },
            ));
        }
    }

    fn publish_system_failure(&self, err: &SentinelError) {
        if let Some(sink) = self.sink.lock().expect("fabric sink poisoned").as_ref() {
            sink.emit(Event::new(
                "error-fabric",
                self.clock.now_ns(),
                Priority::Critical,
                EventPayload::SystemFailure {
                    message: err.message.clone(),
                    origin_component: err.origin_component.clone(),
                },
            ));
        }
    }
}
