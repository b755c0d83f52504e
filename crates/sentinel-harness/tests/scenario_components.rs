//! Component lifecycle under the live runtime: a navigation component
//! driven by the update loop and fed by ledger-admitted commands.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use sentinel_core::{
    CommandEnvelope, CommandKind, CommandPayload, ManualClock, NavigationParams, Role,
    SentinelError, SystemConfig,
};
use sentinel_registry::{Component, ComponentDescriptor, LifecycleState};
use sentinel_runtime::Runtime;

/// Shared autopilot setpoint written by the dispatcher and consumed by
/// the component.
#[derive(Default)]
struct Setpoint {
    altitude_m: Mutex<Option<f64>>,
}

struct NavigationComponent {
    setpoint: Arc<Setpoint>,
    ticks: Arc<AtomicU32>,
    held_altitude: f64,
}

impl NavigationComponent {
    fn new(setpoint: Arc<Setpoint>, ticks: Arc<AtomicU32>) -> Box<Self> {
        Box::new(Self {
            setpoint,
            ticks,
            held_altitude: 0.0,
        })
    }
}

#[async_trait]
impl Component for NavigationComponent {
    fn descriptor(&self) -> ComponentDescriptor {
        ComponentDescriptor::new("navigation", "navigation").with_capability("actuator")
    }

    async fn initialize(&mut self) -> Result<(), SentinelError> {
        Ok(())
    }

    async fn update(&mut self, _dt: Duration) -> Result<(), SentinelError> {
        self.ticks.fetch_add(1, Ordering::SeqCst);
        if let Some(target) = *self.setpoint.altitude_m.lock().unwrap() {
            // Slew toward the commanded altitude.
            self.held_altitude += (target - self.held_altitude) * 0.2;
        }
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<(), SentinelError> {
        Ok(())
    }
}

#[tokio::test]
async fn commands_reach_component_through_ledger() {
    let clock = ManualClock::new(1_000);
    let config = SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    };
    let runtime = Runtime::builder(config).clock(clock.clone()).build().unwrap();

    let setpoint = Arc::new(Setpoint::default());
    let ticks = Arc::new(AtomicU32::new(0));
    let id = runtime
        .register_component(NavigationComponent::new(setpoint.clone(), ticks.clone()))
        .await
        .unwrap();

    let sink = setpoint.clone();
    runtime
        .register_dispatch_handler(CommandKind::Navigation, move |payload| {
            if let CommandPayload::Navigation(params) = payload {
                if let Some(altitude) = params.altitude_m {
                    *sink.altitude_m.lock().unwrap() = Some(altitude);
                }
            }
        })
        .await;

    let tasks = runtime.start();

    for i in 0..10 {
        clock.advance_ms(100);
        runtime
            .submit_command(CommandEnvelope::new(
                "operator-1",
                0,
                Role::Operator,
                CommandPayload::Navigation(NavigationParams {
                    altitude_m: Some(2_000.0 + i as f64),
                    ..Default::default()
                }),
            ))
            .await
            .unwrap();
    }

    // The tenth submission sealed a block and dispatched its commands;
    // give the update loop a few real ticks to slew.
    tokio::time::sleep(Duration::from_millis(200)).await;

    assert_eq!(*setpoint.altitude_m.lock().unwrap(), Some(2_009.0));
    assert!(ticks.load(Ordering::SeqCst) > 0);

    runtime.shutdown(tasks).await;

    // Shutdown removed the component from the registry.
    assert!(runtime.unregister_component(id).await.is_err());
}

#[tokio::test]
async fn faulty_component_is_parked_not_fatal() {
    struct Flaky;

    #[async_trait]
    impl Component for Flaky {
        fn descriptor(&self) -> ComponentDescriptor {
            ComponentDescriptor::new("flaky", "probe")
        }
        async fn initialize(&mut self) -> Result<(), SentinelError> {
            Ok(())
        }
        async fn update(&mut self, _dt: Duration) -> Result<(), SentinelError> {
            Err(SentinelError::new(
                "stuck actuator",
                sentinel_core::ErrorCategory::Hardware,
                sentinel_core::ErrorSeverity::Error,
            ))
        }
        async fn shutdown(&mut self) -> Result<(), SentinelError> {
            Ok(())
        }
    }

    let runtime = Runtime::builder(SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    })
    .build()
    .unwrap();

    let id = runtime.register_component(Box::new(Flaky)).await.unwrap();
    let tasks = runtime.start();

    // A few update ticks at 25 Hz drive the component into Error.
    tokio::time::sleep(Duration::from_millis(200)).await;

    // The handle stays available for diagnostics; the runtime never
    // died.
    let info = runtime.component_info(id).await.expect("handle retained");
    assert_eq!(info.state, LifecycleState::Error);
    assert!(info.consecutive_faults >= 2);

    runtime.shutdown(tasks).await;
}
