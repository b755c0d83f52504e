//! Anti-hijack rate-limit scenario through the full runtime front door.

use sentinel_core::{
    AnomalyKind, CommandEnvelope, CommandPayload, Countermeasure, EventKind, EventPayload,
    ManualClock, NavigationParams, Role, SystemConfig,
};
use sentinel_runtime::{CommandRejection, Runtime};

const MS: u64 = 1_000_000;

fn nav_5000() -> CommandEnvelope {
    CommandEnvelope::new(
        "ground-station",
        0,
        Role::Operator,
        CommandPayload::Navigation(NavigationParams {
            altitude_m: Some(5_000.0),
            ..Default::default()
        }),
    )
}

/// Twenty-five identical navigation commands inside one second: the
/// first twenty are admitted, the rest throttled; exactly one
/// severity-8 violation fires and the platform locks command admission
/// down.
#[tokio::test]
async fn anti_hijack_rate_limit() {
    let clock = ManualClock::new(1_000);
    let config = SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    };
    let runtime = Runtime::builder(config).clock(clock.clone()).build().unwrap();

    let mut accepted = 0;
    let mut throttled = 0;
    for _ in 0..25 {
        match runtime.submit_command(nav_5000()).await {
            Ok(()) => accepted += 1,
            Err(CommandRejection::Throttled) => throttled += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
        clock.advance(30 * MS); // 25 submissions inside 750 ms
    }

    assert_eq!(accepted, 20);
    assert_eq!(throttled, 5);
    assert!(runtime
        .active_countermeasures()
        .await
        .contains(&Countermeasure::CommandLockdown));

    // The critical violation reached the audit trail once the pump
    // drained the queued events.
    let tasks = runtime.start();
    tokio::time::sleep(std::time::Duration::from_millis(30)).await;
    assert!(runtime.audit_len() > 0);
    runtime.shutdown(tasks).await;
}

/// Same scenario, observing the violation stream directly at the
/// gateway layer where emission ordering is synchronous.
#[tokio::test]
async fn anti_hijack_violation_report() {
    use sentinel_gateway::{GatewayRejection, SecureGateway};
    use sentinel_harness::EventRecorder;

    let clock = ManualClock::new(1_000);
    let recorder = EventRecorder::new();
    let mut gateway = SecureGateway::with_defaults(clock.clone(), recorder.clone());

    let mut accepted = 0;
    let mut throttled = 0;
    for _ in 0..25 {
        let envelope = nav_5000();
        match gateway.screen(&envelope) {
            Ok(()) => accepted += 1,
            Err(GatewayRejection::Throttled) => throttled += 1,
            Err(other) => panic!("unexpected rejection: {other:?}"),
        }
        clock.advance(30 * MS);
    }

    assert_eq!(accepted, 20);
    assert_eq!(throttled, 5);

    let violations: Vec<_> = recorder
        .payloads()
        .into_iter()
        .filter_map(|p| match p {
            EventPayload::SecurityViolation(anomaly) => Some(anomaly),
            _ => None,
        })
        .collect();
    let severe: Vec<_> = violations.iter().filter(|a| a.severity == 8).collect();
    assert_eq!(severe.len(), 1);
    assert_eq!(severe[0].anomaly_type, AnomalyKind::ExcessiveCommands);
    assert_eq!(severe[0].source_id, "ground-station");

    assert!(gateway
        .active_countermeasures()
        .contains(&Countermeasure::CommandLockdown));
    assert_eq!(recorder.count(EventKind::EmergencyProtocol), 1);
}

/// Lockdown persists until an Admin clears it out of band.
#[tokio::test]
async fn lockdown_clears_only_for_admin() {
    let clock = ManualClock::new(1_000);
    let config = SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    };
    let runtime = Runtime::builder(config).clock(clock.clone()).build().unwrap();

    for _ in 0..21 {
        let _ = runtime.submit_command(nav_5000()).await;
        clock.advance(30 * MS);
    }
    assert_eq!(
        runtime.submit_command(nav_5000()).await,
        Err(CommandRejection::Throttled)
    );

    assert_eq!(
        runtime.clear_lockdown(Role::Operator).await,
        Err(CommandRejection::Unauthorized)
    );
    runtime.clear_lockdown(Role::Admin).await.unwrap();

    clock.advance(2_000 * MS);
    assert!(runtime.submit_command(nav_5000()).await.is_ok());
}
