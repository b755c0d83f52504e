//! Single-node bring-up rig
//!
//! Boots the runtime with simulated sensors, pushes a burst of
//! navigation commands through the gateway and ledger, and prints the
//! resulting chain and fusion state. Useful for eyeballing the whole
//! stack without hardware attached.

use std::time::Duration;

use anyhow::Result;

use sentinel_core::{
    CommandEnvelope, CommandPayload, NavigationParams, Role, SensorKind, SystemConfig,
};
use sentinel_fusion::SignatureLibrary;
use sentinel_hil::{HilInterface, ImuInterface, SimulatedSensor};
use sentinel_runtime::{init_telemetry, Runtime};

#[tokio::main]
async fn main() -> Result<()> {
    let config = SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    };
    init_telemetry(&config);

    let runtime = Runtime::builder(config)
        .signature_library(SignatureLibrary::standard())
        .build()?;
    let tasks = runtime.start();

    // Bring up three simulated links.
    let mut drivers = Vec::new();
    for interface in sensors() {
        let (driver, forwarder) = runtime
            .attach_interface(interface)
            .await
            .map_err(|err| anyhow::anyhow!("interface bring-up failed: {err}"))?;
        drivers.push((driver, forwarder));
    }

    // Operator traffic: a slow climb.
    for step in 0..10 {
        runtime
            .submit_command(CommandEnvelope::new(
                "sim-operator",
                0,
                Role::Operator,
                CommandPayload::Navigation(NavigationParams {
                    altitude_m: Some(1_000.0 + step as f64 * 50.0),
                    speed_mps: Some(80.0),
                    ..Default::default()
                }),
            ))
            .await
            .map_err(|err| anyhow::anyhow!("command rejected: {err}"))?;
        tokio::time::sleep(Duration::from_millis(60)).await;
    }

    tokio::time::sleep(Duration::from_millis(500)).await;

    println!("chain length:    {}", runtime.chain_length().await);
    println!("tip digest:      {}", runtime.tip_hash().await);
    println!("commands sealed: {}", runtime.command_history_len().await);
    println!("audit records:   {}", runtime.audit_len());
    println!(
        "integrity:       {}",
        if runtime.verify_system_integrity().await {
            "ok"
        } else {
            "BROKEN"
        }
    );
    if let Some(state) = runtime.fusion_cycle().await {
        println!(
            "fused state:     pos=({:.1}, {:.1}, {:.1}) confidence={:.2}",
            state.position.x, state.position.y, state.position.z, state.fusion_confidence
        );
    }

    for (driver, forwarder) in drivers {
        driver.stop().await;
        let _ = forwarder.await;
    }
    runtime.shutdown(tasks).await;
    Ok(())
}

fn sensors() -> Vec<Box<dyn HilInterface + Send>> {
    vec![
        Box::new(SimulatedSensor::new("lidar0", SensorKind::Lidar, 50.0, 11)),
        Box::new(SimulatedSensor::new("mag0", SensorKind::Magnetic, 50.0, 12)),
        Box::new(ImuInterface::new("imu0", 200.0, 13)),
    ]
}
