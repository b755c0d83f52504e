//! Whole-runtime smoke tests: streaming into fusion, consensus
//! recovery from peers, and ledger persistence across restarts.

use std::sync::Arc;

use sentinel_core::{
    Clock, CommandEnvelope, CommandPayload, EventKind, ManualClock, NavigationParams, Role,
    SystemConfig, SystemMode,
};
use sentinel_fusion::{Pose, SensorReading, SensorSample};
use sentinel_hil::{HilInterface, SimulatedSensor};
use sentinel_ledger::{
    CommandLedger, CommandSigner, KeyRegistry, LedgerStore, StaticPeerSet, Transaction,
};
use sentinel_runtime::Runtime;

use nalgebra::Vector3;
use sentinel_core::event::NullSink;
use sentinel_core::SensorKind;

const MS: u64 = 1_000_000;

fn config() -> SystemConfig {
    SystemConfig {
        difficulty_bits: 8,
        ..Default::default()
    }
}

fn nav(altitude: f64) -> CommandEnvelope {
    CommandEnvelope::new(
        "operator-1",
        0,
        Role::Operator,
        CommandPayload::Navigation(NavigationParams {
            altitude_m: Some(altitude),
            ..Default::default()
        }),
    )
}

#[tokio::test]
async fn hil_stream_feeds_fusion() {
    let runtime = Runtime::builder(config()).build().unwrap();

    let mut lidar = Box::new(SimulatedSensor::new("lidar0", SensorKind::Lidar, 200.0, 7));
    let _ = lidar.connect().await;
    let (driver, forwarder) = runtime.attach_interface(lidar).await.unwrap();

    // Let the producer run briefly, then stop it.
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
    driver.stop().await;
    forwarder.await.unwrap();

    // Complement the lidar stream with magnetic samples so the cycle
    // has a sensor pair, then fuse.
    for i in 0..5u64 {
        runtime
            .ingest_sample(SensorSample::new(
                "mag0",
                i * 5 * MS,
                SensorReading::Magnetic {
                    field_t: Vector3::new(4.8e-5, 0.0, 0.0),
                    gradient_t_m: 1e-7,
                },
                Pose::default(),
                0.95,
            ))
            .await;
    }
    let state = runtime.fusion_cycle().await;
    assert!(state.is_some());
}

/// Consensus recovery succeeds when a peer offers a longer valid chain;
/// the swap is atomic and dispatch stays unpaused.
#[tokio::test]
async fn consensus_recovery_from_peers() {
    // A peer with a longer history sharing this node's key material and
    // genesis. The runtime's default signer seed is fixed, so enrolling
    // the same seed reproduces its verifying key.
    let signer = CommandSigner::from_seed("sentinel-node", 0x53_45_4e_54);
    let mut keys = KeyRegistry::new();
    keys.enroll_signer(&signer);
    let peer_clock = ManualClock::new(1_000);
    let mut peer_ledger = CommandLedger::new(8, keys, peer_clock.clone(), Arc::new(NullSink));
    for i in 0..6 {
        peer_clock.advance_ms(1);
        peer_ledger
            .submit(Transaction::signed(
                CommandPayload::Navigation(NavigationParams {
                    altitude_m: Some(2_000.0 + i as f64),
                    ..Default::default()
                }),
                &signer,
                peer_clock.now_ns(),
            ))
            .unwrap();
        if i % 3 == 2 {
            peer_ledger.mine_block().unwrap();
        }
    }
    assert_eq!(peer_ledger.chain().len(), 3);

    let peers = Arc::new(StaticPeerSet::new());
    peers.offer_chain(peer_ledger.chain().blocks().to_vec());

    let runtime = Runtime::builder(config())
        .peers(peers)
        .build()
        .unwrap();

    assert_eq!(runtime.chain_length().await, 1);
    assert!(runtime.recover_consensus().await);
    assert_eq!(runtime.chain_length().await, 3);
    assert_eq!(runtime.command_history_len().await, 6);
    assert!(!runtime.dispatch_paused().await);
    assert_ne!(runtime.mode(), SystemMode::Emergency);
}

/// With no reachable peers, recovery retries under the network backoff
/// policy, then fails into the emergency protocol and actuator dispatch
/// pauses.
#[tokio::test(start_paused = true)]
async fn consensus_recovery_failure_pauses_dispatch() {
    let runtime = Runtime::builder(config()).build().unwrap();
    assert!(!runtime.recover_consensus().await);
    assert_eq!(runtime.mode(), SystemMode::Emergency);
    assert!(runtime.dispatch_paused().await);
}

/// The persisted ledger reloads and validates across a restart.
#[tokio::test]
async fn ledger_persists_across_restart() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.log");

    let clock = ManualClock::new(1_000);
    {
        let runtime = Runtime::builder(config())
            .clock(clock.clone())
            .ledger_store(LedgerStore::new(&path))
            .build()
            .unwrap();
        for i in 0..10 {
            clock.advance_ms(100);
            runtime.submit_command(nav(1_000.0 + i as f64)).await.unwrap();
        }
        assert_eq!(runtime.chain_length().await, 2);
    }

    // Reload with the same node key and verify the stored blocks.
    let signer = CommandSigner::from_seed("sentinel-node", 0x53_45_4e_54);
    let mut keys = KeyRegistry::new();
    keys.enroll_signer(&signer);
    let chain = sentinel_ledger::load_chain(&path, 8, &keys).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(chain.history().count(), 10);
}

/// End-to-end event flow: commands seal a block, the pump delivers the
/// block event to subscribers, and integrity holds.
#[tokio::test]
async fn full_stack_event_flow() {
    let clock = ManualClock::new(1_000);
    let runtime = Runtime::builder(config()).clock(clock.clone()).build().unwrap();

    let block_events = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = block_events.clone();
    runtime
        .events()
        .subscribe(EventKind::BlockCreated, move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        });

    let dispatched = Arc::new(std::sync::atomic::AtomicU32::new(0));
    let counter = dispatched.clone();
    runtime
        .register_dispatch_handler(sentinel_core::CommandKind::Navigation, move |_| {
            counter.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        })
        .await;

    let tasks = runtime.start();
    for i in 0..10 {
        clock.advance_ms(100);
        runtime.submit_command(nav(1_000.0 + i as f64)).await.unwrap();
    }
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;

    assert_eq!(block_events.load(std::sync::atomic::Ordering::SeqCst), 1);
    assert_eq!(dispatched.load(std::sync::atomic::Ordering::SeqCst), 10);
    assert!(runtime.verify_system_integrity().await);

    runtime.shutdown(tasks).await;
}
