//! Active countermeasure set
//!
//! Mitigations expire after a per-kind TTL unless renewed by further
//! anomalies. `CommandLockdown` never expires on its own: it is cleared
//! only by an explicit Admin action arriving over the out-of-band
//! channel.

use std::collections::BTreeMap;
use std::time::Duration;

use tracing::info;

use sentinel_core::clock::Nanos;
use sentinel_core::Countermeasure;

/// Kinds activated together on a severity ≥ 8 anomaly.
pub const LOCKDOWN_KINDS: [Countermeasure; 2] =
    [Countermeasure::CommandLockdown, Countermeasure::EmergencyBeacon];

fn ttl(kind: Countermeasure) -> Option<Duration> {
    match kind {
        // Cleared explicitly, never by the clock.
        Countermeasure::CommandLockdown => None,
        Countermeasure::EmergencyBeacon => Some(Duration::from_secs(300)),
        Countermeasure::EnhancedValidation => Some(Duration::from_secs(30)),
        Countermeasure::ParameterLockdown => Some(Duration::from_secs(60)),
        Countermeasure::FrequencyHop => Some(Duration::from_secs(120)),
    }
}

/// Currently active mitigations with their expiry times.
#[derive(Debug, Default)]
pub struct CountermeasureSet {
    active: BTreeMap<Countermeasure, Option<Nanos>>,
}

impl CountermeasureSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Activate or renew a mitigation. Returns true when this is a fresh
    /// activation rather than a renewal.
    pub fn activate(&mut self, kind: Countermeasure, now_ns: Nanos) -> bool {
        let expires = ttl(kind).map(|d| now_ns + d.as_nanos() as u64);
        let fresh = !self.active.contains_key(&kind);
        self.active.insert(kind, expires);
        if fresh {
            info!(?kind, "countermeasure activated");
        }
        fresh
    }

    /// Drop expired mitigations.
    pub fn expire(&mut self, now_ns: Nanos) {
        self.active
            .retain(|_, expires| expires.map_or(true, |at| at > now_ns));
    }

    pub fn is_active(&self, kind: Countermeasure) -> bool {
        self.active.contains_key(&kind)
    }

    /// Explicit lockdown clear; also retires the paired beacon.
    pub fn clear_lockdown(&mut self) {
        self.active.remove(&Countermeasure::CommandLockdown);
        self.active.remove(&Countermeasure::EmergencyBeacon);
        info!("command lockdown cleared");
    }

    pub fn snapshot(&self) -> Vec<Countermeasure> {
        self.active.keys().copied().collect()
    }
}
