//! Audit trail
//!
//! Hash-chained record of every high-priority event the controller
//! observed. Verification recomputes the chain; any edit or reorder of
//! past records breaks the digests from that point on.

use sha2::{Digest, Sha256};

use sentinel_core::clock::Nanos;
use sentinel_core::{Event, EventKind};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditRecord {
    pub seq: u64,
    pub timestamp_ns: Nanos,
    pub kind: EventKind,
    pub source_id: String,
    pub digest: [u8; 32],
    pub prev_digest: [u8; 32],
}

#[derive(Default)]
pub struct AuditTrail {
    records: Vec<AuditRecord>,
}

impl AuditTrail {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[AuditRecord] {
        &self.records
    }

    /// Append one observed event.
    pub fn log_event(&mut self, event: &Event) {
        let prev_digest = self
            .records
            .last()
            .map_or([0u8; 32], |record| record.digest);
        let seq = self.records.len() as u64;
        let digest = Self::digest(seq, event, &prev_digest);
        self.records.push(AuditRecord {
            seq,
            timestamp_ns: event.timestamp_ns,
            kind: event.kind,
            source_id: event.source_id.clone(),
            digest,
            prev_digest,
        });
    }

    /// Recompute every digest; true iff the trail is intact.
    pub fn verify(&self) -> bool {
        let mut prev = [0u8; 32];
        for (i, record) in self.records.iter().enumerate() {
            if record.seq != i as u64 || record.prev_digest != prev {
                return false;
            }
            let recomputed = Self::chain_digest(
                record.seq,
                record.timestamp_ns,
                record.kind,
                &record.source_id,
                &prev,
            );
            if recomputed != record.digest {
                return false;
            }
            prev = record.digest;
        }
        true
    }

    fn digest(seq: u64, event: &Event, prev: &[u8; 32]) -> [u8; 32] {
        Self::chain_digest(seq, event.timestamp_ns, event.kind, &event.source_id, prev)
    }

    fn chain_digest(
        seq: u64,
        timestamp_ns: Nanos,
        kind: EventKind,
        source_id: &str,
        prev: &[u8; 32],
    ) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(prev);
        hasher.update(seq.to_be_bytes());
        hasher.update(timestamp_ns.to_be_bytes());
        hasher.update(format!("{kind:?}").as_bytes());
        hasher.update(source_id.as_bytes());
        hasher.finalize().into()
    }
}
