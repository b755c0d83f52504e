//! Signed command transactions

use std::time::Duration;

use serde::{Deserialize, Serialize};

use sentinel_core::clock::Nanos;
use sentinel_core::CommandPayload;

use crate::encoding::{CanonicalEncode, CanonicalMap};
use crate::hash::TxHash;
use crate::signature::CommandSigner;

/// Pending transactions older than this are discarded unbatched.
pub const TX_TTL: Duration = Duration::from_secs(60);

/// One signed command awaiting (or sealed into) a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub timestamp_ns: Nanos,
    pub source_id: String,
    pub command: CommandPayload,
    /// Hex-encoded Ed25519 signature over [`Transaction::message_bytes`].
    pub signature: String,
}

impl Transaction {
    /// Build and sign in one step.
    pub fn signed(command: CommandPayload, signer: &CommandSigner, timestamp_ns: Nanos) -> Self {
        let mut tx = Self {
            timestamp_ns,
            source_id: signer.source_id().to_string(),
            command,
            signature: String::new(),
        };
        tx.signature = signer.sign(&tx.message_bytes());
        tx
    }

    /// The signed message: canonical command bytes, then timestamp, then
    /// source id.
    pub fn message_bytes(&self) -> Vec<u8> {
        let mut map = CanonicalMap::new();
        map.put_bytes("command", self.command.canonical_bytes());
        map.put_u64("timestamp_ns", self.timestamp_ns);
        map.put_str("source_id", &self.source_id);
        map.finish()
    }

    /// Unique key: digest of the canonical message.
    pub fn tx_hash(&self) -> TxHash {
        TxHash::of(&self.message_bytes())
    }

    pub fn is_expired(&self, now_ns: Nanos) -> bool {
        now_ns.saturating_sub(self.timestamp_ns) > TX_TTL.as_nanos() as u64
    }
}

impl CanonicalEncode for Transaction {
    fn canonical_bytes(&self) -> Vec<u8> {
        let mut map = CanonicalMap::new();
        map.put_bytes("command", self.command.canonical_bytes());
        map.put_u64("timestamp_ns", self.timestamp_ns);
        map.put_str("source_id", &self.source_id);
        map.put_str("signature", &self.signature);
        map.finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sentinel_core::{NavigationParams, SystemAction};

    fn signer() -> CommandSigner {
        CommandSigner::from_seed("node-a", 11)
    }

    fn nav(altitude: f64) -> CommandPayload {
        CommandPayload::Navigation(NavigationParams {
            altitude_m: Some(altitude),
            ..Default::default()
        })
    }

    #[test]
    fn test_tx_hash_is_stable() {
        let tx = Transaction::signed(nav(800.0), &signer(), 1_000);
        assert_eq!(tx.tx_hash(), tx.tx_hash());
    }

    #[test]
    fn test_tx_hash_distinguishes_fields() {
        let s = signer();
        let base = Transaction::signed(nav(800.0), &s, 1_000);
        assert_ne!(
            base.tx_hash(),
            Transaction::signed(nav(801.0), &s, 1_000).tx_hash()
        );
        assert_ne!(
            base.tx_hash(),
            Transaction::signed(nav(800.0), &s, 1_001).tx_hash()
        );
        assert_ne!(
            base.tx_hash(),
            Transaction::signed(
                CommandPayload::System {
                    action: SystemAction::Diagnose
                },
                &s,
                1_000
            )
            .tx_hash()
        );
    }

    #[test]
    fn test_ttl_expiry() {
        let tx = Transaction::signed(nav(800.0), &signer(), 0);
        let ttl = TX_TTL.as_nanos() as u64;
        assert!(!tx.is_expired(ttl));
        assert!(tx.is_expired(ttl + 1));
    }
}
