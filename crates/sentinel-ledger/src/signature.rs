//! Command signing
//!
//! Ed25519 over the canonical transaction message, with replay
//! protection from the transaction timestamp window. The key registry
//! maps source ids to verifying keys; key distribution itself is outside
//! this crate.

use std::collections::BTreeMap;
use std::time::Duration;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::StdRng;
use rand::SeedableRng;

use sentinel_core::clock::Nanos;

use crate::transaction::Transaction;

/// Transactions timestamped outside this window of "now" fail
/// verification, bounding replay.
pub const SIGNATURE_REPLAY_WINDOW: Duration = Duration::from_secs(60);

/// Holder of one source's signing key.
pub struct CommandSigner {
    source_id: String,
    key: SigningKey,
}

impl CommandSigner {
    /// Deterministic key from a seed. Production nodes derive the seed
    /// from provisioned key material; tests pick fixed seeds.
    pub fn from_seed(source_id: impl Into<String>, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        Self {
            source_id: source_id.into(),
            key: SigningKey::generate(&mut rng),
        }
    }

    pub fn source_id(&self) -> &str {
        &self.source_id
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.key.verifying_key()
    }

    /// Hex-encoded Ed25519 signature over the message bytes.
    pub fn sign(&self, message: &[u8]) -> String {
        hex::encode(self.key.sign(message).to_bytes())
    }
}

/// Source-id to verifying-key table used at admission.
#[derive(Default)]
pub struct KeyRegistry {
    keys: BTreeMap<String, VerifyingKey>,
}

impl KeyRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enroll(&mut self, source_id: impl Into<String>, key: VerifyingKey) {
        self.keys.insert(source_id.into(), key);
    }

    pub fn enroll_signer(&mut self, signer: &CommandSigner) {
        self.enroll(signer.source_id().to_string(), signer.verifying_key());
    }

    /// Verify signature and replay window.
    ///
    /// `now_ns` is the admission time; the transaction timestamp must be
    /// within [`SIGNATURE_REPLAY_WINDOW`] of it in either direction.
    pub fn verify(&self, tx: &Transaction, now_ns: Nanos) -> bool {
        let window = SIGNATURE_REPLAY_WINDOW.as_nanos() as u64;
        if now_ns.abs_diff(tx.timestamp_ns) > window {
            return false;
        }
        self.verify_signature_only(tx)
    }

    /// Signature check without the freshness window; used when
    /// re-validating historical blocks.
    pub fn verify_signature_only(&self, tx: &Transaction) -> bool {
        let Some(key) = self.keys.get(&tx.source_id) else {
            return false;
        };
        let Ok(raw) = hex::decode(&tx.signature) else {
            return false;
        };
        let Ok(raw) = <[u8; 64]>::try_from(raw) else {
            return false;
        };
        let signature = Signature::from_bytes(&raw);
        key.verify(&tx.message_bytes(), &signature).is_ok()
    }
}
