//! # Sentinel Ledger
//!
//! Append-only hash-chained command log with proof-of-work sealing,
//! Ed25519 signature verification, and longest-valid-chain consensus
//! over an abstract peer network.
//!
//! ## Design Goals
//! - The ledger exclusively owns its chain and pending pool; no other
//!   component holds a mutable reference.
//! - Canonical byte encoding for everything that is hashed or signed:
//!   keys sorted lexicographically, integers big-endian, floats as IEEE
//!   bit patterns. Equal values always encode identically.
//! - A candidate chain is validated in full against its *own*
//!   predecessors, then swapped in atomically. The chain is never
//!   observable in a torn state.
//! - Mining is budgeted (5 s); an exhausted budget keeps the pending
//!   pool intact and is never fatal.

mod chain;
mod consensus;
mod encoding;
mod hash;
mod ledger;
mod mesh;
mod persist;
mod signature;
mod transaction;
mod wire;

pub use chain::{Block, Chain, ChainError, GENESIS_INDEX};
pub use consensus::{select_candidate, PeerNetwork, StaticPeerSet};
pub use encoding::{CanonicalEncode, CanonicalMap};
pub use hash::{leading_zero_bits, BlockHash, TxHash};
pub use ledger::{
    CommandLedger, LedgerError, SubmitOutcome, BATCH_THRESHOLD, MAX_PENDING, MINING_BUDGET,
    TX_TTL,
};
pub use mesh::{MeshHub, MeshPeer};
pub use persist::{load_chain, LedgerStore, PersistError};
pub use signature::{CommandSigner, KeyRegistry, SIGNATURE_REPLAY_WINDOW};
pub use transaction::Transaction;
pub use wire::{decode_block, encode_block, WireError};
