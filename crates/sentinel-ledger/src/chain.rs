//! Blocks and the hash chain
//!
//! A block seals a batch of transactions behind a proof-of-work digest.
//! Validation is always against the block's own predecessor, so the same
//! code path serves both live appends and candidate chains offered
//! during consensus.

use std::collections::HashSet;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use sentinel_core::clock::Nanos;

use crate::encoding::CanonicalEncode;
use crate::hash::{leading_zero_bits, BlockHash, TxHash};
use crate::signature::KeyRegistry;
use crate::transaction::Transaction;

pub const GENESIS_INDEX: u64 = 0;

/// Deadline polling stride for the mining loop.
const MINE_CHECK_STRIDE: u64 = 4096;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("block {0}: recorded hash does not match recomputation")]
    HashMismatch(u64),
    #[error("block {index}: {got} leading zero bits, {want} required")]
    DifficultyNotMet { index: u64, got: u32, want: u32 },
    #[error("block {0}: prev_hash does not reference predecessor")]
    BrokenLink(u64),
    #[error("block {got} follows block {prev}")]
    IndexGap { prev: u64, got: u64 },
    #[error("block {0}: invalid transaction signature")]
    BadSignature(u64),
    #[error("block {0}: transaction already present in chain")]
    DuplicateTransaction(u64),
    #[error("malformed genesis block")]
    BadGenesis,
    #[error("candidate chain is empty")]
    Empty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub index: u64,
    pub timestamp_ns: Nanos,
    pub prev_hash: BlockHash,
    pub transactions: Vec<Transaction>,
    pub nonce: u64,
    pub hash: BlockHash,
}

impl Block {
    /// The genesis block: index 0, all-zero parent, no transactions.
    pub fn genesis() -> Self {
        let mut block = Self {
            index: GENESIS_INDEX,
            timestamp_ns: 0,
            prev_hash: BlockHash::ZERO,
            transactions: Vec::new(),
            nonce: 0,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Unsealed candidate on top of `prev`.
    pub fn candidate(prev: &Block, timestamp_ns: Nanos, transactions: Vec<Transaction>) -> Self {
        let mut block = Self {
            index: prev.index + 1,
            timestamp_ns,
            prev_hash: prev.hash,
            transactions,
            nonce: 0,
            hash: BlockHash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// `H(index || timestamp || prev_hash || canonical(transactions) || nonce)`
    pub fn compute_hash(&self) -> BlockHash {
        let mut buf = Vec::new();
        buf.extend_from_slice(&self.index.to_be_bytes());
        buf.extend_from_slice(&self.timestamp_ns.to_be_bytes());
        buf.extend_from_slice(self.prev_hash.as_bytes());
        for tx in &self.transactions {
            let bytes = tx.canonical_bytes();
            buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
            buf.extend_from_slice(&bytes);
        }
        buf.extend_from_slice(&self.nonce.to_be_bytes());
        BlockHash::of(&buf)
    }

    pub fn meets_difficulty(&self, difficulty_bits: u8) -> bool {
        leading_zero_bits(self.hash.as_bytes()) >= u32::from(difficulty_bits)
    }

    /// Proof-of-work: increment the nonce until the digest carries the
    /// required leading zero bits or the deadline passes. Returns `None`
    /// on an exhausted budget; the caller keeps its pending pool.
    pub fn seal(mut self, difficulty_bits: u8, deadline: Instant) -> Option<Self> {
        loop {
            self.hash = self.compute_hash();
            if self.meets_difficulty(difficulty_bits) {
                return Some(self);
            }
            self.nonce = self.nonce.wrapping_add(1);
            if self.nonce % MINE_CHECK_STRIDE == 0 && Instant::now() >= deadline {
                return None;
            }
        }
    }

    /// Validate against the block's own predecessor.
    pub fn validate_against(
        &self,
        prev: &Block,
        difficulty_bits: u8,
        keys: &KeyRegistry,
        seen: &HashSet<TxHash>,
    ) -> Result<(), ChainError> {
        if self.compute_hash() != self.hash {
            return Err(ChainError::HashMismatch(self.index));
        }
        let got = leading_zero_bits(self.hash.as_bytes());
        if got < u32::from(difficulty_bits) {
            return Err(ChainError::DifficultyNotMet {
                index: self.index,
                got,
                want: u32::from(difficulty_bits),
            });
        }
        if self.prev_hash != prev.hash {
            return Err(ChainError::BrokenLink(self.index));
        }
        if self.index != prev.index + 1 {
            return Err(ChainError::IndexGap {
                prev: prev.index,
                got: self.index,
            });
        }

        let mut in_block = HashSet::new();
        for tx in &self.transactions {
            if !keys.verify_signature_only(tx) {
                return Err(ChainError::BadSignature(self.index));
            }
            let key = tx.tx_hash();
            if seen.contains(&key) || !in_block.insert(key) {
                return Err(ChainError::DuplicateTransaction(self.index));
            }
        }
        Ok(())
    }
}

/// Totally ordered block sequence rooted at genesis. Owns the duplicate
/// index used for admission checks.
#[derive(Debug, Clone)]
pub struct Chain {
    blocks: Vec<Block>,
    seen: HashSet<TxHash>,
}

impl Chain {
    pub fn new() -> Self {
        Self {
            blocks: vec![Block::genesis()],
            seen: HashSet::new(),
        }
    }

    /// Build a chain from raw blocks, validating every link. Used for
    /// consensus candidates and persisted reloads.
    pub fn try_from_blocks(
        blocks: Vec<Block>,
        difficulty_bits: u8,
        keys: &KeyRegistry,
    ) -> Result<Self, ChainError> {
        let Some(genesis) = blocks.first() else {
            return Err(ChainError::Empty);
        };
        if genesis.index != GENESIS_INDEX
            || genesis.prev_hash != BlockHash::ZERO
            || genesis.compute_hash() != genesis.hash
        {
            return Err(ChainError::BadGenesis);
        }

        let mut seen = HashSet::new();
        for window in blocks.windows(2) {
            window[1].validate_against(&window[0], difficulty_bits, keys, &seen)?;
            seen.extend(window[1].transactions.iter().map(Transaction::tx_hash));
        }
        Ok(Self { blocks, seen })
    }

    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    pub fn tip(&self) -> &Block {
        self.blocks.last().expect("chain always has genesis")
    }

    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    pub fn contains_tx(&self, hash: &TxHash) -> bool {
        self.seen.contains(hash)
    }

    /// Validate a sealed block against the tip and append it.
    pub fn append(
        &mut self,
        block: Block,
        difficulty_bits: u8,
        keys: &KeyRegistry,
    ) -> Result<(), ChainError> {
        block.validate_against(self.tip(), difficulty_bits, keys, &self.seen)?;
        self.seen
            .extend(block.transactions.iter().map(Transaction::tx_hash));
        self.blocks.push(block);
        Ok(())
    }

    /// Re-validate every link from genesis.
    pub fn validate_all(&self, difficulty_bits: u8, keys: &KeyRegistry) -> Result<(), ChainError> {
        // Rebuild the duplicate index from scratch; the cached one is an
        // optimization, not a source of truth.
        let mut seen = HashSet::new();
        for window in self.blocks.windows(2) {
            window[1].validate_against(&window[0], difficulty_bits, keys, &seen)?;
            seen.extend(window[1].transactions.iter().map(Transaction::tx_hash));
        }
        Ok(())
    }

    /// Every admitted transaction in chain order, genesis excluded.
    pub fn history(&self) -> impl Iterator<Item = &Transaction> {
        self.blocks.iter().skip(1).flat_map(|b| b.transactions.iter())
    }
}

impl Default for Chain {
    fn default() -> Self {
        Self::new()
    }
}
