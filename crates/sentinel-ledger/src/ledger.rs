//! Command ledger
//!
//! Admission (pending pool), budgeted mining, and the consensus swap.
//! Mining can run inline or be split into prepare/commit so the heavy
//! proof-of-work loop moves onto the worker pool.

use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use sentinel_core::{
    Clock, ErrorCategory, ErrorSeverity, Event, EventPayload, EventSink, Priority,
};

use crate::chain::{Block, Chain, ChainError};
use crate::signature::KeyRegistry;
use crate::transaction::Transaction;

pub use crate::transaction::TX_TTL;

/// Pending-pool capacity.
pub const MAX_PENDING: usize = 100;
/// Pool size at which a batch becomes ready for sealing.
pub const BATCH_THRESHOLD: usize = 10;
/// Proof-of-work time budget per block.
pub const MINING_BUDGET: Duration = Duration::from_secs(5);

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LedgerError {
    #[error("pending pool at capacity ({MAX_PENDING})")]
    PoolFull,
    #[error("signature invalid or outside the replay window")]
    SignatureInvalid,
    #[error("transaction already admitted")]
    Duplicate,
}

/// Successful admission result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmitOutcome {
    /// Pool reached [`BATCH_THRESHOLD`]; the caller should schedule
    /// block creation.
    pub batch_ready: bool,
}

pub struct CommandLedger {
    chain: Chain,
    pending: Vec<Transaction>,
    difficulty_bits: u8,
    keys: KeyRegistry,
    clock: Arc<dyn Clock>,
    sink: Arc<dyn EventSink>,
}

impl CommandLedger {
    pub fn new(
        difficulty_bits: u8,
        keys: KeyRegistry,
        clock: Arc<dyn Clock>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            chain: Chain::new(),
            pending: Vec::new(),
            difficulty_bits,
            keys,
            clock,
            sink,
        }
    }

    /// Restore from a previously validated chain (see `persist`).
    pub fn with_chain(mut self, chain: Chain) -> Self {
        self.chain = chain;
        self
    }

    pub fn chain(&self) -> &Chain {
        &self.chain
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    pub fn difficulty_bits(&self) -> u8 {
        self.difficulty_bits
    }

    pub fn keys(&self) -> &KeyRegistry {
        &self.keys
    }

    /// Admit one signed transaction into the pending pool.
    ///
    /// Per-source FIFO is preserved by append order; the cross-source
    /// total order is fixed at block assembly.
    pub fn submit(&mut self, tx: Transaction) -> Result<SubmitOutcome, LedgerError> {
        let now = self.clock.now_ns();
        self.purge_expired(now);

        if self.pending.len() >= MAX_PENDING {
            return Err(LedgerError::PoolFull);
        }
        if !self.keys.verify(&tx, now) {
            return Err(LedgerError::SignatureInvalid);
        }
        let key = tx.tx_hash();
        if self.chain.contains_tx(&key) || self.pending.iter().any(|p| p.tx_hash() == key) {
            return Err(LedgerError::Duplicate);
        }

        self.pending.push(tx);
        Ok(SubmitOutcome {
            batch_ready: self.pending.len() >= BATCH_THRESHOLD,
        })
    }

    /// Seal the pending pool into a block inline. Returns `None` when
    /// there is nothing to seal or the mining budget is exhausted (the
    /// pool is retained either way).
    pub fn mine_block(&mut self) -> Option<Block> {
        let candidate = self.prepare_candidate()?;
        let deadline = Instant::now() + MINING_BUDGET;
        match candidate.seal(self.difficulty_bits, deadline) {
            Some(sealed) => self.commit_sealed(sealed).ok(),
            None => {
                self.report_budget_exhausted();
                None
            }
        }
    }

    /// First half of offloaded mining: snapshot the pending pool into an
    /// unsealed candidate. The pool is untouched until commit.
    pub fn prepare_candidate(&mut self) -> Option<Block> {
        self.purge_expired(self.clock.now_ns());
        if self.pending.is_empty() {
            return None;
        }
        Some(Block::candidate(
            self.chain.tip(),
            self.clock.now_ns(),
            self.pending.clone(),
        ))
    }

    /// Second half of offloaded mining: validate and append a sealed
    /// block, then drop its transactions from the pool.
    pub fn commit_sealed(&mut self, block: Block) -> Result<Block, ChainError> {
        self.chain
            .append(block.clone(), self.difficulty_bits, &self.keys)?;
        self.pending
            .retain(|tx| !block.transactions.iter().any(|b| b.tx_hash() == tx.tx_hash()));

        info!(
            index = block.index,
            transactions = block.transactions.len(),
            hash = %block.hash,
            "block sealed"
        );
        self.sink.emit(Event::new(
            "command-ledger",
            self.clock.now_ns(),
            Priority::High,
            EventPayload::BlockCreated {
                index: block.index,
                block_hash: block.hash.to_hex(),
                transaction_count: block.transactions.len(),
            },
        ));
        Ok(block)
    }

    /// Report an exhausted mining budget. Non-fatal: the pool is kept
    /// and the caller retries on the next batch trigger.
    pub fn report_budget_exhausted(&self) {
        warn!(pending = self.pending.len(), "mining budget exhausted");
        self.sink.emit(Event::new(
            "command-ledger",
            self.clock.now_ns(),
            Priority::Normal,
            EventPayload::Error {
                message: "mining budget exhausted; block retained for retry".into(),
                category: ErrorCategory::Blockchain,
                severity: ErrorSeverity::Warning,
                origin_component: Some("command-ledger".into()),
            },
        ));
    }

    /// Longest-valid-chain consensus swap.
    ///
    /// The candidate is accepted iff it validates in full against its own
    /// predecessors, is strictly longer than the local chain, and shares
    /// the local genesis. Acceptance replaces the chain atomically.
    pub fn consensus_swap(&mut self, blocks: Vec<Block>) -> bool {
        let candidate = match Chain::try_from_blocks(blocks, self.difficulty_bits, &self.keys) {
            Ok(chain) => chain,
            Err(err) => {
                warn!(%err, "consensus candidate rejected");
                self.emit_consensus_failure();
                return false;
            }
        };

        if candidate.len() <= self.chain.len() {
            debug!(
                candidate = candidate.len(),
                local = self.chain.len(),
                "consensus candidate not longer than local chain"
            );
            self.emit_consensus_failure();
            return false;
        }
        if candidate.genesis().hash != self.chain.genesis().hash {
            warn!("consensus candidate roots at a foreign genesis");
            self.emit_consensus_failure();
            return false;
        }

        // Atomic replacement; pending transactions already sealed by the
        // candidate are dropped from the pool.
        self.pending.retain(|tx| !candidate.contains_tx(&tx.tx_hash()));
        let new_len = candidate.len();
        self.chain = candidate;
        info!(chain_length = new_len, "consensus swap accepted");
        true
    }

    /// Full self-check used by the consensus monitor.
    pub fn validate_self(&self) -> Result<(), ChainError> {
        self.chain.validate_all(self.difficulty_bits, &self.keys)
    }

    /// Every admitted transaction in chain order, genesis excluded.
    pub fn history(&self) -> impl Iterator<Item = &Transaction> {
        self.chain.history()
    }

    fn purge_expired(&mut self, now_ns: u64) {
        let before = self.pending.len();
        self.pending.retain(|tx| !tx.is_expired(now_ns));
        let dropped = before - self.pending.len();
        if dropped > 0 {
            debug!(dropped, "expired pending transactions discarded");
        }
    }

    fn emit_consensus_failure(&self) {
        self.sink.emit(Event::new(
            "command-ledger",
            self.clock.now_ns(),
            Priority::Critical,
            EventPayload::ConsensusFailure {
                chain_length: self.chain.len(),
            },
        ));
    }
}
