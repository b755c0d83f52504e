//! Peer network abstraction and candidate selection
//!
//! The radio mesh itself lives outside this crate; consensus only needs
//! a way to collect candidate chains and announce sealed blocks. The
//! agreement ratio is computed over responding peers, grouped by tip.

use std::sync::Mutex;

use async_trait::async_trait;

use crate::chain::Block;

/// Abstract view of the cooperating nodes.
#[async_trait]
pub trait PeerNetwork: Send + Sync {
    /// Candidate chains from every reachable peer. Implementations
    /// enforce their own per-peer timeout (10 s contract).
    async fn collect_chains(&self) -> Vec<Vec<Block>>;

    /// Announce a freshly sealed block.
    async fn broadcast_block(&self, block: &Block);
}

/// Fixed in-process peer set for tests and single-node bring-up.
#[derive(Default)]
pub struct StaticPeerSet {
    chains: Mutex<Vec<Vec<Block>>>,
    broadcasts: Mutex<Vec<Block>>,
}

impl StaticPeerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the chain one simulated peer will answer with.
    pub fn offer_chain(&self, chain: Vec<Block>) {
        self.chains.lock().expect("peer set poisoned").push(chain);
    }

    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.lock().expect("peer set poisoned").len()
    }
}

#[async_trait]
impl PeerNetwork for StaticPeerSet {
    async fn collect_chains(&self) -> Vec<Vec<Block>> {
        self.chains.lock().expect("peer set poisoned").clone()
    }

    async fn broadcast_block(&self, block: &Block) {
        self.broadcasts
            .lock()
            .expect("peer set poisoned")
            .push(block.clone());
    }
}

/// Pick the swap candidate: group responses by tip hash, keep groups
/// whose support ratio meets `threshold`, and return the longest chain
/// among them. Full validation happens at the swap itself.
pub fn select_candidate(chains: Vec<Vec<Block>>, threshold: f64) -> Option<Vec<Block>> {
    let responding = chains.iter().filter(|c| !c.is_empty()).count();
    if responding == 0 {
        return None;
    }

    let mut support: Vec<(Vec<Block>, usize)> = Vec::new();
    for chain in chains.into_iter().filter(|c| !c.is_empty()) {
        let tip = chain.last().expect("non-empty").hash;
        match support.iter_mut().find(|(c, _)| c.last().expect("non-empty").hash == tip) {
            Some((existing, count)) => {
                *count += 1;
                // Keep the longest representative of the group.
                if chain.len() > existing.len() {
                    *existing = chain;
                }
            }
            None => support.push((chain, 1)),
        }
    }

    support
        .into_iter()
        .filter(|(_, count)| (*count as f64) / (responding as f64) >= threshold)
        .max_by_key(|(chain, _)| chain.len())
        .map(|(chain, _)| chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::signature::{CommandSigner, KeyRegistry};
    use crate::transaction::Transaction;
    use sentinel_core::{CommandPayload, NavigationParams};
    use std::time::{Duration, Instant};

    const TEST_DIFFICULTY: u8 = 8;

    fn build_chain(blocks: usize, seed: u64) -> Vec<Block> {
        let signer = CommandSigner::from_seed("node-a", seed);
        let mut keys = KeyRegistry::new();
        keys.enroll_signer(&signer);
        let mut chain = Chain::new();
        for b in 0..blocks {
            let txs: Vec<Transaction> = (0..2)
                .map(|i| {
                    Transaction::signed(
                        CommandPayload::Navigation(NavigationParams {
                            altitude_m: Some((b * 10 + i) as f64),
                            ..Default::default()
                        }),
                        &signer,
                        (b * 10 + i) as u64,
                    )
                })
                .collect();
            let block = Block::candidate(chain.tip(), b as u64, txs)
                .seal(TEST_DIFFICULTY, Instant::now() + Duration::from_secs(5))
                .unwrap();
            chain.append(block, TEST_DIFFICULTY, &keys).unwrap();
        }
        chain.blocks().to_vec()
    }

    #[test]
    fn test_majority_tip_wins() {
        let agreed = build_chain(3, 1);
        let outlier = build_chain(4, 2);

        let picked = select_candidate(
            vec![agreed.clone(), agreed.clone(), outlier],
            0.66,
        )
        .unwrap();
        assert_eq!(picked.last().unwrap().hash, agreed.last().unwrap().hash);
    }

    #[test]
    fn test_no_agreement_yields_none() {
        let a = build_chain(3, 1);
        let b = build_chain(3, 2);
        let c = build_chain(3, 3);
        assert!(select_candidate(vec![a, b, c], 0.66).is_none());
    }

    #[test]
    fn test_single_peer_meets_any_threshold() {
        let only = build_chain(2, 1);
        assert!(select_candidate(vec![only], 1.0).is_some());
    }

    #[test]
    fn test_empty_responses_ignored() {
        let only = build_chain(2, 1);
        let picked = select_candidate(vec![Vec::new(), only.clone()], 1.0).unwrap();
        assert_eq!(picked.len(), only.len());
    }

    #[tokio::test]
    async fn test_static_peer_set_roundtrip() {
        let peers = StaticPeerSet::new();
        let chain = build_chain(2, 1);
        peers.offer_chain(chain.clone());

        let collected = peers.collect_chains().await;
        assert_eq!(collected.len(), 1);
        peers.broadcast_block(chain.last().unwrap()).await;
        assert_eq!(peers.broadcast_count(), 1);
    }
}
