//! In-process mesh
//!
//! A shared hub standing in for the radio mesh: every node publishes
//! its chain under its node id and collects everyone else's. Useful for
//! multi-node consensus tests and single-host bring-up; the real link
//! implements [`crate::consensus::PeerNetwork`] over the actual
//! transport.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tracing::debug;

use crate::chain::Block;
use crate::consensus::PeerNetwork;

/// Shared state of the simulated mesh.
#[derive(Default)]
pub struct MeshHub {
    chains: Mutex<HashMap<String, Vec<Block>>>,
    broadcasts: Mutex<Vec<(String, Block)>>,
}

impl MeshHub {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Attach one node to the hub.
    pub fn join(self: &Arc<Self>, node_id: impl Into<String>) -> MeshPeer {
        let node_id = node_id.into();
        debug!(node = %node_id, "node joined mesh");
        MeshPeer {
            hub: self.clone(),
            node_id,
        }
    }

    /// Every block broadcast so far, in arrival order.
    pub fn broadcast_log(&self) -> Vec<(String, Block)> {
        self.broadcasts.lock().expect("mesh poisoned").clone()
    }

    pub fn node_count(&self) -> usize {
        self.chains.lock().expect("mesh poisoned").len()
    }
}

/// One node's view of the mesh.
pub struct MeshPeer {
    hub: Arc<MeshHub>,
    node_id: String,
}

impl MeshPeer {
    pub fn node_id(&self) -> &str {
        &self.node_id
    }

    /// Publish this node's current chain for the others to collect.
    pub fn publish_chain(&self, blocks: Vec<Block>) {
        self.hub
            .chains
            .lock()
            .expect("mesh poisoned")
            .insert(self.node_id.clone(), blocks);
    }
}

#[async_trait]
impl PeerNetwork for MeshPeer {
    async fn collect_chains(&self) -> Vec<Vec<Block>> {
        let chains = self.hub.chains.lock().expect("mesh poisoned");
        let mut out: Vec<(&String, &Vec<Block>)> = chains
            .iter()
            .filter(|(node, _)| *node != &self.node_id)
            .collect();
        // Stable order so candidate selection is deterministic.
        out.sort_by(|a, b| a.0.cmp(b.0));
        out.into_iter().map(|(_, chain)| chain.clone()).collect()
    }

    async fn broadcast_block(&self, block: &Block) {
        self.hub
            .broadcasts
            .lock()
            .expect("mesh poisoned")
            .push((self.node_id.clone(), block.clone()));
    }
}
