//! A minimal routing table satisfying only the observable contract in
//! §4.4 (`find_closest_nodes`, `add_node`). The reference implementation's
//! k-bucket/LRU-eviction machinery is deliberately not reproduced here —
//! the spec calls that machinery an assumed implementation detail, only
//! its outward behavior (closest-node lookup) is specified.

use std::sync::RwLock;

use crate::{Node, NodeId};

fn xor_distance(a: &NodeId, b: &NodeId) -> [u8; 32] {
    let mut out = [0u8; 32];
    for i in 0..32 {
        out[i] = a[i] ^ b[i];
    }
    out
}

/// A flat, unbounded set of known nodes, sorted by XOR distance on demand.
#[derive(Default)]
pub struct RoutingTable {
    nodes: RwLock<Vec<Node>>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or refresh a node. Nodes are deduplicated by id; a
    /// re-added node replaces its previous entry (address/key may have
    /// changed).
    pub fn add_node(&self, node: Node) {
        let mut nodes = self.nodes.write().expect("routing table lock");
        if let Some(existing) = nodes.iter_mut().find(|n| n.id == node.id) {
            *existing = node;
        } else {
            nodes.push(node);
        }
    }

    pub fn remove_node(&self, id: &NodeId) {
        self.nodes.write().expect("routing table lock").retain(|n| &n.id != id);
    }

    /// The `k` known nodes with the smallest XOR distance to `target`.
    pub fn find_closest_nodes(&self, target: &NodeId, k: usize) -> Vec<Node> {
        let mut nodes = self.nodes.read().expect("routing table lock").clone();
        nodes.sort_by_key(|n| xor_distance(&n.id, target));
        nodes.truncate(k);
        nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.read().expect("routing table lock").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
