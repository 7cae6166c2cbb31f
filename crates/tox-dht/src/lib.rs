//! The DHT routing-table interface (§4.4) and group-announcement
//! dissemination. The internal bucket algorithm is explicitly out of
//! scope for this core — [`routing`] keeps only the observable contract
//! (`find_closest_nodes`, `add_node`) over a flat node set rather than
//! porting a full Kademlia k-bucket/LRU-eviction table.

pub mod announce;
pub mod routing;

use serde::{Deserialize, Serialize};
use tox_types::group::GroupId;

#[derive(Debug, thiserror::Error)]
pub enum DhtError {
    #[error("transport error: {0}")]
    Transport(#[from] tox_transport::TransportError),

    #[error("malformed DHT payload: {0}")]
    Malformed(String),

    #[error("no known node to query for group {0}")]
    NoRoute(GroupId),
}

pub type Result<T> = std::result::Result<T, DhtError>;

pub type NodeId = [u8; 32];

/// A node known to the routing table (§4.4: `{id, address, public_key}`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub id: NodeId,
    pub address: tox_types::traits::Addr,
    pub public_key: [u8; 32],
}

pub use announce::{Dht, GroupResponseCallback, InMemoryDht};
