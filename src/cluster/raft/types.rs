use std::fmt;
use std::io::Cursor;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::cluster::command::{CommandEnvelope, CommandResponse};

pub type NodeId = u64;

/// Node record carried in the raft membership config.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RaftPeer {
    pub name: String,
    /// Transport address, `host:port`
    pub addr: String,
}

impl RaftPeer {
    pub fn new(name: impl Into<String>, addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            addr: addr.into(),
        }
    }
}

impl fmt::Display for RaftPeer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.addr)
    }
}

openraft::declare_raft_types!(
    pub TypeConfig:
        D = CommandEnvelope,
        R = CommandResponse,
        NodeId = NodeId,
        Node = RaftPeer,
        SnapshotData = Cursor<Vec<u8>>,
);

pub type Raft = openraft::Raft<TypeConfig>;
pub type Entry = openraft::Entry<TypeConfig>;
pub type LogId = openraft::LogId<NodeId>;
pub type Vote = openraft::Vote<NodeId>;
pub type StorageError = openraft::StorageError<NodeId>;
pub type SnapshotMeta = openraft::SnapshotMeta<NodeId, RaftPeer>;
pub type StoredMembership = openraft::StoredMembership<NodeId, RaftPeer>;
pub type Snapshot = openraft::Snapshot<TypeConfig>;

/// Raft id of a node: the first eight bytes of SHA-256 over its name.
pub fn node_id(name: &str) -> NodeId {
    let digest = Sha256::digest(name.as_bytes());
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&digest[..8]);
    u64::from_be_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_id_is_stable_and_distinct() {
        assert_eq!(node_id("node-1"), node_id("node-1"));
        assert_ne!(node_id("node-1"), node_id("node-2"));
    }
}
