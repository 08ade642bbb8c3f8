use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A cluster member, or the single process in standalone mode.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Node {
    pub name: String,
    pub http_addr: String,
    /// Consensus transport address, empty in standalone mode
    pub tcp_addr: String,
    /// Machine id for unique id generation, assigned once on first registration
    pub machine_num: u16,
}

impl Node {
    pub fn new(name: impl Into<String>, http_addr: impl Into<String>, tcp_addr: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            http_addr: http_addr.into(),
            tcp_addr: tcp_addr.into(),
            machine_num: 0,
        }
    }

    pub fn same_addresses(&self, other: &Node) -> bool {
        self.http_addr == other.http_addr && self.tcp_addr == other.tcp_addr
    }
}
