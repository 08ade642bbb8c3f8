use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::RunMode;
use crate::utils::time::now_secs;

/// Process-wide view of this node's role. The leader flag is flipped only by
/// the leadership listener.
#[derive(Debug)]
pub struct Role {
    mode: RunMode,
    leader: AtomicBool,
    started_at: i64,
}

impl Role {
    pub fn new(mode: RunMode) -> Self {
        Self {
            mode,
            leader: AtomicBool::new(false),
            started_at: now_secs(),
        }
    }

    pub fn mode(&self) -> RunMode {
        self.mode
    }

    pub fn is_cluster(&self) -> bool {
        self.mode == RunMode::Cluster
    }

    pub fn is_leader(&self) -> bool {
        self.leader.load(Ordering::SeqCst)
    }

    pub fn set_leader(&self, leader: bool) {
        self.leader.store(leader, Ordering::SeqCst);
    }

    /// Gate for everything that fires jobs.
    pub fn is_standalone_or_leader(&self) -> bool {
        !self.is_cluster() || self.is_leader()
    }

    /// Unix seconds
    pub fn started_at(&self) -> i64 {
        self.started_at
    }
}
