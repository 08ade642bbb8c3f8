//! Cluster membership, consensus and replicated state.
//!
//! In cluster mode every node runs a raft member. Mutations are written to the
//! local store and proposed through [`Replicator`]; followers apply committed
//! entries through [`fsm::Fsm`]. Only the leader schedules jobs, which
//! [`leadership`] enforces by reacting to role changes.

pub mod bootstrap;
pub mod command;
pub mod consensus;
pub mod fsm;
pub mod leadership;
pub mod peer;
pub mod raft;
pub mod replicator;
pub mod role;

pub use consensus::{ClusterMember, Consensus};
pub use leadership::Leadership;
pub use replicator::Replicator;
pub use role::Role;
