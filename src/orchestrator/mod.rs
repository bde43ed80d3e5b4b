//! Orchestrator Module
//!
//! Cluster membership and migration sequencing.
//!
//! ## Node Lifecycle
//! ```text
//!   INIT ──► Pooled ──add_nodes──► Rebalancing ──TRANSFER_COMPLETE──► Admitted
//!               │                   (or Admitted when nothing to pull)    │
//!               └──────────────remove_nodes / disconnect──────────────────┴──► Removed
//! ```
//!
//! ## Migration Sequence
//! ```text
//!   orchestrator ──TRANSFER_TO(target, range)──► source
//!   source ──TRANSFER_TO(target, range, pairs)──► orchestrator
//!   orchestrator ──RECEIVE(from, pairs)──► target
//!   target ──TRANSFER_COMPLETE(ping=source)──► orchestrator ──► source
//! ```
//!
//! The orchestrator relays pairs but never stores them.

mod cluster;
mod listener;
mod migration;
mod registry;

pub use cluster::ClusterOrchestrator;
pub use listener::OrchestratorServer;
pub use migration::{MigrationCoordinator, PendingMigration};
pub use registry::{NodeDescriptor, NodeLink, NodeRecord, NodeState, Registry};
