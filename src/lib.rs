//! # RingKV
//!
//! A partitioned key-value store with:
//! - Consistent hashing (MD5, 128-bit ring) to assign keys to nodes
//! - A central orchestrator that admits and removes nodes and sequences
//!   range migrations between them
//! - Pluggable per-node caches (LRU, LFU, FIFO) in front of a flat-file store
//! - A dual-framing TCP protocol shared by clients and cluster control
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    ClusterOrchestrator                       │
//! │        (ring + registry + pending migrations, one lock)      │
//! └──────────┬──────────────────────────────────┬───────────────┘
//!            │ control (Internal framing)       │
//!            ▼                                  ▼
//!   ┌─────────────────┐                ┌─────────────────┐
//!   │   StorageNode   │   ...          │   StorageNode   │
//!   │  KvService      │                │  KvService      │
//!   │   ├─ Cache      │                │   ├─ Cache      │
//!   │   └─ Store      │                │   └─ Store      │
//!   └────────▲────────┘                └────────▲────────┘
//!            │ client requests (either framing) │
//!          clients ─────── KEYRANGE routing ────┘
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;

pub mod cache;
pub mod client;
pub mod node;
pub mod orchestrator;
pub mod protocol;
pub mod ring;
pub mod storage;

// =============================================================================
// Public API Re-exports
// =============================================================================

pub use client::KvClient;
pub use config::{NodeConfig, OrchestratorConfig, PoolConfig};
pub use error::{Result, RingKvError};
pub use node::{KvService, NodeServer};
pub use orchestrator::{ClusterOrchestrator, OrchestratorServer};
pub use ring::HashRing;

// =============================================================================
// Version Info
// =============================================================================

/// Current version of RingKV
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
