//! Node Module
//!
//! A storage node: client-facing server plus the control link to the
//! orchestrator.
//!
//! ## Architecture
//! ```text
//!   clients ──► NodeServer (accept loop)
//!                   │ thread per connection
//!                   ▼
//!             ClientConnection ──► KvService ──► Cache ──► PersistentStore
//!                                      ▲
//!   orchestrator ◄──► OrchestratorLink ┘ (NodeMigrator on the reader thread)
//! ```
//!
//! ## Serving States
//! - Standalone: no orchestrator, every key served
//! - Awaiting: registered, answers SERVER_STOPPED until admitted
//! - Active: serves keys its ring snapshot assigns to it
//! - Stopped: removed or leaving

mod connection;
mod link;
mod migration;
mod server;
mod service;

pub use connection::ClientConnection;
pub use link::OrchestratorLink;
pub use migration::NodeMigrator;
pub use server::NodeServer;
pub use service::{KvService, ServingState};
