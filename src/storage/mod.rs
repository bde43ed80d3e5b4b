//! Storage Module
//!
//! Node-local persistent store behind a narrow associative interface.
//!
//! ## Responsibilities
//! - get/put/delete by key, plus key listing for migration ranges
//! - No durability or replay guarantees
//!
//! ## Backends
//! ```text
//! ┌─────────────┬───────────────────────────────────────────────┐
//! │ FileStore   │ one file per key, escaped key as file name    │
//! │ MemoryStore │ BTreeMap behind an RwLock (tests, ephemeral)  │
//! └─────────────┴───────────────────────────────────────────────┘
//! ```

mod file;
mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use crate::error::Result;

/// Associative store consumed by a storage node
pub trait PersistentStore: Send + Sync {
    fn exists(&self, key: &str) -> Result<bool>;

    /// Read a value; `Ok(None)` when the key is absent
    fn read(&self, key: &str) -> Result<Option<String>>;

    fn write(&self, key: &str, value: &str) -> Result<()>;

    /// Delete a key; `Ok(false)` when it was absent
    fn delete(&self, key: &str) -> Result<bool>;

    /// Every stored key
    fn keys(&self) -> Result<Vec<String>>;

    /// Drop everything
    fn clear(&self) -> Result<()>;
}
