//! The Storage Port: the persistence contract the Registry Core depends on,
//! plus the in-memory reference adapter (§4.2).

pub mod memory;
pub mod traits;

pub use memory::{MemoryStorage, MemoryStorageStats};
pub use traits::{ModuleCommit, StoragePort};
