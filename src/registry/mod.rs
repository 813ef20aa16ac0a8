//! The Registry Core: orchestrates the full `saveModule` pipeline and
//! serves every read path (§4.4, §4.5).

mod lifecycle;
mod read;
mod requests;
mod save;
pub mod types;

use std::sync::Arc;

use crate::config::TddbConfig;
use crate::lock::LockManager;
use crate::ownership::OwnershipGuard;
use crate::parser::ParserPort;
use crate::storage::StoragePort;

pub use types::{SaveModuleInput, SaveModuleOutput, TypeChange};

/// The orchestrator every embedder talks to. Cheap to clone (everything
/// inside is an `Arc`); share one instance across tasks.
pub struct RegistryCore {
    pub(crate) storage: Arc<dyn StoragePort>,
    pub(crate) parser: Arc<dyn ParserPort>,
    pub(crate) locks: LockManager,
    pub(crate) ownership: OwnershipGuard,
    pub(crate) config: TddbConfig,
}

impl RegistryCore {
    pub fn new(
        storage: Arc<dyn StoragePort>,
        parser: Arc<dyn ParserPort>,
        admins: Vec<String>,
        config: TddbConfig,
    ) -> Self {
        Self {
            locks: LockManager::new(config.clone()),
            ownership: OwnershipGuard::new(storage.clone(), admins),
            storage,
            parser,
            config,
        }
    }
}
