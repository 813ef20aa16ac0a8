//! Privilege checks gating every mutation (§4.6).
//!
//! Two privilege levels per module: *owner* and *owner-with-change-owners*.
//! Global admins supersede both. Content mutations require owner-or-admin;
//! mutations of the owner list require change-owners-or-admin.
//! Admin-only: module removal, support-state flips, processing registration
//! requests, querying any module's unreleased latest.

use std::sync::Arc;

use crate::error::{Result, TddbError};
use crate::storage::StoragePort;

/// Which privilege an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Privilege {
    /// Owner (any level) or admin.
    Owner,
    /// Owner with the change-owners flag, or admin.
    ChangeOwners,
    /// Global admin only.
    Admin,
}

impl Privilege {
    fn label(self) -> &'static str {
        match self {
            Privilege::Owner => "owner",
            Privilege::ChangeOwners => "owner-with-change-owners",
            Privilege::Admin => "admin",
        }
    }
}

/// Checks a caller's privilege against a module's owner list. Global admin
/// membership is supplied by the embedder (it is not part of the persisted
/// module/type/ref model).
pub struct OwnershipGuard {
    storage: Arc<dyn StoragePort>,
    admins: Vec<String>,
}

impl OwnershipGuard {
    pub fn new(storage: Arc<dyn StoragePort>, admins: Vec<String>) -> Self {
        Self { storage, admins }
    }

    pub fn is_admin(&self, user_id: &str) -> bool {
        self.admins.iter().any(|a| a == user_id)
    }

    /// Fails with `NoSuchPrivilege` unless `user_id` satisfies `required`
    /// for `module`.
    pub async fn require(&self, module: &str, user_id: &str, required: Privilege) -> Result<()> {
        if self.is_admin(user_id) {
            return Ok(());
        }
        if required == Privilege::Admin {
            return Err(self.denied(module, user_id, required));
        }
        let owners = self.storage.get_owners_for_module(module).await?;
        let satisfied = owners.iter().any(|o| {
            o.user_id == user_id
                && (required == Privilege::Owner || o.with_change_owners_privilege)
        });
        if satisfied {
            Ok(())
        } else {
            Err(self.denied(module, user_id, required))
        }
    }

    fn denied(&self, module: &str, user_id: &str, required: Privilege) -> TddbError {
        TddbError::NoSuchPrivilege {
            user: user_id.to_string(),
            module: module.to_string(),
            required: required.label(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::OwnerRecord;
    use crate::storage::MemoryStorage;

    async fn guard_with_owner(
        module: &str,
        user: &str,
        change_owners: bool,
        admins: Vec<String>,
    ) -> OwnershipGuard {
        let storage: Arc<dyn StoragePort> = Arc::new(MemoryStorage::new());
        storage
            .add_owner_to_module(OwnerRecord::new(module, user, change_owners))
            .await
            .unwrap();
        OwnershipGuard::new(storage, admins)
    }

    #[tokio::test]
    async fn owner_passes_owner_check_but_not_change_owners() {
        let guard = guard_with_owner("acme.widget", "alice", false, vec![]).await;
        guard
            .require("acme.widget", "alice", Privilege::Owner)
            .await
            .unwrap();
        let err = guard
            .require("acme.widget", "alice", Privilege::ChangeOwners)
            .await
            .unwrap_err();
        assert!(matches!(err, TddbError::NoSuchPrivilege { .. }));
    }

    #[tokio::test]
    async fn change_owners_owner_passes_both_checks() {
        let guard = guard_with_owner("acme.widget", "alice", true, vec![]).await;
        guard
            .require("acme.widget", "alice", Privilege::Owner)
            .await
            .unwrap();
        guard
            .require("acme.widget", "alice", Privilege::ChangeOwners)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn admin_supersedes_every_level() {
        let guard = guard_with_owner("acme.widget", "alice", false, vec!["root".into()]).await;
        guard
            .require("acme.widget", "root", Privilege::Admin)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn non_owner_is_rejected() {
        let guard = guard_with_owner("acme.widget", "alice", true, vec![]).await;
        let err = guard
            .require("acme.widget", "mallory", Privilege::Owner)
            .await
            .unwrap_err();
        assert!(matches!(err, TddbError::NoSuchPrivilege { .. }));
    }
}
