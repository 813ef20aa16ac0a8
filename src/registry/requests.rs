//! New-module registration requests (§4.4 "Registration requests").

use crate::error::{Result, TddbError};
use crate::model::{ModuleRegistrationRequest, ModuleVersion, OwnerRecord};
use crate::ownership::Privilege;

use super::RegistryCore;

impl RegistryCore {
    /// Queues `(module, user)`. Read-locks the (as yet unregistered) module
    /// name in "pre-registration" mode to serialize competing requests for
    /// the same name.
    pub async fn request_module_registration(&self, module: &str, user_id: &str) -> Result<()> {
        if self.storage.exists(module).await? {
            return Err(TddbError::parse(format!(
                "module {module:?} is already registered"
            )));
        }
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(module, token).await?;
        self.storage
            .add_new_module_registration_request(ModuleRegistrationRequest {
                module_name: module.to_string(),
                user_id: user_id.to_string(),
            })
            .await
    }

    /// Admin-only: materializes the initial `ModuleVersion` (empty,
    /// released, one owner with change-owners privilege) and drops the
    /// request.
    pub async fn approve_module_registration_request(
        &self,
        admin_user_id: &str,
        module: &str,
    ) -> Result<()> {
        self.ownership
            .require(module, admin_user_id, Privilege::Admin)
            .await?;
        let requester = self
            .storage
            .get_owner_for_new_module_registration_request(module)
            .await?
            .ok_or_else(|| TddbError::parse(format!("no pending request for module {module:?}")))?;

        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_write(module, token).await?;

        let version_time = self.storage.generate_new_version(module).await?;
        self.storage
            .init_record(module, ModuleVersion::bootstrap(version_time, &requester))
            .await?;
        self.storage
            .add_owner_to_module(OwnerRecord::new(module, &requester, true))
            .await?;
        self.storage
            .remove_new_module_registration_request(module)
            .await
    }

    /// Admin-only: drops a pending registration request without
    /// materializing the module.
    pub async fn refuse_module_registration_request(
        &self,
        admin_user_id: &str,
        module: &str,
    ) -> Result<()> {
        self.ownership
            .require(module, admin_user_id, Privilege::Admin)
            .await?;
        self.storage.remove_new_module_registration_request(module).await
    }

    /// Adds or replaces an owner's entry. Requires change-owners-or-admin
    /// on the target module.
    pub async fn add_owner(
        &self,
        caller_user_id: &str,
        module: &str,
        new_owner_user_id: &str,
        with_change_owners_privilege: bool,
    ) -> Result<()> {
        self.ownership
            .require(module, caller_user_id, Privilege::ChangeOwners)
            .await?;
        self.storage
            .add_owner_to_module(OwnerRecord::new(
                module,
                new_owner_user_id,
                with_change_owners_privilege,
            ))
            .await
    }

    /// Removes an owner. Requires change-owners-or-admin on the target
    /// module.
    pub async fn remove_owner(
        &self,
        caller_user_id: &str,
        module: &str,
        owner_user_id: &str,
    ) -> Result<()> {
        self.ownership
            .require(module, caller_user_id, Privilege::ChangeOwners)
            .await?;
        self.storage
            .remove_owner_from_module(module, owner_user_id)
            .await
    }
}
