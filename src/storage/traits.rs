//! The `StoragePort` contract the Registry Core depends on (§4.2).

use async_trait::async_trait;
use std::collections::HashMap;

use crate::error::Result;
use crate::model::{
    FuncParseRecord, ModuleRegistrationRequest, ModuleVersion, OwnerRecord, RefInfo, SchemaRecord,
    TypeParseRecord, VersionTime,
};
use crate::version::TypeVersion;

/// Everything stamped with a given `versionTime` during a single
/// `saveModule` commit (§4.4 step 8), so the core can hand the store one
/// logical transaction instead of composing many independent single-key
/// writes.
#[derive(Debug, Clone, Default)]
pub struct ModuleCommit {
    pub module_version: Option<ModuleVersion>,
    pub type_schemas: Vec<SchemaRecord>,
    pub type_parses: Vec<TypeParseRecord>,
    pub func_parses: Vec<FuncParseRecord>,
    pub type_refs: Vec<RefInfo>,
    pub func_refs: Vec<RefInfo>,
}

/// Persistence interface the Registry Core depends on. All methods are
/// single-key atomic; the core composes multi-write operations (a
/// `saveModule` commit) by writing each piece and rolling the whole group
/// back via [`StoragePort::rollback_version`] if any later step fails.
///
/// All writes are idempotent on `(module, versionTime, entityKey)`.
#[async_trait]
pub trait StoragePort: Send + Sync {
    // -- Module --
    async fn exists(&self, module: &str) -> Result<bool>;
    async fn init_record(&self, module: &str, version: ModuleVersion) -> Result<()>;
    async fn all_versions(&self, module: &str) -> Result<HashMap<VersionTime, bool>>;
    async fn last_released_version(&self, module: &str) -> Result<Option<VersionTime>>;
    async fn last_version_including_unreleased(&self, module: &str)
    -> Result<Option<VersionTime>>;
    async fn generate_new_version(&self, module: &str) -> Result<VersionTime>;
    async fn write_module_version(&self, module: &str, version: ModuleVersion) -> Result<()>;
    async fn set_release_version(&self, module: &str, version_time: VersionTime) -> Result<()>;
    async fn remove_version_if_not_current(
        &self,
        module: &str,
        version_time: VersionTime,
    ) -> Result<bool>;
    async fn supported_state(&self, module: &str) -> Result<bool>;
    async fn change_supported_state(&self, module: &str, supported: bool) -> Result<()>;
    async fn remove_module(&self, module: &str) -> Result<()>;
    async fn all_registered_modules(&self, include_retired: bool) -> Result<Vec<String>>;
    async fn get_module_version(
        &self,
        module: &str,
        version_time: VersionTime,
    ) -> Result<Option<ModuleVersion>>;

    // -- Type / Func --
    async fn write_type_schema_record(&self, record: SchemaRecord) -> Result<()>;
    async fn write_type_parse_record(&self, record: TypeParseRecord) -> Result<()>;
    async fn write_func_parse_record(&self, record: FuncParseRecord) -> Result<()>;
    async fn get_type_schema_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<SchemaRecord>>;
    async fn get_type_parse_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<TypeParseRecord>>;
    async fn get_func_parse_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<FuncParseRecord>>;
    async fn check_type_schema_record_exists(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<bool>;
    async fn get_all_type_versions(
        &self,
        module: &str,
        name: &str,
    ) -> Result<HashMap<TypeVersion, bool>>;
    async fn get_type_versions_by_md5(
        &self,
        module: &str,
        name: &str,
        md5: &str,
    ) -> Result<Vec<TypeVersion>>;
    async fn get_type_md5(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<String>>;

    // -- Refs --
    async fn add_refs(&self, type_refs: Vec<RefInfo>, func_refs: Vec<RefInfo>) -> Result<()>;
    async fn get_type_refs_by_dep(&self, module: &str, name: &str) -> Result<Vec<RefInfo>>;
    async fn get_type_refs_by_ref(&self, module: &str, name: &str) -> Result<Vec<RefInfo>>;
    async fn get_func_refs_by_dep(&self, module: &str, name: &str) -> Result<Vec<RefInfo>>;
    async fn get_func_refs_by_ref(&self, module: &str, name: &str) -> Result<Vec<RefInfo>>;
    async fn get_module_versions_for_type_version(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Vec<VersionTime>>;

    // -- Owners / requests --
    async fn get_owners_for_module(&self, module: &str) -> Result<Vec<OwnerRecord>>;
    async fn add_owner_to_module(&self, owner: OwnerRecord) -> Result<()>;
    async fn remove_owner_from_module(&self, module: &str, user_id: &str) -> Result<()>;
    async fn get_modules_for_owner(&self, user_id: &str) -> Result<Vec<String>>;
    async fn add_new_module_registration_request(
        &self,
        request: ModuleRegistrationRequest,
    ) -> Result<()>;
    async fn get_new_module_registration_requests(&self) -> Result<Vec<ModuleRegistrationRequest>>;
    async fn get_owner_for_new_module_registration_request(
        &self,
        module: &str,
    ) -> Result<Option<String>>;
    async fn remove_new_module_registration_request(&self, module: &str) -> Result<()>;

    // -- Transaction support --
    /// Applies every record in `commit` as one logical write, stamped with
    /// `commit.module_version.version_time`.
    async fn apply_commit(&self, module: &str, commit: ModuleCommit) -> Result<()>;
    /// Deletes every record stamped with `version_time` for `module`,
    /// reverting its latest pointer to the previous `versionTime`.
    async fn rollback_version(&self, module: &str, version_time: VersionTime) -> Result<()>;
}
