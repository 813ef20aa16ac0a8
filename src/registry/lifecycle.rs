//! Release, retire/resume, and removal (§4.4 "Release"/"Retire / Resume /
//! Remove").

use crate::error::{Result, TddbError};
use crate::model::{FuncInfo, FuncParseRecord, ModuleVersion, SchemaRecord, TypeInfo, TypeParseRecord};
use crate::ownership::Privilege;
use crate::storage::ModuleCommit;

use super::RegistryCore;

impl RegistryCore {
    /// Bumps every `major == 0` type/function to `1.0`, re-saving its
    /// schema and parse records under a fresh `versionTime`, then marks the
    /// module released. If no pre-release entities exist, marks the
    /// existing latest version released in place.
    pub async fn release_module(&self, module: &str, user_id: &str) -> Result<()> {
        self.ownership.require(module, user_id, Privilege::Owner).await?;
        if !self.storage.exists(module).await? {
            return Err(TddbError::NoSuchModule {
                module: module.to_string(),
            });
        }

        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_write(module, token).await?;

        let version_time = self
            .storage
            .last_version_including_unreleased(module)
            .await?
            .ok_or_else(|| TddbError::NoSuchModule {
                module: module.to_string(),
            })?;
        let current = self
            .storage
            .get_module_version(module, version_time)
            .await?
            .ok_or_else(|| TddbError::NoSuchModule {
                module: module.to_string(),
            })?;

        let prerelease_types: Vec<String> = current
            .types
            .values()
            .filter(|t| t.supported && t.type_version.major == 0)
            .map(|t| t.type_name.clone())
            .collect();
        let prerelease_funcs: Vec<String> = current
            .funcs
            .values()
            .filter(|f| f.supported && f.func_version.major == 0)
            .map(|f| f.func_name.clone())
            .collect();

        if prerelease_types.is_empty() && prerelease_funcs.is_empty() {
            let mut released = current;
            released.released = true;
            self.storage.write_module_version(module, released).await?;
            self.storage.set_release_version(module, version_time).await?;
            return Ok(());
        }

        let new_version_time = self.storage.generate_new_version(module).await?;
        let mut types = current.types.clone();
        let mut funcs = current.funcs.clone();
        let mut type_schemas = Vec::new();
        let mut type_parses = Vec::new();
        let mut func_parses: Vec<FuncParseRecord> = Vec::new();

        for name in &prerelease_types {
            let info = types.get(name).expect("prerelease_types drawn from types map");
            let old_version = info.type_version;
            let new_version = old_version.release();
            let record = self
                .storage
                .get_type_parse_record(module, name, old_version)
                .await?
                .ok_or_else(|| TddbError::NoSuchType {
                    module: module.to_string(),
                    name: name.clone(),
                    version: Some(old_version.to_string()),
                })?;
            let schema = self
                .storage
                .get_type_schema_record(module, name, old_version)
                .await?
                .ok_or_else(|| TddbError::NoSuchType {
                    module: module.to_string(),
                    name: name.clone(),
                    version: Some(old_version.to_string()),
                })?;

            types.insert(
                name.clone(),
                TypeInfo {
                    type_name: name.clone(),
                    type_version: new_version,
                    supported: true,
                },
            );
            type_schemas.push(SchemaRecord {
                module_name: module.to_string(),
                type_name: name.clone(),
                type_version: new_version,
                module_version: new_version_time,
                json_schema: schema.json_schema,
                md5: schema.md5,
            });
            type_parses.push(TypeParseRecord {
                module_name: module.to_string(),
                type_name: name.clone(),
                type_version: new_version,
                module_version: new_version_time,
                ast: record.ast,
            });
        }

        for name in &prerelease_funcs {
            let info = funcs.get(name).expect("prerelease_funcs drawn from funcs map");
            let old_version = info.func_version;
            let new_version = old_version.release();
            let record = self
                .storage
                .get_func_parse_record(module, name, old_version)
                .await?
                .ok_or_else(|| TddbError::NoSuchFunc {
                    module: module.to_string(),
                    name: name.clone(),
                    version: Some(old_version.to_string()),
                })?;
            funcs.insert(
                name.clone(),
                FuncInfo {
                    func_name: name.clone(),
                    func_version: new_version,
                    supported: true,
                },
            );
            func_parses.push(FuncParseRecord {
                module_name: module.to_string(),
                func_name: name.clone(),
                func_version: new_version,
                module_version: new_version_time,
                ast: record.ast,
            });
        }

        let new_module_version = ModuleVersion {
            version_time: new_version_time,
            spec: current.spec.clone(),
            ast_md5: current.ast_md5.clone(),
            description: current.description.clone(),
            uploader: current.uploader.clone(),
            upload_method: "release".to_string(),
            upload_comment: String::new(),
            released: true,
            included_module_version: current.included_module_version.clone(),
            types,
            funcs,
        };

        self.storage
            .apply_commit(
                module,
                ModuleCommit {
                    module_version: Some(new_module_version),
                    type_schemas,
                    type_parses,
                    func_parses,
                    type_refs: Vec::new(),
                    func_refs: Vec::new(),
                },
            )
            .await?;
        self.storage.set_release_version(module, new_version_time).await?;
        Ok(())
    }

    /// Admin-only: flips the supported flag off.
    pub async fn stop_module_support(&self, module: &str, admin_user_id: &str) -> Result<()> {
        self.ownership
            .require(module, admin_user_id, Privilege::Admin)
            .await?;
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_write(module, token).await?;
        self.storage.change_supported_state(module, false).await
    }

    /// Admin-only: clears the retired flag.
    pub async fn resume_module_support(&self, module: &str, admin_user_id: &str) -> Result<()> {
        self.ownership
            .require(module, admin_user_id, Privilege::Admin)
            .await?;
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_write(module, token).await?;
        self.storage.change_supported_state(module, true).await
    }

    /// Admin-only: hard-deletes the module and every record it owns.
    pub async fn remove_module(&self, module: &str, admin_user_id: &str) -> Result<()> {
        self.ownership
            .require(module, admin_user_id, Privilege::Admin)
            .await?;
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_write(module, token).await?;
        self.storage.remove_module(module).await
    }
}

