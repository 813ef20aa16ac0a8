//! Read paths (§4.5). Every read acquires the read lock for the target
//! module; nothing here mutates storage.

use crate::error::{Result, TddbError};
use crate::model::{
    AbsoluteTypeDefId, FuncParseRecord, OwnerRecord, SchemaRecord, TypeDefId, TypeParseRecord,
    VersionSelector,
};
use crate::version::TypeVersion;

use super::RegistryCore;

impl RegistryCore {
    /// Resolves a [`TypeDefId`] to the concrete `<major>.<minor>` it
    /// currently names, per the rules in §4.5.
    pub async fn resolve_type(&self, id: &TypeDefId) -> Result<AbsoluteTypeDefId> {
        let module = &id.name.module;
        let name = &id.name.name;

        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(module, token).await?;

        if !self.storage.exists(module).await? || !self.storage.supported_state(module).await? {
            return Err(TddbError::NoSuchModule {
                module: module.clone(),
            });
        }

        let version = match &id.version {
            Some(VersionSelector::Md5(md5)) => {
                let mut versions = self.storage.get_type_versions_by_md5(module, name, md5).await?;
                versions.sort();
                versions.pop().ok_or_else(|| TddbError::NoSuchType {
                    module: module.clone(),
                    name: name.clone(),
                    version: Some(md5.clone()),
                })?
            }
            Some(VersionSelector::Exact { major, minor }) => TypeVersion::new(*major, *minor),
            Some(VersionSelector::Major(major)) => {
                let all = self.storage.get_all_type_versions(module, name).await?;
                all.into_iter()
                    .filter(|(v, released)| v.major == *major && *released)
                    .map(|(v, _)| v)
                    .max()
                    .ok_or_else(|| TddbError::NoSuchType {
                        module: module.clone(),
                        name: name.clone(),
                        version: Some(major.to_string()),
                    })?
            }
            None => {
                let released_at = self
                    .storage
                    .last_released_version(module)
                    .await?
                    .ok_or_else(|| TddbError::NoSuchModule {
                        module: module.clone(),
                    })?;
                let version = self
                    .storage
                    .get_module_version(module, released_at)
                    .await?
                    .ok_or_else(|| TddbError::NoSuchModule {
                        module: module.clone(),
                    })?;
                version
                    .types
                    .get(name)
                    .filter(|t| t.supported)
                    .map(|t| t.type_version)
                    .ok_or_else(|| TddbError::NoSuchType {
                        module: module.clone(),
                        name: name.clone(),
                        version: None,
                    })?
            }
        };

        if !self
            .storage
            .check_type_schema_record_exists(module, name, version)
            .await?
        {
            return Err(TddbError::NoSuchType {
                module: module.clone(),
                name: name.clone(),
                version: Some(version.to_string()),
            });
        }

        Ok(AbsoluteTypeDefId::new(id.name.clone(), version.major, version.minor))
    }

    pub async fn get_type_schema(&self, id: &TypeDefId) -> Result<SchemaRecord> {
        let resolved = self.resolve_type(id).await?;
        let version = TypeVersion::new(resolved.major, resolved.minor);
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(&resolved.name.module, token).await?;
        self.storage
            .get_type_schema_record(&resolved.name.module, &resolved.name.name, version)
            .await?
            .ok_or_else(|| TddbError::NoSuchType {
                module: resolved.name.module.clone(),
                name: resolved.name.name.clone(),
                version: Some(version.to_string()),
            })
    }

    pub async fn get_type_parse(&self, id: &TypeDefId) -> Result<TypeParseRecord> {
        let resolved = self.resolve_type(id).await?;
        let version = TypeVersion::new(resolved.major, resolved.minor);
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(&resolved.name.module, token).await?;
        self.storage
            .get_type_parse_record(&resolved.name.module, &resolved.name.name, version)
            .await?
            .ok_or_else(|| TddbError::NoSuchType {
                module: resolved.name.module.clone(),
                name: resolved.name.name.clone(),
                version: Some(version.to_string()),
            })
    }

    /// Resolves a function to the latest supported version declared by the
    /// latest released module version.
    pub async fn get_func_parse(&self, module: &str, name: &str) -> Result<FuncParseRecord> {
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(module, token).await?;

        if !self.storage.exists(module).await? || !self.storage.supported_state(module).await? {
            return Err(TddbError::NoSuchModule {
                module: module.to_string(),
            });
        }
        let released_at = self
            .storage
            .last_released_version(module)
            .await?
            .ok_or_else(|| TddbError::NoSuchModule {
                module: module.to_string(),
            })?;
        let version = self
            .storage
            .get_module_version(module, released_at)
            .await?
            .ok_or_else(|| TddbError::NoSuchModule {
                module: module.to_string(),
            })?;
        let func_version = version
            .funcs
            .get(name)
            .filter(|f| f.supported)
            .map(|f| f.func_version)
            .ok_or_else(|| TddbError::NoSuchFunc {
                module: module.to_string(),
                name: name.to_string(),
                version: None,
            })?;
        self.storage
            .get_func_parse_record(module, name, func_version)
            .await?
            .ok_or_else(|| TddbError::NoSuchFunc {
                module: module.to_string(),
                name: name.to_string(),
                version: Some(func_version.to_string()),
            })
    }

    /// Admin-only: the latest version including unreleased drafts (§4.6).
    pub async fn get_unreleased_latest(
        &self,
        module: &str,
        admin_user_id: &str,
    ) -> Result<Option<u64>> {
        self.ownership
            .require(module, admin_user_id, crate::ownership::Privilege::Admin)
            .await?;
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(module, token).await?;
        if !self.storage.exists(module).await? {
            return Err(TddbError::NoSuchModule {
                module: module.to_string(),
            });
        }
        self.storage.last_version_including_unreleased(module).await
    }

    /// The module's current owner list.
    pub async fn get_owners(&self, module: &str) -> Result<Vec<OwnerRecord>> {
        let token = self.locks.tokens.next_token();
        let _guard = self.locks.acquire_read(module, token).await?;
        if !self.storage.exists(module).await? {
            return Err(TddbError::NoSuchModule {
                module: module.to_string(),
            });
        }
        self.storage.get_owners_for_module(module).await
    }
}
