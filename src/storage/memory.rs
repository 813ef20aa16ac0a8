//! A fully async, in-process `StoragePort` adapter backed by concurrent
//! maps. Ships as the default implementation for embedding and tests; not a
//! toy, the shipped and supported single-process backend (§4.2).

use async_trait::async_trait;
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use super::traits::{ModuleCommit, StoragePort};
use crate::error::{Result, TddbError};
use crate::model::{
    FuncParseRecord, ModuleRegistrationRequest, ModuleVersion, OwnerRecord, RefInfo, SchemaRecord,
    TypeParseRecord, VersionTime,
};
use crate::version::TypeVersion;

type TypeKey = (String, String, TypeVersion);

#[derive(Debug, Default)]
pub struct MemoryStorageStats {
    pub module_writes: u64,
    pub type_writes: u64,
    pub rollbacks: u64,
}

/// `DashMap`-backed reference implementation of [`StoragePort`].
pub struct MemoryStorage {
    versions: DashMap<String, HashMap<VersionTime, ModuleVersion>>,
    released: DashMap<String, VersionTime>,
    retired: DashMap<String, bool>,
    next_version_time: AtomicU64,

    type_schemas: DashMap<TypeKey, SchemaRecord>,
    type_parses: DashMap<TypeKey, TypeParseRecord>,
    func_parses: DashMap<TypeKey, FuncParseRecord>,

    type_refs_by_dep: DashMap<(String, String), Vec<RefInfo>>,
    type_refs_by_ref: DashMap<(String, String), Vec<RefInfo>>,
    func_refs_by_dep: DashMap<(String, String), Vec<RefInfo>>,
    func_refs_by_ref: DashMap<(String, String), Vec<RefInfo>>,

    owners: DashMap<String, Vec<OwnerRecord>>,
    registration_requests: DashMap<String, ModuleRegistrationRequest>,

    stats: DashMap<(), MemoryStorageStats>,
}

impl Default for MemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStorage {
    pub fn new() -> Self {
        let stats = DashMap::new();
        stats.insert((), MemoryStorageStats::default());
        Self {
            versions: DashMap::new(),
            released: DashMap::new(),
            retired: DashMap::new(),
            next_version_time: AtomicU64::new(1),
            type_schemas: DashMap::new(),
            type_parses: DashMap::new(),
            func_parses: DashMap::new(),
            type_refs_by_dep: DashMap::new(),
            type_refs_by_ref: DashMap::new(),
            func_refs_by_dep: DashMap::new(),
            func_refs_by_ref: DashMap::new(),
            owners: DashMap::new(),
            registration_requests: DashMap::new(),
            stats,
        }
    }

    pub fn stats(&self) -> MemoryStorageStats {
        let entry = self.stats.get(&()).unwrap();
        MemoryStorageStats {
            module_writes: entry.module_writes,
            type_writes: entry.type_writes,
            rollbacks: entry.rollbacks,
        }
    }

    fn bump(&self, f: impl FnOnce(&mut MemoryStorageStats)) {
        let mut entry = self.stats.get_mut(&()).unwrap();
        f(&mut entry);
    }

    fn index_refs(map: &DashMap<(String, String), Vec<RefInfo>>, key: (String, String), r: RefInfo) {
        map.entry(key).or_default().push(r);
    }
}

#[async_trait]
impl StoragePort for MemoryStorage {
    async fn exists(&self, module: &str) -> Result<bool> {
        Ok(self.versions.contains_key(module))
    }

    async fn init_record(&self, module: &str, version: ModuleVersion) -> Result<()> {
        let version_time = version.version_time;
        self.versions
            .entry(module.to_string())
            .or_default()
            .insert(version_time, version);
        self.released.insert(module.to_string(), version_time);
        self.retired.insert(module.to_string(), false);
        self.bump(|s| s.module_writes += 1);
        Ok(())
    }

    async fn all_versions(&self, module: &str) -> Result<HashMap<VersionTime, bool>> {
        let Some(entry) = self.versions.get(module) else {
            return Ok(HashMap::new());
        };
        Ok(entry.iter().map(|(t, v)| (*t, v.released)).collect())
    }

    async fn last_released_version(&self, module: &str) -> Result<Option<VersionTime>> {
        Ok(self.released.get(module).map(|v| *v))
    }

    async fn last_version_including_unreleased(
        &self,
        module: &str,
    ) -> Result<Option<VersionTime>> {
        let Some(entry) = self.versions.get(module) else {
            return Ok(None);
        };
        Ok(entry.keys().max().copied())
    }

    async fn generate_new_version(&self, _module: &str) -> Result<VersionTime> {
        Ok(self.next_version_time.fetch_add(1, Ordering::SeqCst))
    }

    async fn write_module_version(&self, module: &str, version: ModuleVersion) -> Result<()> {
        let version_time = version.version_time;
        self.versions
            .entry(module.to_string())
            .or_default()
            .insert(version_time, version);
        self.bump(|s| s.module_writes += 1);
        Ok(())
    }

    async fn set_release_version(&self, module: &str, version_time: VersionTime) -> Result<()> {
        self.released.insert(module.to_string(), version_time);
        Ok(())
    }

    async fn remove_version_if_not_current(
        &self,
        module: &str,
        version_time: VersionTime,
    ) -> Result<bool> {
        let mut entry = self
            .versions
            .get_mut(module)
            .ok_or_else(|| TddbError::NoSuchModule {
                module: module.to_string(),
            })?;
        let is_current = entry.keys().max() == Some(&version_time);
        if is_current {
            return Ok(false);
        }
        entry.remove(&version_time);
        Ok(true)
    }

    async fn supported_state(&self, module: &str) -> Result<bool> {
        Ok(!self.retired.get(module).map(|v| *v).unwrap_or(false))
    }

    async fn change_supported_state(&self, module: &str, supported: bool) -> Result<()> {
        self.retired.insert(module.to_string(), !supported);
        Ok(())
    }

    async fn remove_module(&self, module: &str) -> Result<()> {
        self.versions.remove(module);
        self.released.remove(module);
        self.retired.remove(module);
        self.owners.remove(module);
        Ok(())
    }

    async fn all_registered_modules(&self, include_retired: bool) -> Result<Vec<String>> {
        Ok(self
            .versions
            .iter()
            .map(|e| e.key().clone())
            .filter(|m| {
                include_retired || !self.retired.get(m).map(|v| *v).unwrap_or(false)
            })
            .collect())
    }

    async fn get_module_version(
        &self,
        module: &str,
        version_time: VersionTime,
    ) -> Result<Option<ModuleVersion>> {
        Ok(self
            .versions
            .get(module)
            .and_then(|m| m.get(&version_time).cloned()))
    }

    async fn write_type_schema_record(&self, record: SchemaRecord) -> Result<()> {
        let key = (
            record.module_name.clone(),
            record.type_name.clone(),
            record.type_version.clone(),
        );
        self.type_schemas.insert(key, record);
        self.bump(|s| s.type_writes += 1);
        Ok(())
    }

    async fn write_type_parse_record(&self, record: TypeParseRecord) -> Result<()> {
        let key = (
            record.module_name.clone(),
            record.type_name.clone(),
            record.type_version.clone(),
        );
        self.type_parses.insert(key, record);
        Ok(())
    }

    async fn write_func_parse_record(&self, record: FuncParseRecord) -> Result<()> {
        let key = (
            record.module_name.clone(),
            record.func_name.clone(),
            record.func_version.clone(),
        );
        self.func_parses.insert(key, record);
        Ok(())
    }

    async fn get_type_schema_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<SchemaRecord>> {
        let key = (module.to_string(), name.to_string(), version);
        Ok(self.type_schemas.get(&key).map(|e| e.clone()))
    }

    async fn get_type_parse_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<TypeParseRecord>> {
        let key = (module.to_string(), name.to_string(), version);
        Ok(self.type_parses.get(&key).map(|e| e.clone()))
    }

    async fn get_func_parse_record(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<FuncParseRecord>> {
        let key = (module.to_string(), name.to_string(), version);
        Ok(self.func_parses.get(&key).map(|e| e.clone()))
    }

    async fn check_type_schema_record_exists(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<bool> {
        let key = (module.to_string(), name.to_string(), version);
        Ok(self.type_schemas.contains_key(&key))
    }

    async fn get_all_type_versions(
        &self,
        module: &str,
        name: &str,
    ) -> Result<HashMap<TypeVersion, bool>> {
        let Some(version_entry) = self.versions.get(module) else {
            return Ok(HashMap::new());
        };
        let mut out = HashMap::new();
        for mv in version_entry.values() {
            if let Some(info) = mv.types.get(name) {
                out.insert(info.type_version.clone(), info.supported);
            }
        }
        Ok(out)
    }

    async fn get_type_versions_by_md5(
        &self,
        module: &str,
        name: &str,
        md5: &str,
    ) -> Result<Vec<TypeVersion>> {
        Ok(self
            .type_schemas
            .iter()
            .filter(|e| {
                e.key().0 == module && e.key().1 == name && e.value().md5 == md5
            })
            .map(|e| e.value().type_version.clone())
            .collect())
    }

    async fn get_type_md5(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Option<String>> {
        let key = (module.to_string(), name.to_string(), version);
        Ok(self.type_schemas.get(&key).map(|e| e.md5.clone()))
    }

    async fn add_refs(&self, type_refs: Vec<RefInfo>, func_refs: Vec<RefInfo>) -> Result<()> {
        for r in type_refs {
            Self::index_refs(
                &self.type_refs_by_dep,
                (r.dep_module.clone(), r.dep_name.clone()),
                r.clone(),
            );
            Self::index_refs(
                &self.type_refs_by_ref,
                (r.ref_module.clone(), r.ref_name.clone()),
                r,
            );
        }
        for r in func_refs {
            Self::index_refs(
                &self.func_refs_by_dep,
                (r.dep_module.clone(), r.dep_name.clone()),
                r.clone(),
            );
            Self::index_refs(
                &self.func_refs_by_ref,
                (r.ref_module.clone(), r.ref_name.clone()),
                r,
            );
        }
        Ok(())
    }

    async fn get_type_refs_by_dep(&self, module: &str, name: &str) -> Result<Vec<RefInfo>> {
        Ok(self
            .type_refs_by_dep
            .get(&(module.to_string(), name.to_string()))
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn get_type_refs_by_ref(&self, module: &str, name: &str) -> Result<Vec<RefInfo>> {
        Ok(self
            .type_refs_by_ref
            .get(&(module.to_string(), name.to_string()))
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn get_func_refs_by_dep(&self, module: &str, name: &str) -> Result<Vec<RefInfo>> {
        Ok(self
            .func_refs_by_dep
            .get(&(module.to_string(), name.to_string()))
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn get_func_refs_by_ref(&self, module: &str, name: &str) -> Result<Vec<RefInfo>> {
        Ok(self
            .func_refs_by_ref
            .get(&(module.to_string(), name.to_string()))
            .map(|e| e.clone())
            .unwrap_or_default())
    }

    async fn get_module_versions_for_type_version(
        &self,
        module: &str,
        name: &str,
        version: TypeVersion,
    ) -> Result<Vec<VersionTime>> {
        let Some(version_entry) = self.versions.get(module) else {
            return Ok(Vec::new());
        };
        Ok(version_entry
            .values()
            .filter(|mv| mv.types.get(name).map(|t| &t.type_version) == Some(&version))
            .map(|mv| mv.version_time)
            .collect())
    }

    async fn get_owners_for_module(&self, module: &str) -> Result<Vec<OwnerRecord>> {
        Ok(self.owners.get(module).map(|e| e.clone()).unwrap_or_default())
    }

    async fn add_owner_to_module(&self, owner: OwnerRecord) -> Result<()> {
        self.owners
            .entry(owner.module_name.clone())
            .or_default()
            .push(owner);
        Ok(())
    }

    async fn remove_owner_from_module(&self, module: &str, user_id: &str) -> Result<()> {
        if let Some(mut entry) = self.owners.get_mut(module) {
            entry.retain(|o| o.user_id != user_id);
        }
        Ok(())
    }

    async fn get_modules_for_owner(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self
            .owners
            .iter()
            .filter(|e| e.value().iter().any(|o| o.user_id == user_id))
            .map(|e| e.key().clone())
            .collect())
    }

    async fn add_new_module_registration_request(
        &self,
        request: ModuleRegistrationRequest,
    ) -> Result<()> {
        self.registration_requests
            .insert(request.module_name.clone(), request);
        Ok(())
    }

    async fn get_new_module_registration_requests(&self) -> Result<Vec<ModuleRegistrationRequest>> {
        Ok(self
            .registration_requests
            .iter()
            .map(|e| e.value().clone())
            .collect())
    }

    async fn get_owner_for_new_module_registration_request(
        &self,
        module: &str,
    ) -> Result<Option<String>> {
        Ok(self
            .registration_requests
            .get(module)
            .map(|e| e.user_id.clone()))
    }

    async fn remove_new_module_registration_request(&self, module: &str) -> Result<()> {
        self.registration_requests.remove(module);
        Ok(())
    }

    async fn apply_commit(&self, module: &str, commit: ModuleCommit) -> Result<()> {
        if let Some(version) = commit.module_version {
            self.write_module_version(module, version).await?;
        }
        for r in commit.type_schemas {
            self.write_type_schema_record(r).await?;
        }
        for r in commit.type_parses {
            self.write_type_parse_record(r).await?;
        }
        for r in commit.func_parses {
            self.write_func_parse_record(r).await?;
        }
        self.add_refs(commit.type_refs, commit.func_refs).await?;
        Ok(())
    }

    async fn rollback_version(&self, module: &str, version_time: VersionTime) -> Result<()> {
        if let Some(mut entry) = self.versions.get_mut(module) {
            entry.remove(&version_time);
        }
        self.type_schemas
            .retain(|k, v| !(k.0 == module && v.module_version == version_time));
        self.type_parses
            .retain(|k, v| !(k.0 == module && v.module_version == version_time));
        self.func_parses
            .retain(|k, v| !(k.0 == module && v.module_version == version_time));

        let drop_ref = |r: &RefInfo| r.dep_module == module && r.dep_module_version == version_time;
        for mut entry in self.type_refs_by_dep.iter_mut() {
            entry.retain(|r| !drop_ref(r));
        }
        for mut entry in self.type_refs_by_ref.iter_mut() {
            entry.retain(|r| !drop_ref(r));
        }
        for mut entry in self.func_refs_by_dep.iter_mut() {
            entry.retain(|r| !drop_ref(r));
        }
        for mut entry in self.func_refs_by_ref.iter_mut() {
            entry.retain(|r| !drop_ref(r));
        }

        self.bump(|s| s.rollbacks += 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn init_record_is_visible_and_released() {
        let store = MemoryStorage::new();
        assert!(!store.exists("acme.widget").await.unwrap());
        store
            .init_record("acme.widget", ModuleVersion::bootstrap(1, "alice"))
            .await
            .unwrap();
        assert!(store.exists("acme.widget").await.unwrap());
        assert_eq!(
            store.last_released_version("acme.widget").await.unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn rollback_removes_only_the_targeted_version() {
        let store = MemoryStorage::new();
        store
            .init_record("acme.widget", ModuleVersion::bootstrap(1, "alice"))
            .await
            .unwrap();
        let mut v2 = ModuleVersion::bootstrap(2, "alice");
        v2.upload_comment = "second".into();
        store.write_module_version("acme.widget", v2).await.unwrap();

        store.rollback_version("acme.widget", 2).await.unwrap();

        assert_eq!(
            store
                .last_version_including_unreleased("acme.widget")
                .await
                .unwrap(),
            Some(1)
        );
    }

    #[tokio::test]
    async fn schema_and_ref_round_trip() {
        let store = MemoryStorage::new();
        store
            .write_type_schema_record(SchemaRecord {
                module_name: "acme.widget".into(),
                type_name: "Gadget".into(),
                type_version: TypeVersion::new(0, 1),
                module_version: 1,
                json_schema: "{}".into(),
                md5: "abc123".into(),
            })
            .await
            .unwrap();

        assert!(
            store
                .check_type_schema_record_exists("acme.widget", "Gadget", TypeVersion::new(0, 1))
                .await
                .unwrap()
        );
        let versions = store
            .get_type_versions_by_md5("acme.widget", "Gadget", "abc123")
            .await
            .unwrap();
        assert_eq!(versions, vec![TypeVersion::new(0, 1)]);

        store
            .add_refs(
                vec![RefInfo {
                    dep_module: "acme.widget".into(),
                    dep_name: "Gadget".into(),
                    dep_version: TypeVersion::new(0, 1),
                    dep_module_version: 1,
                    ref_module: "acme.base".into(),
                    ref_name: "Id".into(),
                    ref_version: TypeVersion::new(1, 0),
                }],
                vec![],
            )
            .await
            .unwrap();

        let by_dep = store
            .get_type_refs_by_dep("acme.widget", "Gadget")
            .await
            .unwrap();
        assert_eq!(by_dep.len(), 1);
        let by_ref = store
            .get_type_refs_by_ref("acme.base", "Id")
            .await
            .unwrap();
        assert_eq!(by_ref.len(), 1);
    }

    #[tokio::test]
    async fn owners_are_tracked_per_module_and_user() {
        let store = MemoryStorage::new();
        store
            .add_owner_to_module(OwnerRecord::new("acme.widget", "alice", true))
            .await
            .unwrap();
        store
            .add_owner_to_module(OwnerRecord::new("acme.widget", "bob", false))
            .await
            .unwrap();

        assert_eq!(
            store.get_owners_for_module("acme.widget").await.unwrap().len(),
            2
        );
        assert_eq!(
            store.get_modules_for_owner("alice").await.unwrap(),
            vec!["acme.widget".to_string()]
        );

        store
            .remove_owner_from_module("acme.widget", "bob")
            .await
            .unwrap();
        assert_eq!(
            store.get_owners_for_module("acme.widget").await.unwrap().len(),
            1
        );
    }
}
