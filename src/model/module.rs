//! The module/type/function registry records (§3).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::ast::{FuncdefComponent, TypeNode};
use crate::version::TypeVersion;

/// A monotonic, unique-per-module timestamp identifying a committed
/// `ModuleVersion`. Strictly increasing; assigned by the Storage Port's
/// `generateNewVersion`.
pub type VersionTime = u64;

/// Module-wide state independent of any particular `ModuleVersion`: its
/// name and whether it is supported or retired (§3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Module {
    pub name: String,
    pub supported: bool,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            supported: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeInfo {
    pub type_name: String,
    pub type_version: TypeVersion,
    pub supported: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FuncInfo {
    pub func_name: String,
    pub func_version: TypeVersion,
    pub supported: bool,
}

/// One committed snapshot of a module (§3). The first `VersionTime` for any
/// module is the registration record: empty `types`/`funcs`, no spec.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModuleVersion {
    pub version_time: VersionTime,
    pub spec: String,
    pub ast_md5: String,
    pub description: String,
    pub uploader: String,
    pub upload_method: String,
    pub upload_comment: String,
    pub released: bool,
    /// `{depName -> depVersionTime}`, every entry of which must reference
    /// an existing committed `ModuleVersion` of that module.
    pub included_module_version: HashMap<String, VersionTime>,
    pub types: HashMap<String, TypeInfo>,
    pub funcs: HashMap<String, FuncInfo>,
}

impl ModuleVersion {
    /// The empty registration record created when a module is approved.
    pub fn bootstrap(version_time: VersionTime, uploader: impl Into<String>) -> Self {
        Self {
            version_time,
            spec: String::new(),
            ast_md5: String::new(),
            description: String::new(),
            uploader: uploader.into(),
            upload_method: "registration".to_string(),
            upload_comment: String::new(),
            released: true,
            included_module_version: HashMap::new(),
            types: HashMap::new(),
            funcs: HashMap::new(),
        }
    }

    pub fn supported_type_names(&self) -> impl Iterator<Item = &str> {
        self.types
            .values()
            .filter(|t| t.supported)
            .map(|t| t.type_name.as_str())
    }

    pub fn supported_func_names(&self) -> impl Iterator<Item = &str> {
        self.funcs
            .values()
            .filter(|f| f.supported)
            .map(|f| f.func_name.as_str())
    }
}

/// An immutable record of a stored JSON-Schema document for one type
/// version (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchemaRecord {
    pub module_name: String,
    pub type_name: String,
    pub type_version: TypeVersion,
    pub module_version: VersionTime,
    pub json_schema: String,
    pub md5: String,
}

/// An immutable AST fragment for a single type at a specific version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TypeParseRecord {
    pub module_name: String,
    pub type_name: String,
    pub type_version: TypeVersion,
    pub module_version: VersionTime,
    pub ast: TypeNode,
}

/// An immutable AST fragment for a single function at a specific version.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FuncParseRecord {
    pub module_name: String,
    pub func_name: String,
    pub func_version: TypeVersion,
    pub module_version: VersionTime,
    pub ast: FuncdefComponent,
}
