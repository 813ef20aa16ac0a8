//! Per-module ownership records (§3, §4.6).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnerRecord {
    pub module_name: String,
    pub user_id: String,
    pub with_change_owners_privilege: bool,
}

impl OwnerRecord {
    pub fn new(
        module_name: impl Into<String>,
        user_id: impl Into<String>,
        with_change_owners_privilege: bool,
    ) -> Self {
        Self {
            module_name: module_name.into(),
            user_id: user_id.into(),
            with_change_owners_privilege,
        }
    }
}

/// A pending `requestModuleRegistration` entry (§4.4).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleRegistrationRequest {
    pub module_name: String,
    pub user_id: String,
}
