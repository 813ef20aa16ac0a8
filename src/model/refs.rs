//! Directed dependency edges between typed entities (§3).

use serde::{Deserialize, Serialize};

use crate::model::module::VersionTime;
use crate::version::TypeVersion;

/// "The dep-entity depends on the ref-entity." `ref_version` must be
/// non-null once persisted: for cross-module refs it is known at collection
/// time from the loaded dependency snapshot, for intra-module refs it is
/// back-filled from the version being committed (§3, §4.4 step 8).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefInfo {
    pub dep_module: String,
    pub dep_name: String,
    pub dep_version: TypeVersion,
    pub dep_module_version: VersionTime,
    pub ref_module: String,
    pub ref_name: String,
    pub ref_version: TypeVersion,
}

/// The same edge collected mid-pipeline, before the dep side's version and
/// module-version (and, for intra-module refs, the ref side's version) are
/// known. Finalized into a `RefInfo` once the commit's `VersionTime` and the
/// saved component versions are assigned.
#[derive(Debug, Clone)]
pub struct PendingRef {
    pub dep_name: String,
    pub ref_module: String,
    pub ref_name: String,
    /// `Some` for cross-module refs (known immediately from the loaded
    /// dependency snapshot); `None` for intra-module refs awaiting
    /// back-fill from the commit under construction.
    pub ref_version: Option<TypeVersion>,
}
