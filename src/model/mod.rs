pub mod ids;
pub mod module;
pub mod owner;
pub mod refs;

pub use ids::{AbsoluteTypeDefId, TypeDefId, TypeDefName, VersionSelector};
pub use module::{
    FuncInfo, FuncParseRecord, Module, ModuleVersion, SchemaRecord, TypeInfo, TypeParseRecord,
    VersionTime,
};
pub use owner::{ModuleRegistrationRequest, OwnerRecord};
pub use refs::{PendingRef, RefInfo};
