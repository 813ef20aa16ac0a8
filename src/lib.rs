//! # tddb
//!
//! A versioned type-definition registry: a schema compile/diff/save
//! pipeline with per-module concurrency control and transactional
//! rollback.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use tddb::{RegistryCore, SaveModuleInput, TddbConfig};
//! use tddb::storage::MemoryStorage;
//! use tddb::parser::ReferenceParser;
//!
//! # async fn example() -> tddb::Result<()> {
//! let storage = Arc::new(MemoryStorage::new());
//! let parser = Arc::new(ReferenceParser);
//! let registry = RegistryCore::new(storage, parser, vec!["root".into()], TddbConfig::default());
//!
//! registry.request_module_registration("acme.widget", "alice").await?;
//! registry.approve_module_registration_request("root", "acme.widget").await?;
//!
//! let spec = "typedef Gadget = struct { id: string; };\nfuncdef describe(Gadget) -> (string);\n";
//! let output = registry
//!     .save_module(SaveModuleInput::new("acme.widget", "alice", format!("service acme {{ module acme.widget {{ {spec} }} }}")))
//!     .await?;
//! println!("{} types changed", output.changes.len());
//! # Ok(())
//! # }
//! ```

pub mod ast;
pub mod config;
pub mod error;
pub mod include;
pub mod lock;
pub mod model;
pub mod ownership;
pub mod parser;
pub mod registry;
pub mod storage;
pub mod version;

pub use config::{KidlSource, TddbConfig};
pub use error::{Result, TddbError};
pub use registry::{RegistryCore, SaveModuleInput, SaveModuleOutput, TypeChange};
